pub mod anon_cart;
pub mod cart_service;
pub mod catalog_cache;
pub mod customer_resolver;
pub mod order_service;
pub mod pincode;
