pub mod cart_items;
pub mod carts;
pub mod customers;
pub mod order_items;
pub mod orders;
pub mod products;
pub mod serviceable_pincodes;

pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use customers::Entity as Customers;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
pub use serviceable_pincodes::Entity as ServiceablePincodes;
