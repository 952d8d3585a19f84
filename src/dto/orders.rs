use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::orders;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    /// Client-generated UUID; resubmitting with the same key returns the
    /// first order instead of creating another. Non-UUID keys are rejected.
    pub idempotency_key: String,
    pub phone: String,
    pub customer_name: String,
    pub whatsapp_no: Option<String>,
    pub address: String,
    pub pincode: Option<String>,
    /// Phone the cart was built under, when it differs from the buyer's.
    pub cart_phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GetOrderQuery {
    pub phone: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDto {
    pub id: i64,
    pub customer_name: String,
    pub phone: String,
    pub shipping_address: String,
    #[schema(value_type = String)]
    pub total_price: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<orders::Model> for OrderDto {
    fn from(model: orders::Model) -> Self {
        Self {
            id: model.id,
            customer_name: model.customer_name,
            phone: model.phone,
            shipping_address: model.shipping_address,
            total_price: model.total_price,
            status: model.status,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineDto {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub price: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: OrderDto,
    pub items: Vec<OrderLineDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlacedOrder {
    pub order_id: i64,
    #[schema(value_type = String)]
    pub total_price: Decimal,
    pub status: String,
}
