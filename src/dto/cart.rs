use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub phone: String,
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub phone: String,
    pub product_id: i64,
    /// Zero removes the line.
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RemoveCartItemRequest {
    pub phone: String,
    pub product_id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ViewCartQuery {
    pub phone: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLine {
    pub product_id: i64,
    pub product_name: String,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub quantity: i32,
    pub image: Option<String>,
    #[schema(value_type = String)]
    pub line_total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartPayload {
    pub items: Vec<CartLine>,
    pub total_items: i64,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
}

impl CartPayload {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_items: 0,
            total_amount: Decimal::new(0, 2),
        }
    }
}
