use utoipa::OpenApi;
use utoipa::openapi::OpenApi as OpenApiSpec;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{
            AddToCartRequest, CartLine, CartPayload, RemoveCartItemRequest, UpdateCartItemRequest,
        },
        orders::{OrderDto, OrderLineDto, OrderWithItems, PlaceOrderRequest, PlacedOrder},
    },
    response::ApiResponse,
    routes::{cart, health, orders},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        cart::view_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_cart_item,
        orders::place_order,
        orders::get_order,
    ),
    components(
        schemas(
            AddToCartRequest,
            UpdateCartItemRequest,
            RemoveCartItemRequest,
            CartLine,
            CartPayload,
            PlaceOrderRequest,
            PlacedOrder,
            OrderDto,
            OrderLineDto,
            OrderWithItems,
            ApiResponse<CartPayload>,
            ApiResponse<PlacedOrder>,
            ApiResponse<OrderWithItems>
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Phone-keyed cart endpoints"),
        (name = "Orders", description = "Order placement and lookup"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
