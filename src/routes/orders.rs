use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::{
    dto::orders::{GetOrderQuery, OrderWithItems, PlaceOrderRequest, PlacedOrder},
    error::AppResult,
    response::ApiResponse,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(place_order))
        .route("/{id}", get(get_order))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 200, description = "Order placed (or replayed via idempotency key)", body = ApiResponse<PlacedOrder>),
        (status = 400, description = "Validation or business rejection: phone, pincode, empty cart, out of stock"),
        (status = 503, description = "Retryable contention failure"),
    ),
    tag = "Orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    Json(payload): Json<PlaceOrderRequest>,
) -> AppResult<Json<ApiResponse<PlacedOrder>>> {
    let order = order_service::convert_cart_to_order(&state, payload).await?;
    Ok(Json(ApiResponse::success(
        "Order placed successfully",
        PlacedOrder {
            order_id: order.id,
            total_price: order.total_price,
            status: order.status,
        },
    )))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(
        ("id" = i64, Path, description = "Order ID"),
        ("phone" = String, Query, description = "Phone that placed the order"),
    ),
    responses(
        (status = 200, description = "Order with line items", body = ApiResponse<OrderWithItems>),
        (status = 403, description = "Phone does not match the order"),
        (status = 404, description = "Order not found"),
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<GetOrderQuery>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let order = order_service::get_order_for_phone(&state, id, &query.phone).await?;
    Ok(Json(ApiResponse::success("OK", order)))
}
