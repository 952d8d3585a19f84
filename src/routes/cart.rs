use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::{
    dto::cart::{
        AddToCartRequest, CartPayload, RemoveCartItemRequest, UpdateCartItemRequest, ViewCartQuery,
    },
    error::AppResult,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(view_cart))
        .route("/add", post(add_to_cart))
        .route("/update", post(update_cart_item))
        .route("/remove", post(remove_cart_item))
}

#[utoipa::path(
    post,
    path = "/api/cart/add",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Added to cart", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid phone, quantity, or per-line limit exceeded"),
        (status = 404, description = "Product not found"),
        (status = 503, description = "Cart lock contended, retry"),
    ),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    cart_service::add_to_cart(&state, payload).await?;
    Ok(Json(ApiResponse::message_only("Added to cart")))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(("phone" = String, Query, description = "Phone the cart is keyed by")),
    responses(
        (status = 200, description = "Cart contents with totals", body = ApiResponse<CartPayload>),
        (status = 400, description = "Invalid phone"),
    ),
    tag = "Cart"
)]
pub async fn view_cart(
    State(state): State<AppState>,
    Query(query): Query<ViewCartQuery>,
) -> AppResult<Json<ApiResponse<CartPayload>>> {
    let payload = cart_service::view_cart(&state, &query.phone).await?;
    Ok(Json(ApiResponse::success("OK", payload)))
}

#[utoipa::path(
    post,
    path = "/api/cart/update",
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Cart updated (quantity 0 removes the item)", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid quantity or insufficient stock"),
        (status = 404, description = "Customer, cart or item not found"),
        (status = 503, description = "Cart lock contended, retry"),
    ),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let message = cart_service::update_cart_item(&state, payload).await?;
    Ok(Json(ApiResponse::message_only(message)))
}

#[utoipa::path(
    post,
    path = "/api/cart/remove",
    request_body = RemoveCartItemRequest,
    responses(
        (status = 200, description = "Item removed", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Customer, cart or item not found"),
        (status = 503, description = "Cart lock contended, retry"),
    ),
    tag = "Cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Json(payload): Json<RemoveCartItemRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let message = cart_service::remove_cart_item(&state, payload).await?;
    Ok(Json(ApiResponse::message_only(message)))
}
