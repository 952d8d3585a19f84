use rust_decimal::Decimal;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use sqlx::FromRow;

use crate::{
    dto::cart::{
        AddToCartRequest, CartLine, CartPayload, RemoveCartItemRequest, UpdateCartItemRequest,
    },
    entity::{
        cart_items::{self, Column as CartItemCol},
        CartItems, Carts, Products,
    },
    error::{AppError, AppResult},
    phone::normalize_phone,
    services::customer_resolver::{get_primary_customer_and_cart, merge_phone_carts},
    state::AppState,
};

/// Hard per-line cap, enforced on every write path.
const MAX_LINE_QTY: i32 = 99;

/// Adds `quantity` to the phone's cached cart line. The whole read-modify-
/// write runs under the cart write lock so concurrent adds cannot clobber
/// each other.
pub async fn add_to_cart(state: &AppState, payload: AddToCartRequest) -> AppResult<()> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }
    let phone = normalize_phone(&payload.phone)?;

    let product_exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
        .bind(payload.product_id)
        .fetch_optional(&state.pool)
        .await?;
    if product_exists.is_none() {
        return Err(AppError::ProductNotFound);
    }

    let guard = state.cart_lock.acquire(&phone).await?;
    let result = async {
        let mut cart_map = state.anon_cart.get(&phone).await;
        let current = cart_map.get(&payload.product_id).copied().unwrap_or(0);
        let next = current.saturating_add(payload.quantity);
        if next > MAX_LINE_QTY {
            return Err(AppError::QuantityLimitExceeded);
        }
        cart_map.insert(payload.product_id, next);
        state.anon_cart.set(&phone, &cart_map).await;
        Ok(())
    }
    .await;
    guard.release().await;
    result
}

/// Cart view: the cached anonymous cart wins when it has stock; otherwise
/// fall back to the customer's persistent cart. Unknown phones read as an
/// empty cart, not an error.
pub async fn view_cart(state: &AppState, phone: &str) -> AppResult<CartPayload> {
    let phone = normalize_phone(phone)?;

    let payload = state.anon_cart.build_payload(&state.pool, &phone).await?;
    if payload.total_items > 0 {
        return Ok(payload);
    }

    let Some((_, Some(cart))) =
        get_primary_customer_and_cart(&state.orm, &phone, false).await?
    else {
        return Ok(CartPayload::empty());
    };

    #[derive(FromRow)]
    struct LineRow {
        product_id: i64,
        product_name: String,
        price: Decimal,
        quantity: i32,
        image: Option<String>,
    }

    let rows = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT ci.product_id, p.name AS product_name, p.price, ci.quantity, p.image
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        ORDER BY LOWER(p.name)
        "#,
    )
    .bind(cart.id)
    .fetch_all(&state.pool)
    .await?;

    let mut total_items: i64 = 0;
    let mut total_amount = Decimal::new(0, 2);
    let items = rows
        .into_iter()
        .map(|row| {
            let line_total = row.price * Decimal::from(row.quantity);
            total_items += i64::from(row.quantity);
            total_amount += line_total;
            CartLine {
                product_id: row.product_id,
                product_name: row.product_name,
                price: row.price,
                quantity: row.quantity,
                image: row.image,
                line_total,
            }
        })
        .collect();

    Ok(CartPayload {
        items,
        total_items,
        total_amount,
    })
}

/// Sets a line's quantity (zero removes it). The cached cart is mutated
/// under the write lock; when it is empty the change lands on the persistent
/// cart under row locks, with one duplicate-merge repair retry on a miss.
pub async fn update_cart_item(
    state: &AppState,
    payload: UpdateCartItemRequest,
) -> AppResult<&'static str> {
    if payload.quantity < 0 {
        return Err(AppError::BadRequest(
            "quantity must not be negative".to_string(),
        ));
    }
    if payload.quantity > MAX_LINE_QTY {
        return Err(AppError::QuantityLimitExceeded);
    }
    let phone = normalize_phone(&payload.phone)?;

    let guard = state.cart_lock.acquire(&phone).await?;
    let cached: AppResult<Option<&'static str>> = async {
        let mut cart_map = state.anon_cart.get(&phone).await;
        if cart_map.is_empty() {
            return Ok(None);
        }
        if payload.quantity == 0 {
            if cart_map.remove(&payload.product_id).is_some() {
                state.anon_cart.set(&phone, &cart_map).await;
            }
            return Ok(Some("Item removed"));
        }
        cart_map.insert(payload.product_id, payload.quantity);
        state.anon_cart.set(&phone, &cart_map).await;
        Ok(Some("Cart updated"))
    }
    .await;
    guard.release().await;
    if let Some(message) = cached? {
        return Ok(message);
    }

    let txn = state.orm.begin().await?;

    let (_cart, item) = locked_cart_item(&txn, &phone, payload.product_id).await?;

    if payload.quantity == 0 {
        CartItems::delete_by_id(item.id).exec(&txn).await?;
        txn.commit().await?;
        return Ok("Item removed");
    }

    let product = Products::find_by_id(payload.product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::ProductNotFound)?;
    if product.stock_qty < payload.quantity {
        return Err(AppError::OutOfStock {
            name: product.name,
            available: product.stock_qty,
        });
    }

    let mut active: cart_items::ActiveModel = item.into();
    active.quantity = Set(payload.quantity);
    active.update(&txn).await?;
    txn.commit().await?;
    Ok("Cart updated")
}

/// Deletes a line, cache cart first, persistent cart as the fallback.
pub async fn remove_cart_item(
    state: &AppState,
    payload: RemoveCartItemRequest,
) -> AppResult<&'static str> {
    let phone = normalize_phone(&payload.phone)?;

    let guard = state.cart_lock.acquire(&phone).await?;
    let cached: AppResult<Option<&'static str>> = async {
        let mut cart_map = state.anon_cart.get(&phone).await;
        if cart_map.is_empty() {
            return Ok(None);
        }
        if cart_map.remove(&payload.product_id).is_none() {
            return Err(AppError::ItemNotFound);
        }
        state.anon_cart.set(&phone, &cart_map).await;
        Ok(Some("Item removed"))
    }
    .await;
    guard.release().await;
    if let Some(message) = cached? {
        return Ok(message);
    }

    let txn = state.orm.begin().await?;
    let (_cart, item) = locked_cart_item(&txn, &phone, payload.product_id).await?;
    CartItems::delete_by_id(item.id).exec(&txn).await?;
    txn.commit().await?;
    Ok("Item removed")
}

/// Row-locks the phone's persistent cart and the requested line. When the
/// line is missing, runs the duplicate-customer merge once and looks again;
/// legacy duplicate carts park items under a sibling customer row.
async fn locked_cart_item<C: ConnectionTrait>(
    conn: &C,
    phone: &str,
    product_id: i64,
) -> AppResult<(crate::entity::carts::Model, cart_items::Model)> {
    let Some((_, cart)) = get_primary_customer_and_cart(conn, phone, false).await? else {
        return Err(AppError::CustomerNotFound);
    };
    let Some(cart) = cart else {
        return Err(AppError::CartNotFound);
    };
    let cart = Carts::find_by_id(cart.id)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or(AppError::CartNotFound)?;

    let mut item = find_locked_item(conn, cart.id, product_id).await?;
    if item.is_none() {
        if let Some((_, merged_cart)) = merge_phone_carts(conn, phone, None, None, false).await? {
            item = find_locked_item(conn, merged_cart.id, product_id).await?;
        }
    }
    let item = item.ok_or(AppError::ItemNotFound)?;
    Ok((cart, item))
}

async fn find_locked_item<C: ConnectionTrait>(
    conn: &C,
    cart_id: i64,
    product_id: i64,
) -> AppResult<Option<cart_items::Model>> {
    let item = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart_id))
        .filter(CartItemCol::ProductId.eq(product_id))
        .lock(LockType::Update)
        .one(conn)
        .await?;
    Ok(item)
}
