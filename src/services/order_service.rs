use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr, TransactionTrait,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    dto::orders::{OrderLineDto, OrderWithItems, PlaceOrderRequest},
    entity::{
        cart_items::Column as CartItemCol,
        customers,
        order_items,
        orders::{self, Column as OrderCol},
        products::{self, Column as ProductCol},
        CartItems, Carts, Orders, Products,
    },
    error::{AppError, AppResult},
    phone::normalize_phone,
    services::{
        catalog_cache::invalidate_catalog_cache,
        customer_resolver::{absorb_cart, merge_phone_carts},
        pincode::ensure_serviceable,
    },
    state::AppState,
};

/// Everything the commit step needs, staged under row locks: the resolved
/// customer, the validated (product, quantity) lines with products still
/// locked, the order total, and the persistent cart to empty.
struct StagedOrder {
    customer: customers::Model,
    lines: Vec<(products::Model, i32)>,
    total: Decimal,
    clear_cart_id: Option<i64>,
}

/// Converts a cart (anonymous or persistent) into a committed, stock-
/// deducted order. One relational transaction; product rows are locked in id
/// order on every path; stock is validated against the locked value, never a
/// cached read. At most one order ever exists per idempotency key.
pub async fn convert_cart_to_order(
    state: &AppState,
    payload: PlaceOrderRequest,
) -> AppResult<orders::Model> {
    // A malformed key must never reach the pre-check: a blank key shared by
    // two unrelated buyers would hand the second one the first buyer's order.
    if !valid_idempotency_key(&payload.idempotency_key) {
        return Err(AppError::BadRequest(
            "idempotency_key must be a UUID".to_string(),
        ));
    }

    // Replays must be cheap and side-effect-free: check the key before any
    // lock or transaction.
    if let Some(existing) = find_by_key(&state.orm, &payload.idempotency_key).await? {
        return Ok(existing);
    }

    let name = payload.customer_name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("customer_name is required".to_string()));
    }
    let phone = normalize_phone(&payload.phone)?;
    let whatsapp = match payload
        .whatsapp_no
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())
    {
        Some(wa) => normalize_phone(wa)?,
        None => phone.clone(),
    };
    let source_phone = match payload
        .cart_phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        Some(p) => normalize_phone(p)?,
        None => phone.clone(),
    };

    ensure_serviceable(
        &state.orm,
        payload.pincode.as_deref().unwrap_or(""),
        &payload.address,
    )
    .await?;

    let cached_map = state.anon_cart.get(&source_phone).await;

    let txn = state.orm.begin().await?;

    // A concurrent double-submit can collide on more than the order row:
    // two conversions for a brand-new phone also race to create the customer
    // and cart. Any unique violation in here means somebody else got there
    // first, so roll back and look for the winner's order.
    let staged_order = async {
        let staged = if cached_map.is_empty() {
            stage_persistent(&txn, &phone, &source_phone, &name, &whatsapp, &payload.address)
                .await?
        } else {
            stage_anonymous(&txn, &cached_map, &phone, &name, &whatsapp, &payload.address).await?
        };
        let order = insert_order(&txn, &staged, &phone, &name, &payload).await?;
        Ok::<_, AppError>((staged, order))
    }
    .await;

    let (staged, order) = match staged_order {
        Ok(pair) => pair,
        Err(AppError::OrmError(err)) if is_unique_violation(&err) => {
            // The aborted transaction has to be rolled back before the
            // winner's row is readable.
            txn.rollback().await?;
            return find_by_key(&state.orm, &payload.idempotency_key)
                .await?
                .ok_or(AppError::OrmError(err));
        }
        Err(err) => return Err(err),
    };

    for (product, qty) in &staged.lines {
        order_items::ActiveModel {
            id: NotSet,
            order_id: Set(order.id),
            product_id: Set(product.id),
            quantity: Set(*qty),
            price: Set(product.price),
        }
        .insert(&txn)
        .await?;

        // Decrement and availability in one statement, both computed from
        // the pre-update stock value; a separate read-then-write here would
        // reintroduce the lost-update window the row lock closed.
        Products::update_many()
            .col_expr(ProductCol::StockQty, Expr::col(ProductCol::StockQty).sub(*qty))
            .col_expr(ProductCol::IsAvailable, Expr::col(ProductCol::StockQty).gt(*qty))
            .filter(ProductCol::Id.eq(product.id))
            .exec(&txn)
            .await?;
    }

    if let Some(cart_id) = staged.clear_cart_id {
        CartItems::delete_many()
            .filter(CartItemCol::CartId.eq(cart_id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    state.anon_cart.clear(&source_phone).await;
    if source_phone != phone {
        state.anon_cart.clear(&phone).await;
    }
    invalidate_catalog_cache(state.cache.as_ref()).await;

    // Billing, sales records and notifications ride on the committed order;
    // their failure must never unwind the checkout.
    let sink = Arc::clone(&state.events);
    let placed = order.clone();
    tokio::spawn(async move {
        sink.order_placed(&placed).await;
    });

    Ok(order)
}

/// Order lookup scoped to the phone that placed it.
pub async fn get_order_for_phone(
    state: &AppState,
    order_id: i64,
    phone: &str,
) -> AppResult<OrderWithItems> {
    let phone = normalize_phone(phone)?;
    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if order.phone != phone {
        return Err(AppError::Forbidden);
    }

    #[derive(FromRow)]
    struct LineRow {
        product_id: i64,
        product_name: String,
        quantity: i32,
        price: Decimal,
    }

    let rows = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT oi.product_id, p.name AS product_name, oi.quantity, oi.price
        FROM order_items oi
        JOIN products p ON p.id = oi.product_id
        WHERE oi.order_id = $1
        ORDER BY oi.id
        "#,
    )
    .bind(order.id)
    .fetch_all(&state.pool)
    .await?;

    let items = rows
        .into_iter()
        .map(|row| OrderLineDto {
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            price: row.price,
        })
        .collect();

    Ok(OrderWithItems {
        order: order.into(),
        items,
    })
}

async fn find_by_key<C: ConnectionTrait>(
    conn: &C,
    idempotency_key: &str,
) -> AppResult<Option<orders::Model>> {
    let order = Orders::find()
        .filter(OrderCol::IdempotencyKey.eq(idempotency_key))
        .one(conn)
        .await?;
    Ok(order)
}

/// Anonymous-cart path: the cache map is the source of truth for what is
/// being bought. The target's persistent cart is emptied at commit so stale
/// lines cannot resurface after checkout.
async fn stage_anonymous<C: ConnectionTrait>(
    conn: &C,
    cached_map: &BTreeMap<i64, i32>,
    phone: &str,
    name: &str,
    whatsapp: &str,
    address: &str,
) -> AppResult<StagedOrder> {
    let (customer, cart) = merge_phone_carts(conn, phone, Some(name), Some(whatsapp), true)
        .await?
        .ok_or(AppError::CustomerNotFound)?;
    let customer = refresh_contact(conn, customer, name, whatsapp, address).await?;

    // BTreeMap keys come out ascending, which fixes the lock order.
    let ids: Vec<i64> = cached_map.keys().copied().collect();
    let locked = Products::find()
        .filter(ProductCol::Id.is_in(ids))
        .order_by_asc(ProductCol::Id)
        .lock(LockType::Update)
        .all(conn)
        .await?;

    let mut lines = Vec::new();
    let mut total = Decimal::new(0, 2);
    for product in locked {
        let Some(&qty) = cached_map.get(&product.id) else {
            continue;
        };
        if product.stock_qty < qty {
            return Err(AppError::OutOfStock {
                name: product.name,
                available: product.stock_qty,
            });
        }
        total += product.price * Decimal::from(qty);
        lines.push((product, qty));
    }
    if lines.is_empty() {
        return Err(AppError::CartEmpty);
    }

    Ok(StagedOrder {
        customer,
        lines,
        total,
        clear_cart_id: Some(cart.id),
    })
}

/// Persistent-cart path. When the cart was built under a different phone,
/// that phone's cart is folded into the buyer's before conversion.
async fn stage_persistent<C: ConnectionTrait>(
    conn: &C,
    phone: &str,
    source_phone: &str,
    name: &str,
    whatsapp: &str,
    address: &str,
) -> AppResult<StagedOrder> {
    let (customer, cart) = if source_phone != phone {
        let source = merge_phone_carts(conn, source_phone, None, None, false).await?;
        let (customer, cart) = merge_phone_carts(conn, phone, Some(name), Some(whatsapp), true)
            .await?
            .ok_or(AppError::CartNotFound)?;
        if let Some((_, source_cart)) = source {
            if source_cart.id != cart.id {
                absorb_cart(conn, &source_cart, cart.id).await?;
            }
        }
        (customer, cart)
    } else {
        merge_phone_carts(conn, phone, Some(name), Some(whatsapp), true)
            .await?
            .ok_or(AppError::CartNotFound)?
    };
    let customer = refresh_contact(conn, customer, name, whatsapp, address).await?;

    let cart = Carts::find_by_id(cart.id)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or(AppError::CartNotFound)?;

    let items = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_asc(CartItemCol::ProductId)
        .all(conn)
        .await?;
    if items.is_empty() {
        return Err(AppError::CartEmpty);
    }

    // Same ascending-id lock order as the anonymous path; two checkouts
    // sharing products can no longer deadlock on lock order.
    let ids: Vec<i64> = items.iter().map(|item| item.product_id).collect();
    let locked = Products::find()
        .filter(ProductCol::Id.is_in(ids))
        .order_by_asc(ProductCol::Id)
        .lock(LockType::Update)
        .all(conn)
        .await?;
    let product_map: HashMap<i64, products::Model> =
        locked.into_iter().map(|p| (p.id, p)).collect();

    let mut lines = Vec::new();
    let mut total = Decimal::new(0, 2);
    for item in items {
        let Some(product) = product_map.get(&item.product_id) else {
            continue;
        };
        if product.stock_qty < item.quantity {
            return Err(AppError::OutOfStock {
                name: product.name.clone(),
                available: product.stock_qty,
            });
        }
        total += product.price * Decimal::from(item.quantity);
        lines.push((product.clone(), item.quantity));
    }
    if lines.is_empty() {
        return Err(AppError::CartEmpty);
    }

    Ok(StagedOrder {
        customer,
        lines,
        total,
        clear_cart_id: Some(cart.id),
    })
}

async fn insert_order<C: ConnectionTrait>(
    conn: &C,
    staged: &StagedOrder,
    phone: &str,
    name: &str,
    payload: &PlaceOrderRequest,
) -> AppResult<orders::Model> {
    let order = orders::ActiveModel {
        id: NotSet,
        customer_id: Set(staged.customer.id),
        customer_name: Set(name.to_string()),
        phone: Set(phone.to_string()),
        shipping_address: Set(payload.address.clone()),
        total_price: Set(staged.total),
        status: Set("Placed".to_string()),
        idempotency_key: Set(payload.idempotency_key.clone()),
        created_at: NotSet,
    }
    .insert(conn)
    .await?;
    Ok(order)
}

/// Contact details are refreshed on every checkout; the order payload is the
/// freshest source for all three fields.
async fn refresh_contact<C: ConnectionTrait>(
    conn: &C,
    customer: customers::Model,
    name: &str,
    whatsapp: &str,
    address: &str,
) -> AppResult<customers::Model> {
    let mut active: customers::ActiveModel = customer.into();
    active.name = Set(name.to_string());
    active.whatsapp_no = Set(whatsapp.to_string());
    active.address = Set(address.to_string());
    Ok(active.update(conn).await?)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Keys are client-generated UUIDs; anything else is rejected up front so
/// degenerate keys (blank, shared constants) cannot collide across buyers.
fn valid_idempotency_key(key: &str) -> bool {
    Uuid::parse_str(key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_idempotency_keys_are_accepted() {
        assert!(valid_idempotency_key("8f2f9a46-1bb0-4bcb-9c3e-7f2d9f6e0a11"));
        assert!(valid_idempotency_key(
            &Uuid::new_v4().to_string()
        ));
    }

    #[test]
    fn blank_and_freeform_keys_are_rejected() {
        assert!(!valid_idempotency_key(""));
        assert!(!valid_idempotency_key("   "));
        assert!(!valid_idempotency_key("order-123"));
        assert!(!valid_idempotency_key("8f2f9a46-1bb0-4bcb-9c3e"));
    }
}
