use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::{
    entity::{
        cart_items::{self, Column as CartItemCol},
        carts::{self, Column as CartCol},
        customers::{self, Column as CustomerCol},
        CartItems, Carts, Customers,
    },
    error::AppResult,
};

/// Historical duplicate rows are drained at most this many at a time; repeat
/// calls pick up any remainder.
const MERGE_BATCH: u64 = 50;

/// Resolves the canonical customer for a normalized phone: the oldest row
/// wins. Creates one ("Guest Customer" by default) when allowed. Supplied
/// name/whatsapp overwrite stored values when they differ; the address is
/// never touched here, it only changes at checkout.
pub async fn resolve_primary_customer<C: ConnectionTrait>(
    conn: &C,
    phone: &str,
    customer_name: Option<&str>,
    whatsapp_no: Option<&str>,
    create_if_missing: bool,
) -> AppResult<Option<customers::Model>> {
    let primary = Customers::find()
        .filter(CustomerCol::Phone.eq(phone))
        .order_by_asc(CustomerCol::Id)
        .one(conn)
        .await?;

    let Some(primary) = primary else {
        if !create_if_missing {
            return Ok(None);
        }
        let created = customers::ActiveModel {
            id: NotSet,
            name: Set(customer_name.unwrap_or("Guest Customer").to_string()),
            phone: Set(phone.to_string()),
            whatsapp_no: Set(whatsapp_no.unwrap_or(phone).to_string()),
            address: Set(String::new()),
            created_at: NotSet,
        }
        .insert(conn)
        .await?;
        return Ok(Some(created));
    };

    let mut active: customers::ActiveModel = primary.clone().into();
    let mut changed = false;
    if let Some(name) = customer_name.filter(|n| !n.trim().is_empty() && **n != primary.name) {
        active.name = Set(name.to_string());
        changed = true;
    }
    if let Some(wa) = whatsapp_no.filter(|w| !w.trim().is_empty() && **w != primary.whatsapp_no) {
        active.whatsapp_no = Set(wa.to_string());
        changed = true;
    }
    if changed {
        return Ok(Some(active.update(conn).await?));
    }
    Ok(Some(primary))
}

/// Resolves identity, guarantees a persistent cart, and folds any legacy
/// duplicate customers for the phone into the primary (quantities for the
/// same product are summed, both carts' contents are wanted). Idempotent:
/// with no duplicates this only ensures the cart exists.
pub async fn merge_phone_carts<C: ConnectionTrait>(
    conn: &C,
    phone: &str,
    customer_name: Option<&str>,
    whatsapp_no: Option<&str>,
    create_if_missing: bool,
) -> AppResult<Option<(customers::Model, carts::Model)>> {
    let Some(primary) =
        resolve_primary_customer(conn, phone, customer_name, whatsapp_no, create_if_missing).await?
    else {
        return Ok(None);
    };

    let primary_cart = ensure_cart(conn, primary.id).await?;

    let duplicates = Customers::find()
        .filter(CustomerCol::Phone.eq(phone))
        .filter(CustomerCol::Id.ne(primary.id))
        .order_by_asc(CustomerCol::Id)
        .limit(MERGE_BATCH)
        .all(conn)
        .await?;

    for duplicate in duplicates {
        if let Some(duplicate_cart) = Carts::find()
            .filter(CartCol::CustomerId.eq(duplicate.id))
            .one(conn)
            .await?
        {
            absorb_cart(conn, &duplicate_cart, primary_cart.id).await?;
        }
        Customers::delete_by_id(duplicate.id).exec(conn).await?;
    }

    Ok(Some((primary, primary_cart)))
}

/// Read path: primary customer and their cart, without the duplicate merge.
pub async fn get_primary_customer_and_cart<C: ConnectionTrait>(
    conn: &C,
    phone: &str,
    create_if_missing: bool,
) -> AppResult<Option<(customers::Model, Option<carts::Model>)>> {
    let Some(primary) =
        resolve_primary_customer(conn, phone, None, None, create_if_missing).await?
    else {
        return Ok(None);
    };

    let cart = Carts::find()
        .filter(CartCol::CustomerId.eq(primary.id))
        .one(conn)
        .await?;
    let cart = match cart {
        Some(cart) => Some(cart),
        None if create_if_missing => Some(ensure_cart(conn, primary.id).await?),
        None => None,
    };
    Ok(Some((primary, cart)))
}

/// Moves every line of `source` into the cart `target_cart_id`, summing
/// quantities on product conflicts, then deletes the source cart.
pub async fn absorb_cart<C: ConnectionTrait>(
    conn: &C,
    source: &carts::Model,
    target_cart_id: i64,
) -> AppResult<()> {
    let items = CartItems::find()
        .filter(CartItemCol::CartId.eq(source.id))
        .all(conn)
        .await?;

    for item in items {
        let existing = CartItems::find()
            .filter(CartItemCol::CartId.eq(target_cart_id))
            .filter(CartItemCol::ProductId.eq(item.product_id))
            .one(conn)
            .await?;
        match existing {
            Some(line) => {
                let quantity = line.quantity + item.quantity;
                let mut active: cart_items::ActiveModel = line.into();
                active.quantity = Set(quantity);
                active.update(conn).await?;
            }
            None => {
                cart_items::ActiveModel {
                    id: NotSet,
                    cart_id: Set(target_cart_id),
                    product_id: Set(item.product_id),
                    quantity: Set(item.quantity),
                }
                .insert(conn)
                .await?;
            }
        }
    }

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(source.id))
        .exec(conn)
        .await?;
    Carts::delete_by_id(source.id).exec(conn).await?;
    Ok(())
}

async fn ensure_cart<C: ConnectionTrait>(conn: &C, customer_id: i64) -> AppResult<carts::Model> {
    if let Some(cart) = Carts::find()
        .filter(CartCol::CustomerId.eq(customer_id))
        .one(conn)
        .await?
    {
        return Ok(cart);
    }
    let cart = carts::ActiveModel {
        id: NotSet,
        customer_id: Set(customer_id),
        created_at: NotSet,
    }
    .insert(conn)
    .await?;
    Ok(cart)
}
