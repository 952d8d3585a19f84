use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::FromRow;

use crate::{
    cache::CacheStore,
    db::DbPool,
    dto::cart::{CartLine, CartPayload},
    error::AppResult,
};

fn cart_key(phone: &str) -> String {
    format!("cart:anon:v1:{phone}")
}

/// Cache-resident cart for anonymous browsing, keyed by phone. A JSON map of
/// product id to quantity with a 24h TTL; not relationally constrained, so
/// every read sanitizes and every payload build self-heals against stale
/// stock. A missing or broken cache reads as an empty cart.
#[derive(Clone)]
pub struct AnonCartStore {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl AnonCartStore {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub async fn get(&self, phone: &str) -> BTreeMap<i64, i32> {
        let Some(raw) = self.cache.get(&cart_key(phone)).await else {
            return BTreeMap::new();
        };
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => sanitize_raw(&value),
            Err(_) => BTreeMap::new(),
        }
    }

    /// Sanitizes and stores the map, returning what was actually written.
    /// Callers must not assume their input survived verbatim.
    pub async fn set(&self, phone: &str, cart_map: &BTreeMap<i64, i32>) -> BTreeMap<i64, i32> {
        let safe: BTreeMap<i64, i32> = cart_map
            .iter()
            .filter(|&(&pid, &qty)| pid > 0 && qty > 0)
            .map(|(&pid, &qty)| (pid, qty))
            .collect();

        let encoded: serde_json::Map<String, serde_json::Value> = safe
            .iter()
            .map(|(pid, qty)| (pid.to_string(), serde_json::Value::from(*qty)))
            .collect();
        self.cache
            .set(
                &cart_key(phone),
                serde_json::Value::Object(encoded).to_string(),
                Some(self.ttl),
            )
            .await;
        safe
    }

    pub async fn clear(&self, phone: &str) {
        self.cache.delete(&cart_key(phone)).await;
    }

    /// Joins the cached map against live product rows, clamping quantities to
    /// current stock and dropping vanished products. When clamping changed
    /// anything the cleaned map is written back. Lines come out sorted by
    /// product name, case-insensitively.
    pub async fn build_payload(&self, pool: &DbPool, phone: &str) -> AppResult<CartPayload> {
        let cart_map = self.get(phone).await;
        if cart_map.is_empty() {
            return Ok(CartPayload::empty());
        }

        #[derive(FromRow)]
        struct ProductRow {
            id: i64,
            name: String,
            price: Decimal,
            stock_qty: i32,
            image: Option<String>,
        }

        let ids: Vec<i64> = cart_map.keys().copied().collect();
        let products = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, price, stock_qty, image FROM products WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(pool)
        .await?;

        let mut items: Vec<CartLine> = Vec::new();
        let mut cleaned: BTreeMap<i64, i32> = BTreeMap::new();
        let mut total_items: i64 = 0;
        let mut total_amount = Decimal::new(0, 2);

        for product in &products {
            let Some(&qty) = cart_map.get(&product.id) else {
                continue;
            };
            let safe_qty = qty.min(product.stock_qty);
            if safe_qty <= 0 {
                continue;
            }

            cleaned.insert(product.id, safe_qty);
            let line_total = product.price * Decimal::from(safe_qty);
            items.push(CartLine {
                product_id: product.id,
                product_name: product.name.clone(),
                price: product.price,
                quantity: safe_qty,
                image: product.image.clone(),
                line_total,
            });
            total_items += i64::from(safe_qty);
            total_amount += line_total;
        }

        if cleaned != cart_map {
            self.set(phone, &cleaned).await;
        }

        items.sort_by_key(|line| line.product_name.to_lowercase());
        Ok(CartPayload {
            items,
            total_items,
            total_amount,
        })
    }
}

fn sanitize_raw(value: &serde_json::Value) -> BTreeMap<i64, i32> {
    let Some(object) = value.as_object() else {
        return BTreeMap::new();
    };

    let mut normalized = BTreeMap::new();
    for (key, raw_qty) in object {
        let Ok(pid) = key.trim().parse::<i64>() else {
            continue;
        };
        let qty = match raw_qty {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        let Some(qty) = qty else { continue };
        if pid > 0 && qty > 0 && qty <= i64::from(i32::MAX) {
            normalized.insert(pid, qty as i32);
        }
    }
    normalized
}
