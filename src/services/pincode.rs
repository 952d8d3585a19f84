use std::sync::LazyLock;

use regex::Regex;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};

use crate::{
    entity::{serviceable_pincodes::Column, ServiceablePincodes},
    error::{AppError, AppResult},
};

static PINCODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{6})\b").expect("pincode pattern"));

pub fn normalize_pincode(value: &str) -> Option<String> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == 6).then_some(digits)
}

/// Finds the first standalone 6-digit run in free text (usually the address).
pub fn extract_pincode(text: &str) -> Option<String> {
    PINCODE_PATTERN
        .find(text)
        .and_then(|m| normalize_pincode(m.as_str()))
}

pub fn resolve_order_pincode(pincode: &str, address: &str) -> Option<String> {
    normalize_pincode(pincode).or_else(|| extract_pincode(address))
}

/// Validates delivery eligibility before any order mutation. Returns the
/// normalized pincode, or a business rejection the client can display.
pub async fn ensure_serviceable<C: ConnectionTrait>(
    conn: &C,
    pincode: &str,
    address: &str,
) -> AppResult<String> {
    let resolved = resolve_order_pincode(pincode, address).ok_or(AppError::PincodeRequired)?;

    let serviceable = ServiceablePincodes::find()
        .filter(Column::Code.eq(&resolved))
        .filter(Column::IsActive.eq(true))
        .count(conn)
        .await?
        > 0;

    if !serviceable {
        return Err(AppError::PincodeNotServiceable(resolved));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_exactly_six_digits() {
        assert_eq!(normalize_pincode("560001").as_deref(), Some("560001"));
        assert_eq!(normalize_pincode(" 560-001 ").as_deref(), Some("560001"));
        assert!(normalize_pincode("56001").is_none());
        assert!(normalize_pincode("5600011").is_none());
        assert!(normalize_pincode("").is_none());
    }

    #[test]
    fn extract_finds_standalone_six_digit_run() {
        assert_eq!(
            extract_pincode("22 MG Road, Bengaluru 560001, India").as_deref(),
            Some("560001")
        );
        assert!(extract_pincode("flat 1234567 tower B").is_none());
        assert!(extract_pincode("no code here").is_none());
    }

    #[test]
    fn resolve_prefers_explicit_pincode() {
        assert_eq!(
            resolve_order_pincode("110011", "Bengaluru 560001").as_deref(),
            Some("110011")
        );
        assert_eq!(
            resolve_order_pincode("", "Bengaluru 560001").as_deref(),
            Some("560001")
        );
        assert!(resolve_order_pincode("", "no code").is_none());
    }
}
