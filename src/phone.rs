use crate::error::{AppError, AppResult};

/// Canonical cart/customer key: the last ten ASCII digits of the input.
/// Country codes, punctuation and whitespace never produce distinct keys,
/// so "+91 98765-43210" and "9876543210" address the same cart.
pub fn normalize_phone(value: &str) -> AppResult<String> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return Err(AppError::InvalidPhone);
    }
    Ok(digits[digits.len() - 10..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_country_code() {
        assert_eq!(normalize_phone("+91 98765-43210").unwrap(), "9876543210");
        assert_eq!(normalize_phone("09876543210").unwrap(), "9876543210");
        assert_eq!(normalize_phone("(987) 654-3210").unwrap(), "9876543210");
    }

    #[test]
    fn plain_ten_digits_pass_through() {
        assert_eq!(normalize_phone("9876543210").unwrap(), "9876543210");
    }

    #[test]
    fn fewer_than_ten_digits_is_rejected() {
        assert!(matches!(
            normalize_phone("12345"),
            Err(AppError::InvalidPhone)
        ));
        assert!(matches!(normalize_phone(""), Err(AppError::InvalidPhone)));
        assert!(matches!(
            normalize_phone("abc-def"),
            Err(AppError::InvalidPhone)
        ));
    }

    #[test]
    fn equivalent_inputs_share_one_key() {
        let a = normalize_phone("+91-98765 43210").unwrap();
        let b = normalize_phone("9876543210").unwrap();
        assert_eq!(a, b);
    }
}
