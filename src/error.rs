use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::response::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Phone number must contain at least 10 digits")]
    InvalidPhone,

    #[error("Cart is busy, please retry")]
    LockTimeout,

    #[error("Delivery pincode is required. Enter a valid 6-digit pincode.")]
    PincodeRequired,

    #[error("Sorry, we do not deliver to pincode {0} yet.")]
    PincodeNotServiceable(String),

    #[error("Cart is empty")]
    CartEmpty,

    #[error("{name} is out of stock (only {available} left)")]
    OutOfStock { name: String, available: i32 },

    #[error("Max 99 quantity per item")]
    QuantityLimitExceeded,

    #[error("Customer not found")]
    CustomerNotFound,

    #[error("Cart not found")]
    CartNotFound,

    #[error("Cart item not found")]
    ItemNotFound,

    #[error("Product not found")]
    ProductNotFound,

    #[error("Not Found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidPhone
            | AppError::PincodeRequired
            | AppError::PincodeNotServiceable(_)
            | AppError::CartEmpty
            | AppError::OutOfStock { .. }
            | AppError::QuantityLimitExceeded
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::CustomerNotFound
            | AppError::CartNotFound
            | AppError::ItemNotFound
            | AppError::ProductNotFound
            | AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            // Lock acquisition failure is retryable, not a business rejection.
            AppError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                error: self.to_string(),
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
