use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::order::OrderStatus;

/// Error payload returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable error code for client branching
    pub code: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    // -- validation: rejected before any write --
    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("Variant {0} not found")]
    VariantNotFound(uuid::Uuid),

    #[error("Checkout session has no items")]
    NoItems,

    #[error("Shipping address is not set")]
    AddressNotSet,

    #[error("Validation error: {0}")]
    ValidationError(String),

    // -- authorization --
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    // -- not found --
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Order {0} not found")]
    OrderNotFound(String),

    // -- state conflicts: the resource no longer allows this --
    #[error("Checkout session is not editable")]
    SessionNotEditable,

    #[error("Checkout session has expired")]
    SessionExpired,

    #[error("Checkout session is already confirmed")]
    AlreadyConfirmed,

    #[error("Illegal order status transition from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order status {0} is terminal")]
    TerminalStatus(OrderStatus),

    #[error("Conflict: {0}")]
    Conflict(String),

    // -- resource conflicts: retryable business failures --
    #[error("Insufficient stock for variant {0}")]
    OutOfStock(uuid::Uuid),

    #[error("Insufficient stock at commit time for variant {0}")]
    InsufficientStock(uuid::Uuid),

    // -- webhook reconciliation failures --
    #[error("Webhook amount {got} does not match order total {expected}")]
    AmountMismatch { expected: i64, got: i64 },

    #[error("Webhook currency {got} does not match order currency {expected}")]
    CurrencyMismatch { expected: String, got: String },

    // -- external dependency --
    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    // -- infrastructure --
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for the error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidQuantity
            | Self::NoItems
            | Self::AddressNotSet
            | Self::ValidationError(_)
            | Self::AmountMismatch { .. }
            | Self::CurrencyMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::VariantNotFound(_) | Self::NotFound(_) | Self::OrderNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::SessionNotEditable
            | Self::SessionExpired
            | Self::AlreadyConfirmed
            | Self::InvalidStatusTransition { .. }
            | Self::TerminalStatus(_)
            | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::OutOfStock(_) | Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::GatewayError(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, also used as the webhook ledger's
    /// failure reason.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuantity => "INVALID_QUANTITY",
            Self::VariantNotFound(_) => "VARIANT_NOT_FOUND",
            Self::NoItems => "NO_ITEMS",
            Self::AddressNotSet => "ADDRESS_NOT_SET",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::SessionNotEditable => "SESSION_NOT_EDITABLE",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::AlreadyConfirmed => "ALREADY_CONFIRMED",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::TerminalStatus(_) => "TERMINAL_STATUS",
            Self::Conflict(_) => "CONFLICT",
            Self::OutOfStock(_) => "OUT_OF_STOCK",
            Self::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Self::GatewayError(_) => "GATEWAY_ERROR",
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// messages so implementation details never leak to callers.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: self.code().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        assert_eq!(
            ServiceError::InvalidQuantity.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServiceError::NoItems.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::AddressNotSet.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::AmountMismatch {
                expected: 21_000,
                got: 20_000
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn state_conflicts_are_distinct_from_validation() {
        for err in [
            ServiceError::SessionNotEditable,
            ServiceError::SessionExpired,
            ServiceError::AlreadyConfirmed,
            ServiceError::TerminalStatus(OrderStatus::Completed),
            ServiceError::InvalidStatusTransition {
                from: OrderStatus::PendingPayment,
                to: OrderStatus::Shipped,
            },
        ] {
            assert_eq!(err.status_code(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn stock_exhaustion_is_a_retryable_business_failure() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            ServiceError::InsufficientStock(id).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::OutOfStock(id).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn gateway_failures_are_bad_gateway() {
        assert_eq!(
            ServiceError::GatewayError("timeout".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn internal_details_never_leak() {
        let err = ServiceError::InternalError("connection string exposed".into());
        assert_eq!(err.response_message(), "Internal server error");
    }
}
