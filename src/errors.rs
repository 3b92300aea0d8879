use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use sea_orm::TransactionError;

/// Unified error type for all domain services.
///
/// Every variant except [`ServiceError::LedgerCorruption`] is recoverable at
/// the caller: the application layer maps them to 4xx-equivalent responses.
/// `LedgerCorruption` means the cached stock no longer matches the movement
/// ledger and must be surfaced for alerting, never silently repaired.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i32,
        requested: Decimal,
        available: Decimal,
    },

    #[error("No active BOM for product {product_id}")]
    NoActiveBom { product_id: i32 },

    #[error("Cyclic BOM detected while exploding product {product_id}")]
    CyclicBom { product_id: i32 },

    #[error("Material shortage for material {material_id}: requested {requested}, available {available}")]
    MaterialShortage {
        material_id: i32,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Already completed: {0}")]
    AlreadyCompleted(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Stock ledger corruption for product {product_id}: cached {cached}, ledger sum {computed}")]
    LedgerCorruption {
        product_id: i32,
        cached: Decimal,
        computed: Decimal,
    },
}

impl ServiceError {
    /// Whether the caller can recover by fixing the request and retrying.
    /// Ledger corruption and infrastructure failures are not the caller's
    /// fault and should page someone instead.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::LedgerCorruption { .. } | Self::DatabaseError(_) | Self::EventError(_)
        )
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<TransactionError<ServiceError>> for ServiceError {
    fn from(err: TransactionError<ServiceError>) -> Self {
        match err {
            TransactionError::Connection(db) => ServiceError::DatabaseError(db),
            TransactionError::Transaction(service) => service,
        }
    }
}
