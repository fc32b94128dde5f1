// ================================================================
// File: creditbook-common/src/error.rs
// ================================================================

use thiserror::Error;

/// Broad classes of failure. The HTTP layer and the retry loop both key off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before a ledger transaction starts.
    Validation,
    /// Missing identity or missing role/ownership.
    Authorization,
    /// A ledger rule refused the mutation; the transaction was rolled back.
    BusinessRule,
    /// Aggregate and lot bookkeeping disagree. Needs an operator.
    Corruption,
    /// Storage, I/O, configuration.
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    // Boundary errors:
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Business rule violations:
    #[error("Insufficient credits: need {needed}, have {available}")]
    InsufficientCredits { needed: i64, available: i64 },

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Promo code not found: {0}")]
    CodeNotFound(String),

    #[error("Promo code expired: {0}")]
    CodeExpired(String),

    #[error("Promo code exhausted: {0}")]
    CodeExhausted(String),

    #[error("Promo code already redeemed: {0}")]
    AlreadyRedeemed(String),

    #[error("Resource already owned: {0}")]
    AlreadyOwned(String),

    #[error("Duplicate promo code: {0}")]
    DuplicateCode(String),

    #[error("Not found error: {0}")]
    NotFound(String),

    // Fatal:
    #[error("Ledger corruption: {0}")]
    LedgerCorruption(String),

    // Infrastructure:
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Uuid error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::InvalidAmount(_) | Error::Uuid(_) => ErrorKind::Validation,
            Error::Unauthenticated | Error::Unauthorized(_) => ErrorKind::Authorization,
            Error::InsufficientCredits { .. }
            | Error::InsufficientBalance(_)
            | Error::CodeNotFound(_)
            | Error::CodeExpired(_)
            | Error::CodeExhausted(_)
            | Error::AlreadyRedeemed(_)
            | Error::AlreadyOwned(_)
            | Error::DuplicateCode(_)
            | Error::NotFound(_) => ErrorKind::BusinessRule,
            Error::LedgerCorruption(_) => ErrorKind::Corruption,
            Error::Database(_)
            | Error::Migration(_)
            | Error::Json(_)
            | Error::Io(_)
            | Error::Config(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code returned to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) | Error::Uuid(_) => "ValidationError",
            Error::InvalidAmount(_) => "InvalidAmount",
            Error::Unauthenticated => "Unauthenticated",
            Error::Unauthorized(_) => "Unauthorized",
            Error::InsufficientCredits { .. } => "InsufficientCredits",
            Error::InsufficientBalance(_) => "InsufficientBalance",
            Error::CodeNotFound(_) => "CodeNotFound",
            Error::CodeExpired(_) => "CodeExpired",
            Error::CodeExhausted(_) => "CodeExhausted",
            Error::AlreadyRedeemed(_) => "AlreadyRedeemed",
            Error::AlreadyOwned(_) => "AlreadyOwned",
            Error::DuplicateCode(_) => "DuplicateCode",
            Error::NotFound(_) => "NotFound",
            Error::LedgerCorruption(_) => "LedgerCorruption",
            Error::Database(_)
            | Error::Migration(_)
            | Error::Json(_)
            | Error::Io(_)
            | Error::Config(_) => "InternalError",
        }
    }

    /// Serialization failures and deadlocks abort the transaction without effect,
    /// so the whole operation can run again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(e) => e
                .as_database_error()
                .and_then(|db| db.code())
                .map(|code| code == "40001" || code == "40P01")
                .unwrap_or(false),
            _ => false,
        }
    }

    /// True when the database refused a row because a unique constraint already held it.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(e) => e
                .as_database_error()
                .map(|db| db.is_unique_violation())
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
        Error::Validation(err.to_string())
    }
}
