use crate::{
    job::JobId,
    types::{ProductId, RateKey},
};
use thiserror::Error;

/// Persistence failures. Logged by the batches; a job run that hits one
/// aborts for this cycle and retries on the next trigger.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store connection lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A premium calculation input that failed validation.
/// Variants are listed in the order they are checked.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Product id must be positive, got {0}")]
    InvalidProductId(ProductId),

    #[error("Gender must be M or F, got '{0}'")]
    InvalidGender(String),

    #[error("Entry age must be within 0-100, got {0}")]
    EntryAgeOutOfBounds(i32),

    #[error("Insurance period must be within 1-50 years, got {0}")]
    PeriodOutOfBounds(i32),

    #[error("Insured amount must be greater than zero, got {0}")]
    NonPositiveAmount(f64),

    #[error("Entry age {age} is outside the product range ({min}-{max})")]
    AgeOutsideProductRange { age: i32, min: i32, max: i32 },

    #[error("Insurance period {period} is outside the product range ({min}-{max} years)")]
    PeriodOutsideProductRange { period: i32, min: i32, max: i32 },
}

#[derive(Error, Debug)]
pub enum CalcError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("No applicable rate for {key}")]
    RateNotFound { key: RateKey },

    #[error("No rates configured for product {product_id}")]
    ProductNotFound { product_id: ProductId },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CalcError {
    /// Validation and not-found failures are the caller's to fix;
    /// persistence failures surface as a generic server error.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RateNotFound { .. } | Self::ProductNotFound { .. })
    }
}

pub type CalcResult<T> = Result<T, CalcError>;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Job '{job}' is not registered")]
    JobNotRegistered { job: JobId },

    #[error("Job '{job}' is already registered")]
    DuplicateJob { job: JobId },

    #[error("Job '{job}' panicked")]
    JobPanicked { job: JobId },

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type BatchResult<T> = Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Gender;

    #[test]
    fn only_store_failures_are_server_errors() {
        let store = CalcError::from(StoreError::LockPoisoned);
        assert!(!store.is_client_error());
        assert!(!store.is_not_found());

        let invalid = CalcError::from(ValidationError::EntryAgeOutOfBounds(150));
        assert!(invalid.is_client_error());
        assert!(!invalid.is_not_found());

        let missing = CalcError::RateNotFound {
            key: RateKey { product_id: 1, gender: Gender::Male, entry_age: 30, insurance_period: 20 },
        };
        assert!(missing.is_client_error());
        assert!(missing.is_not_found());
    }
}
