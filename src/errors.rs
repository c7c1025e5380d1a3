use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::YearKey;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount {
        amount: Money,
    },

    #[error("invalid discount: {discount}")]
    InvalidDiscount {
        discount: Money,
    },

    #[error("invalid charge amount for {component}: {amount}")]
    InvalidChargeAmount {
        component: String,
        amount: Money,
    },

    #[error("unknown bucket: {year} / {component}")]
    UnknownBucket {
        year: YearKey,
        component: String,
    },

    #[error("fee structure not found: {id}")]
    StructureNotFound {
        id: Uuid,
    },

    #[error("no fee account for student: {student_id}")]
    AccountNotFound {
        student_id: String,
    },

    #[error("fee account already exists for student: {student_id}")]
    AccountAlreadyExists {
        student_id: String,
    },

    #[error("account busy with a concurrent write: {student_id}")]
    AccountLocked {
        student_id: String,
    },

    #[error("concurrent modification on account {student_id} after {attempts} attempts")]
    ConcurrentModification {
        student_id: String,
        attempts: u32,
    },

    #[error("receipt id generation exhausted after {attempts} attempts")]
    IdGenerationExhausted {
        attempts: u32,
    },

    #[error("ledger invariant violated: {message}")]
    InvariantViolation {
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
