pub mod account;
pub mod allocation;
pub mod catalog;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod receipt;
pub mod status;
pub mod types;

// re-export key types
pub use account::{StudentFeeAccount, Transaction};
pub use allocation::{allocate, AllocationOutcome, BucketBalance};
pub use catalog::{Charge, FeeBreakdown, FeeStructure, StructureCatalog, YearCharges};
pub use config::LedgerConfig;
pub use decimal::Money;
pub use errors::{LedgerError, Result};
pub use events::{Event, EventStore};
pub use ledger::{FeeLedger, PaymentRequest};
pub use receipt::ReceiptIdGenerator;
pub use status::derive_status;
pub use types::{
    BucketKey, PaymentMode, PaymentStatus, PaymentTarget, Program, StructureId, StudentId,
    TransactionId, YearKey,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
