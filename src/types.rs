use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// unique identifier for a fee structure
pub type StructureId = Uuid;

/// student identifier, supplied by the surrounding system
pub type StudentId = String;

/// receipt identifier for a transaction
pub type TransactionId = String;

/// academic programs a structure can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Program {
    BTech,
    MTech,
    Diploma,
    Pharmacy,
    Mba,
}

/// how a payment was collected; a label, not a gateway call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMode {
    Cash,
    Cheque,
    Card,
    BankTransfer,
    Upi,
}

/// academic year of a charge, the outer ordering of the breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum YearKey {
    #[serde(rename = "year1")]
    Year1,
    #[serde(rename = "year2")]
    Year2,
    #[serde(rename = "year3")]
    Year3,
}

impl YearKey {
    pub const ALL: [YearKey; 3] = [YearKey::Year1, YearKey::Year2, YearKey::Year3];
}

impl fmt::Display for YearKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearKey::Year1 => write!(f, "year1"),
            YearKey::Year2 => write!(f, "year2"),
            YearKey::Year3 => write!(f, "year3"),
        }
    }
}

/// a single (year, component) cell of the breakdown
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub year: YearKey,
    pub component: String,
}

impl BucketKey {
    pub fn new(year: YearKey, component: impl Into<String>) -> Self {
        Self {
            year,
            component: component.into(),
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.year, self.component)
    }
}

/// where a payment should be applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentTarget {
    /// apply against outstanding buckets in canonical order
    General,
    /// apply to a specific bucket, spilling forward when it overfills
    Bucket(BucketKey),
}

/// payment state of an account
///
/// Overdue is a time overlay on Pending/Partial and is recomputed on
/// every read, not only on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// nothing paid yet
    Pending,
    /// some payments recorded, balance remains
    Partial,
    /// obligation fully covered
    Paid,
    /// past due date with a balance remaining
    Overdue,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Partial => write!(f, "partial"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Overdue => write!(f, "overdue"),
        }
    }
}
