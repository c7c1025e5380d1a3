use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::allocation::{allocate, verify, BucketBalance};
use crate::catalog::FeeBreakdown;
use crate::decimal::Money;
use crate::errors::Result;
use crate::status::derive_status;
use crate::types::{
    BucketKey, PaymentMode, PaymentStatus, PaymentTarget, StructureId, StudentId, TransactionId,
};

/// immutable payment record, the receipt returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// generated server-side, never client-supplied
    pub id: TransactionId,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
    pub mode: PaymentMode,
    pub target: PaymentTarget,
    pub remarks: Option<String>,
    pub collected_by: String,
}

/// one student's fee account, the unit of concurrency control
///
/// The transaction log is append-only and authoritative; every derived
/// field below it is recomputed from the log on each write and can be
/// reproduced from scratch at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentFeeAccount {
    pub student_id: StudentId,
    pub assigned_structure_id: Option<StructureId>,
    /// copied from the template at assignment time, owned by the account
    pub payable_breakdown: FeeBreakdown,
    /// flat reduction against the aggregate total, not per-bucket
    pub discount: Money,
    pub next_due_date: Option<DateTime<Utc>>,
    pub transactions: Vec<Transaction>,

    // derived, never independently mutated
    pub total_payable: Money,
    pub total_paid: Money,
    pub balance: Money,
    pub raw_balance: Money,
    pub credit: Money,
    pub bucket_balances: Vec<BucketBalance>,
    pub status: PaymentStatus,
    pub next_due_bucket: Option<BucketKey>,

    /// incremented on every successful write
    pub version: u64,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentFeeAccount {
    /// open an empty account with no obligation yet
    pub fn new(student_id: StudentId, now: DateTime<Utc>) -> Self {
        Self {
            student_id,
            assigned_structure_id: None,
            payable_breakdown: FeeBreakdown::new(),
            discount: Money::ZERO,
            next_due_date: None,
            transactions: Vec::new(),
            total_payable: Money::ZERO,
            total_paid: Money::ZERO,
            balance: Money::ZERO,
            raw_balance: Money::ZERO,
            credit: Money::ZERO,
            bucket_balances: Vec::new(),
            status: derive_status(Money::ZERO, Money::ZERO, None, now),
            next_due_bucket: None,
            version: 0,
            opened_at: now,
            updated_at: now,
        }
    }

    /// replay the full log and refresh every derived field
    ///
    /// Cross-checks the result before touching self, so a failure leaves
    /// the account unchanged.
    pub fn recompute(&mut self, now: DateTime<Utc>) -> Result<()> {
        let outcome = allocate(&self.payable_breakdown, self.discount, &self.transactions)?;
        verify(&outcome, &self.transactions)?;

        self.total_payable = outcome.total_payable;
        self.total_paid = outcome.total_paid;
        self.balance = outcome.balance;
        self.raw_balance = outcome.raw_balance;
        self.credit = outcome.credit;
        self.bucket_balances = outcome.bucket_balances;
        self.next_due_bucket = outcome.next_due_bucket;
        self.status = derive_status(self.total_payable, self.total_paid, self.next_due_date, now);
        Ok(())
    }

    /// status as of `now`, without persisting anything
    pub fn status_at(&self, now: DateTime<Utc>) -> PaymentStatus {
        derive_status(self.total_payable, self.total_paid, self.next_due_date, now)
    }

    /// a read snapshot with the time-sensitive status refreshed
    pub fn snapshot(&self, now: DateTime<Utc>) -> StudentFeeAccount {
        let mut copy = self.clone();
        copy.status = self.status_at(now);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::YearKey;
    use chrono::Duration;

    fn account_with_structure(now: DateTime<Utc>) -> StudentFeeAccount {
        let mut account = StudentFeeAccount::new("stu-1".to_string(), now);
        account.payable_breakdown = FeeBreakdown::new()
            .with_charge(YearKey::Year1, "admissionFee", Money::from_major(5000))
            .with_charge(YearKey::Year1, "hostelFee", Money::from_major(3000));
        account.recompute(now).unwrap();
        account
    }

    fn payment(amount: i64, now: DateTime<Utc>) -> Transaction {
        Transaction {
            id: format!("rcp-{}", amount),
            amount: Money::from_major(amount),
            timestamp: now,
            mode: PaymentMode::Upi,
            target: PaymentTarget::General,
            remarks: None,
            collected_by: "op-1".to_string(),
        }
    }

    #[test]
    fn test_fresh_account_has_no_obligation() {
        let now = Utc::now();
        let account = StudentFeeAccount::new("stu-1".to_string(), now);
        assert_eq!(account.total_payable, Money::ZERO);
        assert_eq!(account.version, 0);
        assert_eq!(account.status, PaymentStatus::Paid);
    }

    #[test]
    fn test_recompute_tracks_appended_payments() {
        let now = Utc::now();
        let mut account = account_with_structure(now);
        assert_eq!(account.status, PaymentStatus::Pending);

        account.transactions.push(payment(5000, now));
        account.recompute(now).unwrap();

        assert_eq!(account.total_paid, Money::from_major(5000));
        assert_eq!(account.balance, Money::from_major(3000));
        assert_eq!(account.status, PaymentStatus::Partial);
    }

    #[test]
    fn test_snapshot_refreshes_overdue_without_mutation() {
        let now = Utc::now();
        let mut account = account_with_structure(now);
        account.next_due_date = Some(now + Duration::days(1));
        account.recompute(now).unwrap();
        assert_eq!(account.status, PaymentStatus::Pending);

        let later = now + Duration::days(2);
        let snap = account.snapshot(later);
        assert_eq!(snap.status, PaymentStatus::Overdue);
        // the stored state is untouched; only reads see the overlay
        assert_eq!(account.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_account_state_round_trips_through_json() {
        let now = Utc::now();
        let mut account = account_with_structure(now);
        account.transactions.push(payment(2000, now));
        account.recompute(now).unwrap();

        let json = serde_json::to_string(&account).unwrap();
        let back: StudentFeeAccount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, account);
    }

    #[test]
    fn test_failed_recompute_leaves_account_unchanged() {
        let now = Utc::now();
        let mut account = account_with_structure(now);
        account.transactions.push(payment(5000, now));
        account.recompute(now).unwrap();
        let before = account.clone();

        // a zero-amount record is malformed input for the engine
        let mut bad = payment(1, now);
        bad.amount = Money::ZERO;
        account.transactions.push(bad);
        assert!(account.recompute(now).is_err());
        account.transactions.pop();

        assert_eq!(account, before);
    }
}
