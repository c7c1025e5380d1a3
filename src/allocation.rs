use serde::{Deserialize, Serialize};

use crate::account::Transaction;
use crate::catalog::FeeBreakdown;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{BucketKey, PaymentTarget};

/// per-bucket position after allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketBalance {
    pub bucket: BucketKey,
    /// obligation for this bucket after discount
    pub payable: Money,
    /// amount applied to this bucket so far
    pub paid: Money,
    /// payable minus paid, never negative
    pub outstanding: Money,
}

/// aggregate result of replaying a transaction history against a breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub bucket_balances: Vec<BucketBalance>,
    pub total_payable: Money,
    pub total_paid: Money,
    /// total_payable minus total_paid, clamped at zero for reporting
    pub balance: Money,
    /// the unclamped value, negative when overpaid
    pub raw_balance: Money,
    /// paid beyond the total obligation; kept for audit, not refundable
    pub credit: Money,
    /// first bucket in canonical order with outstanding > 0
    pub next_due_bucket: Option<BucketKey>,
}

/// replay a transaction history against a breakdown and discount
///
/// Deterministic and side-effect-free: re-running over the full log must
/// reproduce the persisted derived fields exactly, which is what the
/// account audit relies on.
///
/// Canonical order is year1 before year2 before year3, then declaration
/// order within a year. The discount consumes obligation from the last
/// buckets backward so early mandatory charges stay collectible first.
/// General payments waterfall from the front. Targeted payments fill their
/// bucket, spill forward, and any remainder past the final bucket falls
/// back to the front so partial-bucket overpayment is never stranded.
pub fn allocate(
    breakdown: &FeeBreakdown,
    discount: Money,
    transactions: &[Transaction],
) -> Result<AllocationOutcome> {
    breakdown.validate()?;

    if discount.is_negative() {
        return Err(LedgerError::InvalidDiscount { discount });
    }

    let mut buckets: Vec<BucketBalance> = breakdown
        .flatten()
        .into_iter()
        .map(|(bucket, amount)| BucketBalance {
            bucket,
            payable: amount,
            paid: Money::ZERO,
            outstanding: amount,
        })
        .collect();

    // discount reduces the obligation starting from the latest buckets
    let mut remaining_discount = discount;
    for bucket in buckets.iter_mut().rev() {
        if remaining_discount.is_zero() {
            break;
        }
        let taken = remaining_discount.min(bucket.payable);
        bucket.payable -= taken;
        bucket.outstanding = bucket.payable;
        remaining_discount -= taken;
    }

    let total_payable: Money = buckets.iter().map(|b| b.payable).sum();

    let mut credit = Money::ZERO;
    for transaction in transactions {
        if !transaction.amount.is_positive() {
            return Err(LedgerError::InvalidPaymentAmount {
                amount: transaction.amount,
            });
        }

        let start = match &transaction.target {
            PaymentTarget::General => 0,
            PaymentTarget::Bucket(key) => buckets
                .iter()
                .position(|b| &b.bucket == key)
                .ok_or_else(|| LedgerError::UnknownBucket {
                    year: key.year,
                    component: key.component.clone(),
                })?,
        };

        let mut remaining = apply_waterfall(&mut buckets, start, transaction.amount);
        if remaining.is_positive() && start > 0 {
            // targeted spill past the last bucket wraps to the front
            remaining = apply_waterfall(&mut buckets, 0, remaining);
        }
        credit += remaining;
    }

    let total_paid: Money = transactions.iter().map(|t| t.amount).sum();
    let raw_balance = total_payable - total_paid;
    let balance = raw_balance.max(Money::ZERO);
    let next_due_bucket = buckets
        .iter()
        .find(|b| b.outstanding.is_positive())
        .map(|b| b.bucket.clone());

    Ok(AllocationOutcome {
        bucket_balances: buckets,
        total_payable,
        total_paid,
        balance,
        raw_balance,
        credit,
        next_due_bucket,
    })
}

/// fill outstanding buckets from `start` onward, returning what is left over
fn apply_waterfall(buckets: &mut [BucketBalance], start: usize, amount: Money) -> Money {
    let mut remaining = amount;
    for bucket in buckets.iter_mut().skip(start) {
        if remaining.is_zero() {
            break;
        }
        let applied = remaining.min(bucket.outstanding);
        bucket.outstanding -= applied;
        bucket.paid += applied;
        remaining -= applied;
    }
    remaining
}

/// cross-check an outcome against the transaction log it was computed from
///
/// Failure here means a bug, not bad input; callers must refuse to persist.
pub fn verify(outcome: &AllocationOutcome, transactions: &[Transaction]) -> Result<()> {
    let paid_sum: Money = transactions.iter().map(|t| t.amount).sum();
    if outcome.total_paid != paid_sum {
        return Err(LedgerError::InvariantViolation {
            message: format!(
                "total_paid {} does not match transaction sum {}",
                outcome.total_paid, paid_sum
            ),
        });
    }

    if outcome.raw_balance != outcome.total_payable - outcome.total_paid {
        return Err(LedgerError::InvariantViolation {
            message: format!(
                "raw balance {} does not reconcile payable {} against paid {}",
                outcome.raw_balance, outcome.total_payable, outcome.total_paid
            ),
        });
    }

    if outcome.balance != outcome.raw_balance.max(Money::ZERO) {
        return Err(LedgerError::InvariantViolation {
            message: format!("balance {} is not the clamped raw balance", outcome.balance),
        });
    }

    let outstanding_sum: Money = outcome.bucket_balances.iter().map(|b| b.outstanding).sum();
    if outcome.balance != outstanding_sum {
        return Err(LedgerError::InvariantViolation {
            message: format!(
                "balance {} does not equal bucket outstanding sum {}",
                outcome.balance, outstanding_sum
            ),
        });
    }

    for bucket in &outcome.bucket_balances {
        if bucket.outstanding.is_negative() || bucket.outstanding != bucket.payable - bucket.paid {
            return Err(LedgerError::InvariantViolation {
                message: format!("bucket {} does not reconcile", bucket.bucket),
            });
        }
    }

    Ok(())
}
