use chrono::{DateTime, Utc};

use crate::decimal::Money;
use crate::types::PaymentStatus;

/// derive the payment status from aggregate totals and the clock
///
/// Rules, in order: fully covered is Paid regardless of the due date; past
/// the due date with a shortfall is Overdue; anything paid is Partial;
/// otherwise Pending. Because Overdue depends on `now` alone, callers must
/// re-derive on every read, not only on write.
pub fn derive_status(
    total_payable: Money,
    total_paid: Money,
    next_due_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> PaymentStatus {
    if total_paid >= total_payable {
        return PaymentStatus::Paid;
    }

    if let Some(due) = next_due_date {
        if now > due {
            return PaymentStatus::Overdue;
        }
    }

    if total_paid.is_positive() {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Pending
    }
}
