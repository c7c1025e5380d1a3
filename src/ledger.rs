use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hourglass_rs::{SafeTimeProvider, TimeSource};

use crate::account::{StudentFeeAccount, Transaction};
use crate::allocation::{allocate, verify};
use crate::catalog::{FeeBreakdown, FeeStructure, StructureCatalog};
use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::receipt::ReceiptIdGenerator;
use crate::types::{PaymentMode, PaymentTarget, Program, StructureId, StudentId};

/// payment submission
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub amount: Money,
    pub mode: PaymentMode,
    pub target: PaymentTarget,
    pub remarks: Option<String>,
    /// identity of the recording operator, resolved by the caller's auth layer
    pub collected_by: String,
}

/// one account slot
///
/// `write_lock` serializes the read-modify-write of payment and assignment
/// operations; `committed` holds the last fully-committed state and is only
/// swapped after the cross-check passes, so readers never see a partial
/// write and never wait on an in-flight one.
#[derive(Debug)]
struct AccountEntry {
    write_lock: Mutex<()>,
    committed: RwLock<StudentFeeAccount>,
}

impl AccountEntry {
    fn new(account: StudentFeeAccount) -> Self {
        Self {
            write_lock: Mutex::new(()),
            committed: RwLock::new(account),
        }
    }
}

/// the student fee ledger
///
/// Owns the structure catalog and one account per student, mediates every
/// read and write, and guarantees that any two writes against the same
/// account are serialized while writes to different accounts proceed in
/// parallel.
pub struct FeeLedger {
    config: LedgerConfig,
    catalog: StructureCatalog,
    accounts: DashMap<StudentId, Arc<AccountEntry>>,
    receipts: ReceiptIdGenerator,
    events: Mutex<EventStore>,
}

impl FeeLedger {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;

        let receipts = ReceiptIdGenerator::new(config.receipt_prefix.clone(), config.max_id_attempts);
        Ok(Self {
            config,
            catalog: StructureCatalog::new(),
            accounts: DashMap::new(),
            receipts,
            events: Mutex::new(EventStore::new()),
        })
    }

    // ------------------------------------------------------------------
    // structure catalog

    /// create a fee structure template, recomputing the total server-side
    pub fn create_structure(
        &self,
        name: impl Into<String>,
        program: Program,
        academic_year: impl Into<String>,
        breakdown: FeeBreakdown,
        time_provider: &SafeTimeProvider,
    ) -> Result<FeeStructure> {
        let structure = self
            .catalog
            .create(name, program, academic_year, breakdown, time_provider)?;

        tracing::info!(
            structure_id = %structure.id,
            name = %structure.name,
            total = %structure.total_amount,
            "fee structure created"
        );
        self.emit(Event::StructureCreated {
            structure_id: structure.id,
            name: structure.name.clone(),
            total_amount: structure.total_amount,
            timestamp: structure.created_at,
        });

        Ok(structure)
    }

    /// all templates, newest first
    pub fn list_structures(&self) -> Vec<FeeStructure> {
        self.catalog.list()
    }

    pub fn get_structure(&self, id: StructureId) -> Result<FeeStructure> {
        self.catalog.get(id)
    }

    /// delete a template; accounts that already copied it are unaffected
    pub fn delete_structure(
        &self,
        id: StructureId,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.catalog.delete(id)?;
        self.emit(Event::StructureDeleted {
            structure_id: id,
            timestamp: time_provider.now(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // account operations

    /// open an account with no obligation yet
    ///
    /// Payments require an existing account; they are never implicitly
    /// created, so money cannot be accepted against an undefined obligation.
    pub fn open_account(
        &self,
        student_id: impl Into<StudentId>,
        time_provider: &SafeTimeProvider,
    ) -> Result<StudentFeeAccount> {
        let student_id = student_id.into();
        let now = time_provider.now();

        match self.accounts.entry(student_id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::AccountAlreadyExists { student_id }),
            Entry::Vacant(slot) => {
                let account = StudentFeeAccount::new(student_id.clone(), now);
                slot.insert(Arc::new(AccountEntry::new(account.clone())));

                tracing::info!(student_id = %student_id, "fee account opened");
                self.emit(Event::AccountOpened {
                    student_id,
                    timestamp: now,
                });
                Ok(account)
            }
        }
    }

    /// assign a structure to a student, creating the account when missing
    ///
    /// The breakdown is copied into the account and the existing transaction
    /// history is replayed against it, so re-assignment can legitimately
    /// move an account backward (Paid to Partial) and callers will see it.
    pub fn assign_structure(
        &self,
        student_id: impl Into<StudentId>,
        structure_id: StructureId,
        discount: Money,
        due_date: Option<DateTime<Utc>>,
        time_provider: &SafeTimeProvider,
    ) -> Result<StudentFeeAccount> {
        let student_id = student_id.into();
        let now = time_provider.now();

        if discount.is_negative() {
            return Err(LedgerError::InvalidDiscount { discount });
        }
        let structure = self.catalog.get(structure_id)?;

        let entry = match self.accounts.entry(student_id.clone()) {
            Entry::Occupied(slot) => Arc::clone(slot.get()),
            Entry::Vacant(slot) => {
                let account = StudentFeeAccount::new(student_id.clone(), now);
                let entry = Arc::new(AccountEntry::new(account));
                slot.insert(Arc::clone(&entry));
                self.emit(Event::AccountOpened {
                    student_id: student_id.clone(),
                    timestamp: now,
                });
                entry
            }
        };

        let _guard = self.lock_account(&entry, || LedgerError::AccountLocked {
            student_id: student_id.clone(),
        })?;

        let mut working = self.read_committed(&entry)?;
        let old_status = working.status_at(now);

        working.assigned_structure_id = Some(structure.id);
        working.payable_breakdown = structure.breakdown.clone();
        working.discount = discount;
        working.next_due_date = due_date;
        working.recompute(now)?;
        working.version += 1;
        working.updated_at = now;

        self.commit(&entry, working.clone())?;

        tracing::info!(
            student_id = %student_id,
            structure_id = %structure.id,
            total_payable = %working.total_payable,
            status = %working.status,
            "structure assigned"
        );
        self.emit(Event::StructureAssigned {
            student_id: student_id.clone(),
            structure_id: structure.id,
            discount,
            total_payable: working.total_payable,
            timestamp: now,
        });
        if working.status != old_status {
            self.emit(Event::StatusChanged {
                student_id,
                old_status,
                new_status: working.status,
                timestamp: now,
            });
        }

        Ok(working)
    }

    /// record a payment and return the receipt with the new snapshot
    ///
    /// Either the transaction is appended and every derived field updated,
    /// or nothing is observable; there is no partial application.
    pub fn record_payment(
        &self,
        student_id: impl Into<StudentId>,
        request: PaymentRequest,
        time_provider: &SafeTimeProvider,
    ) -> Result<(Transaction, StudentFeeAccount)> {
        let student_id = student_id.into();
        let now = time_provider.now();

        if !request.amount.is_positive() {
            return Err(LedgerError::InvalidPaymentAmount {
                amount: request.amount,
            });
        }

        let entry = self
            .accounts
            .get(&student_id)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| LedgerError::AccountNotFound {
                student_id: student_id.clone(),
            })?;

        let attempts = self.config.max_lock_attempts;
        let _guard = self.lock_account(&entry, || LedgerError::ConcurrentModification {
            student_id: student_id.clone(),
            attempts,
        })?;

        let mut working = self.read_committed(&entry)?;
        let old_status = working.status_at(now);

        let transaction = Transaction {
            id: self.receipts.next(time_provider)?,
            amount: request.amount,
            timestamp: now,
            mode: request.mode,
            target: request.target,
            remarks: request.remarks,
            collected_by: request.collected_by,
        };

        working.transactions.push(transaction.clone());
        if let Err(err) = working.recompute(now) {
            tracing::warn!(
                student_id = %student_id,
                receipt = %transaction.id,
                error = %err,
                "payment rejected, nothing committed"
            );
            return Err(err);
        }
        working.version += 1;
        working.updated_at = now;

        self.commit(&entry, working.clone())?;

        tracing::info!(
            student_id = %student_id,
            receipt = %transaction.id,
            amount = %transaction.amount,
            balance = %working.balance,
            status = %working.status,
            "payment recorded"
        );
        self.emit(Event::PaymentRecorded {
            student_id: student_id.clone(),
            transaction_id: transaction.id.clone(),
            amount: transaction.amount,
            mode: transaction.mode,
            total_paid: working.total_paid,
            balance: working.balance,
            timestamp: now,
        });
        if working.status != old_status {
            self.emit(Event::StatusChanged {
                student_id,
                old_status,
                new_status: working.status,
                timestamp: now,
            });
        }

        Ok((transaction, working))
    }

    /// record a payment with system time
    pub fn record_payment_now(
        &self,
        student_id: impl Into<StudentId>,
        request: PaymentRequest,
    ) -> Result<(Transaction, StudentFeeAccount)> {
        let time = SafeTimeProvider::new(TimeSource::System);
        self.record_payment(student_id, request, &time)
    }

    /// last committed state with the time-sensitive status refreshed
    ///
    /// Does not take the write lock; a concurrent writer is invisible until
    /// its commit lands.
    pub fn get_account(
        &self,
        student_id: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<StudentFeeAccount> {
        let entry = self
            .accounts
            .get(student_id)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| LedgerError::AccountNotFound {
                student_id: student_id.to_string(),
            })?;

        let committed = self.read_committed(&entry)?;
        Ok(committed.snapshot(time_provider.now()))
    }

    /// fetch an account with system time
    pub fn get_account_now(&self, student_id: &str) -> Result<StudentFeeAccount> {
        let time = SafeTimeProvider::new(TimeSource::System);
        self.get_account(student_id, &time)
    }

    /// audit an account: replay the full log and compare with what is stored
    pub fn verify_account(&self, student_id: &str) -> Result<()> {
        let entry = self
            .accounts
            .get(student_id)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| LedgerError::AccountNotFound {
                student_id: student_id.to_string(),
            })?;
        let account = self.read_committed(&entry)?;

        let outcome = allocate(
            &account.payable_breakdown,
            account.discount,
            &account.transactions,
        )?;
        verify(&outcome, &account.transactions)?;

        let matches = outcome.total_payable == account.total_payable
            && outcome.total_paid == account.total_paid
            && outcome.balance == account.balance
            && outcome.raw_balance == account.raw_balance
            && outcome.credit == account.credit
            && outcome.bucket_balances == account.bucket_balances
            && outcome.next_due_bucket == account.next_due_bucket;

        if !matches {
            tracing::warn!(student_id = %student_id, "account failed replay audit");
            return Err(LedgerError::InvariantViolation {
                message: format!(
                    "replayed state for {} does not match persisted derived fields",
                    student_id
                ),
            });
        }
        Ok(())
    }

    /// drain collected domain events
    pub fn take_events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(mut store) => store.take_events(),
            Err(_) => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // internals

    /// serialize writers with bounded try_lock retries
    fn lock_account<'a>(
        &self,
        entry: &'a AccountEntry,
        exhausted: impl Fn() -> LedgerError,
    ) -> Result<MutexGuard<'a, ()>> {
        for attempt in 0..self.config.max_lock_attempts {
            match entry.write_lock.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => {
                    return Err(LedgerError::InvariantViolation {
                        message: "account write lock poisoned".to_string(),
                    });
                }
                Err(TryLockError::WouldBlock) => {
                    if attempt + 1 < self.config.max_lock_attempts {
                        thread::sleep(Duration::from_millis(self.config.lock_retry_delay_ms));
                    }
                }
            }
        }
        Err(exhausted())
    }

    fn read_committed(&self, entry: &AccountEntry) -> Result<StudentFeeAccount> {
        entry
            .committed
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| LedgerError::InvariantViolation {
                message: "committed account state poisoned".to_string(),
            })
    }

    fn commit(&self, entry: &AccountEntry, account: StudentFeeAccount) -> Result<()> {
        let mut slot = entry
            .committed
            .write()
            .map_err(|_| LedgerError::InvariantViolation {
                message: "committed account state poisoned".to_string(),
            })?;
        *slot = account;
        Ok(())
    }

    fn emit(&self, event: Event) {
        if let Ok(mut store) = self.events.lock() {
            store.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentStatus, YearKey};
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    fn test_time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc::now()))
    }

    fn ledger() -> FeeLedger {
        FeeLedger::new(LedgerConfig::standard()).unwrap()
    }

    fn breakdown() -> FeeBreakdown {
        FeeBreakdown::new()
            .with_charge(YearKey::Year1, "admissionFee", Money::from_major(5000))
            .with_charge(YearKey::Year1, "hostelFee", Money::from_major(3000))
    }

    fn general_payment(amount: i64) -> PaymentRequest {
        PaymentRequest {
            amount: Money::from_major(amount),
            mode: PaymentMode::Cash,
            target: PaymentTarget::General,
            remarks: None,
            collected_by: "op-1".to_string(),
        }
    }

    fn assigned_account(ledger: &FeeLedger, time: &SafeTimeProvider) -> StructureId {
        let structure = ledger
            .create_structure("BTech 2025", Program::BTech, "2025-26", breakdown(), time)
            .unwrap();
        ledger
            .assign_structure("stu-1", structure.id, Money::ZERO, None, time)
            .unwrap();
        structure.id
    }

    #[test]
    fn test_payment_requires_existing_account() {
        let ledger = ledger();
        let time = test_time();

        let result = ledger.record_payment("ghost", general_payment(100), &time);
        assert!(matches!(result, Err(LedgerError::AccountNotFound { .. })));
    }

    #[test]
    fn test_open_account_rejects_duplicates() {
        let ledger = ledger();
        let time = test_time();

        ledger.open_account("stu-1", &time).unwrap();
        assert!(matches!(
            ledger.open_account("stu-1", &time),
            Err(LedgerError::AccountAlreadyExists { .. })
        ));
    }

    #[test]
    fn test_assign_creates_account_and_sets_baseline() {
        let ledger = ledger();
        let time = test_time();

        assigned_account(&ledger, &time);

        let account = ledger.get_account("stu-1", &time).unwrap();
        assert_eq!(account.total_payable, Money::from_major(8000));
        assert_eq!(account.status, PaymentStatus::Pending);
        assert_eq!(account.version, 1);
    }

    #[test]
    fn test_assign_unknown_structure() {
        let ledger = ledger();
        let time = test_time();

        let result = ledger.assign_structure("stu-1", Uuid::new_v4(), Money::ZERO, None, &time);
        assert!(matches!(result, Err(LedgerError::StructureNotFound { .. })));
    }

    #[test]
    fn test_payment_returns_receipt_and_updates_snapshot() {
        let ledger = ledger();
        let time = test_time();
        assigned_account(&ledger, &time);

        let (receipt, snapshot) = ledger
            .record_payment("stu-1", general_payment(5000), &time)
            .unwrap();

        assert!(receipt.id.starts_with("RCP-"));
        assert_eq!(snapshot.total_paid, Money::from_major(5000));
        assert_eq!(snapshot.balance, Money::from_major(3000));
        assert_eq!(snapshot.status, PaymentStatus::Partial);
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.transactions.len(), 1);
    }

    #[test]
    fn test_zero_amount_rejected_before_any_change() {
        let ledger = ledger();
        let time = test_time();
        assigned_account(&ledger, &time);

        let result = ledger.record_payment("stu-1", general_payment(0), &time);
        assert!(matches!(
            result,
            Err(LedgerError::InvalidPaymentAmount { .. })
        ));

        let account = ledger.get_account("stu-1", &time).unwrap();
        assert!(account.transactions.is_empty());
        assert_eq!(account.version, 1);
    }

    #[test]
    fn test_targeted_payment_rejected_cleanly_for_unknown_bucket() {
        let ledger = ledger();
        let time = test_time();
        assigned_account(&ledger, &time);

        let request = PaymentRequest {
            target: PaymentTarget::Bucket(crate::types::BucketKey::new(YearKey::Year3, "busFee")),
            ..general_payment(100)
        };
        let result = ledger.record_payment("stu-1", request, &time);
        assert!(matches!(result, Err(LedgerError::UnknownBucket { .. })));

        // nothing appended, version untouched
        let account = ledger.get_account("stu-1", &time).unwrap();
        assert!(account.transactions.is_empty());
        assert_eq!(account.version, 1);
    }

    #[test]
    fn test_reassignment_can_move_account_backward() {
        let ledger = ledger();
        let time = test_time();
        let _first = assigned_account(&ledger, &time);

        ledger
            .record_payment("stu-1", general_payment(8000), &time)
            .unwrap();
        assert_eq!(
            ledger.get_account("stu-1", &time).unwrap().status,
            PaymentStatus::Paid
        );

        // a bigger obligation replayed over the same history
        let bigger = FeeBreakdown::new()
            .with_charge(YearKey::Year1, "admissionFee", Money::from_major(5000))
            .with_charge(YearKey::Year1, "hostelFee", Money::from_major(3000))
            .with_charge(YearKey::Year2, "tuitionFee", Money::from_major(4000));
        let structure = ledger
            .create_structure("BTech 2025 rev", Program::BTech, "2025-26", bigger, &time)
            .unwrap();
        let account = ledger
            .assign_structure("stu-1", structure.id, Money::ZERO, None, &time)
            .unwrap();

        assert_eq!(account.status, PaymentStatus::Partial);
        assert_eq!(account.balance, Money::from_major(4000));
        assert_eq!(account.transactions.len(), 1);
    }

    #[test]
    fn test_overdue_is_recomputed_on_read() {
        let ledger = ledger();
        let start = Utc::now();
        let time = SafeTimeProvider::new(TimeSource::Test(start));

        let structure = ledger
            .create_structure("BTech 2025", Program::BTech, "2025-26", breakdown(), &time)
            .unwrap();
        ledger
            .assign_structure(
                "stu-1",
                structure.id,
                Money::ZERO,
                Some(start + ChronoDuration::days(7)),
                &time,
            )
            .unwrap();

        assert_eq!(
            ledger.get_account("stu-1", &time).unwrap().status,
            PaymentStatus::Pending
        );

        // no writes, just time passing
        let later = SafeTimeProvider::new(TimeSource::Test(start + ChronoDuration::days(8)));
        assert_eq!(
            ledger.get_account("stu-1", &later).unwrap().status,
            PaymentStatus::Overdue
        );
    }

    #[test]
    fn test_verify_account_accepts_committed_state() {
        let ledger = ledger();
        let time = test_time();
        assigned_account(&ledger, &time);
        ledger
            .record_payment("stu-1", general_payment(2500), &time)
            .unwrap();

        ledger.verify_account("stu-1").unwrap();
    }

    #[test]
    fn test_events_are_collected_and_drained() {
        let ledger = ledger();
        let time = test_time();
        assigned_account(&ledger, &time);
        ledger
            .record_payment("stu-1", general_payment(8000), &time)
            .unwrap();

        let events = ledger.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::StructureCreated { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::AccountOpened { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::PaymentRecorded { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            Event::StatusChanged {
                new_status: PaymentStatus::Paid,
                ..
            }
        )));

        assert!(ledger.take_events().is_empty());
    }

    #[test]
    fn test_reads_see_only_committed_versions() {
        let ledger = ledger();
        let time = test_time();
        assigned_account(&ledger, &time);

        let v1 = ledger.get_account("stu-1", &time).unwrap().version;
        ledger
            .record_payment("stu-1", general_payment(100), &time)
            .unwrap();
        let v2 = ledger.get_account("stu-1", &time).unwrap().version;
        assert_eq!(v2, v1 + 1);
    }
}
