use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{PaymentMode, PaymentStatus, StructureId, StudentId, TransactionId};

/// all events that can be emitted by the ledger
///
/// Drained with `take_events` by the surrounding layer for notification
/// fan-out; the ledger itself never acts on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // catalog events
    StructureCreated {
        structure_id: StructureId,
        name: String,
        total_amount: Money,
        timestamp: DateTime<Utc>,
    },
    StructureDeleted {
        structure_id: StructureId,
        timestamp: DateTime<Utc>,
    },

    // account lifecycle events
    AccountOpened {
        student_id: StudentId,
        timestamp: DateTime<Utc>,
    },
    StructureAssigned {
        student_id: StudentId,
        structure_id: StructureId,
        discount: Money,
        total_payable: Money,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentRecorded {
        student_id: StudentId,
        transaction_id: TransactionId,
        amount: Money,
        mode: PaymentMode,
        total_paid: Money,
        balance: Money,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        student_id: StudentId,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
