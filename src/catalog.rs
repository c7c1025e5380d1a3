use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{BucketKey, Program, StructureId, YearKey};

/// one named charge within a year, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub component: String,
    pub amount: Money,
}

/// charges for a single academic year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearCharges {
    pub year: YearKey,
    pub charges: Vec<Charge>,
}

/// per-year breakdown of named charges
///
/// Years are held in canonical order (year1 before year2 before year3);
/// components keep the order they were declared in. That combined order is
/// the tie-break for allocation, discount application and due reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FeeBreakdown {
    years: Vec<YearCharges>,
}

impl FeeBreakdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// builder-style charge insertion
    pub fn with_charge(mut self, year: YearKey, component: impl Into<String>, amount: Money) -> Self {
        self.set_charge(year, component, amount);
        self
    }

    /// add a charge, or overwrite the amount of an already-declared component
    pub fn set_charge(&mut self, year: YearKey, component: impl Into<String>, amount: Money) {
        let component = component.into();

        let year_charges = match self.years.iter_mut().position(|y| y.year == year) {
            Some(idx) => &mut self.years[idx],
            None => {
                // insert keeping year1 < year2 < year3
                let idx = self.years.iter().position(|y| y.year > year).unwrap_or(self.years.len());
                self.years.insert(
                    idx,
                    YearCharges {
                        year,
                        charges: Vec::new(),
                    },
                );
                &mut self.years[idx]
            }
        };

        match year_charges.charges.iter_mut().find(|c| c.component == component) {
            Some(charge) => charge.amount = amount,
            None => year_charges.charges.push(Charge { component, amount }),
        }
    }

    pub fn years(&self) -> &[YearCharges] {
        &self.years
    }

    pub fn is_empty(&self) -> bool {
        self.years.iter().all(|y| y.charges.is_empty())
    }

    /// sum of all charge amounts, before any discount
    pub fn total(&self) -> Money {
        self.years
            .iter()
            .flat_map(|y| y.charges.iter())
            .map(|c| c.amount)
            .sum()
    }

    /// flatten into (bucket, amount) pairs in canonical order
    pub fn flatten(&self) -> Vec<(BucketKey, Money)> {
        self.years
            .iter()
            .flat_map(|y| {
                y.charges
                    .iter()
                    .map(move |c| (BucketKey::new(y.year, c.component.clone()), c.amount))
            })
            .collect()
    }

    /// reject negative charge amounts
    pub fn validate(&self) -> Result<()> {
        for year in &self.years {
            for charge in &year.charges {
                if charge.amount.is_negative() {
                    return Err(LedgerError::InvalidChargeAmount {
                        component: charge.component.clone(),
                        amount: charge.amount,
                    });
                }
            }
        }
        Ok(())
    }
}

/// fee structure template
///
/// Immutable once an account with transactions references it; accounts copy
/// the breakdown at assignment time, so later template edits never change an
/// existing obligation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeStructure {
    pub id: StructureId,
    pub name: String,
    pub program: Program,
    pub academic_year: String,
    pub breakdown: FeeBreakdown,
    /// recomputed from the breakdown on every create, never client-supplied
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
}

/// catalog of fee structure templates
#[derive(Debug, Default)]
pub struct StructureCatalog {
    structures: DashMap<StructureId, FeeStructure>,
}

impl StructureCatalog {
    pub fn new() -> Self {
        Self {
            structures: DashMap::new(),
        }
    }

    /// create a structure, recomputing the total server-side
    pub fn create(
        &self,
        name: impl Into<String>,
        program: Program,
        academic_year: impl Into<String>,
        breakdown: FeeBreakdown,
        time_provider: &SafeTimeProvider,
    ) -> Result<FeeStructure> {
        breakdown.validate()?;

        let structure = FeeStructure {
            id: Uuid::new_v4(),
            name: name.into(),
            program,
            academic_year: academic_year.into(),
            total_amount: breakdown.total(),
            breakdown,
            created_at: time_provider.now(),
        };

        self.structures.insert(structure.id, structure.clone());
        Ok(structure)
    }

    pub fn get(&self, id: StructureId) -> Result<FeeStructure> {
        self.structures
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(LedgerError::StructureNotFound { id })
    }

    /// all structures by creation time, newest first
    pub fn list(&self) -> Vec<FeeStructure> {
        let mut all: Vec<FeeStructure> = self.structures.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        all
    }

    /// delete a template
    ///
    /// Does not cascade: accounts that copied the breakdown keep their
    /// obligation. The referential check is the caller's precondition.
    pub fn delete(&self, id: StructureId) -> Result<FeeStructure> {
        self.structures
            .remove(&id)
            .map(|(_, structure)| structure)
            .ok_or(LedgerError::StructureNotFound { id })
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }
}
