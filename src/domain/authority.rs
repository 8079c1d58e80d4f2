//! Authority guard - write/skip decisions for canonical records.
//!
//! Prevents a low-fidelity, broad catalog feed (the manual-upload
//! fallback) from overwriting higher-fidelity per-supplier data for the
//! same SKU. This is the critical correctness property of the whole
//! engine; every connector path shares this one component.

use std::collections::HashMap;

use crate::domain::repositories::StoredProduct;
use crate::domain::supplier::{ConnectorType, Supplier};

/// Outcome of an authority check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    Write,
    Skip,
}

/// Decides whether an incoming candidate record may overwrite the stored
/// record for its natural key, based on supplier authority ranking.
#[derive(Debug, Clone, Default)]
pub struct AuthorityGuard {
    connector_types: HashMap<i64, ConnectorType>,
}

impl AuthorityGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the guard from the registered supplier set.
    pub fn from_suppliers<'a, I>(suppliers: I) -> Self
    where
        I: IntoIterator<Item = &'a Supplier>,
    {
        let mut guard = Self::new();
        for supplier in suppliers {
            guard.register(supplier.id, supplier.connector_type);
        }
        guard
    }

    pub fn register(&mut self, supplier_id: i64, connector_type: ConnectorType) {
        self.connector_types.insert(supplier_id, connector_type);
    }

    /// Rule: no existing record always writes. An existing record owned by
    /// an authoritative supplier is never overwritten by the manual
    /// fallback. Everything else writes.
    ///
    /// A stored record whose supplier is not registered is treated as
    /// manual, so unknown provenance never blocks an authoritative feed.
    pub fn decide(&self, existing: Option<&StoredProduct>, incoming: &Supplier) -> WriteDecision {
        let Some(existing) = existing else {
            return WriteDecision::Write;
        };

        let existing_type = self
            .connector_types
            .get(&existing.product.supplier_id)
            .copied()
            .unwrap_or(ConnectorType::Manual);

        if existing_type.is_authoritative() && !incoming.connector_type.is_authoritative() {
            WriteDecision::Skip
        } else {
            WriteDecision::Write
        }
    }
}
