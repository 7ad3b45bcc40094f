//! Per-pass pool record cache.

use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::error::Result;
use crate::inventory::InventoryLister;
use crate::types::PoolRecord;
use crate::virsh::CommandRunner;

/// Last-known state of the pools touched by one reconciliation pass.
///
/// A name maps to `Some(record)` when the pool is defined and to `None` when it
/// is known to be absent. Names that were never looked up have no entry.
#[derive(Debug, Clone, Default)]
pub struct ReconcileContext {
    records: HashMap<String, Option<PoolRecord>>,
}

impl ReconcileContext {
    /// Empty context; every lookup falls back to a status query.
    pub fn new() -> Self {
        Self::default()
    }

    /// List pools once and remember the state of each requested name.
    #[instrument(skip(lister, names))]
    pub fn prefetch<'n, R, I>(lister: &InventoryLister<'_, R>, names: I) -> Result<Self>
    where
        R: CommandRunner,
        I: IntoIterator<Item = &'n str>,
    {
        let mut listed: HashMap<String, PoolRecord> = lister
            .list_all()?
            .into_iter()
            .map(|record| (record.name().to_string(), record))
            .collect();

        let records: HashMap<String, Option<PoolRecord>> = names
            .into_iter()
            .map(|name| (name.to_string(), listed.remove(name)))
            .collect();

        debug!(
            requested = records.len(),
            present = records.values().filter(|r| r.is_some()).count(),
            "Prefetched pool records"
        );

        Ok(Self { records })
    }

    /// `None` if the name was never looked up; `Some(None)` if known absent.
    pub fn get(&self, name: &str) -> Option<Option<&PoolRecord>> {
        self.records.get(name).map(Option::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub(crate) fn record_mut(&mut self, name: &str) -> Option<&mut PoolRecord> {
        self.records.get_mut(name).and_then(Option::as_mut)
    }

    pub(crate) fn insert(&mut self, name: &str, record: Option<PoolRecord>) {
        self.records.insert(name.to_string(), record);
    }

    pub(crate) fn mark_absent(&mut self, name: &str) {
        self.records.insert(name.to_string(), None);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
