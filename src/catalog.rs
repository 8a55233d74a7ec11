//! Records handed to the external catalog layer

use crate::types::{EoResult, IndexKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index statistics for one source item, ready for an upsert keyed by
/// (source item, index kind)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub source_item: String,
    pub index_kind: IndexKind,
    pub min_value: f64,
    pub max_value: f64,
    pub mean_value: f64,
    /// Storage key of the persisted raster, if one was written
    pub raster_reference: Option<String>,
    pub acquisition_date: Option<NaiveDate>,
    pub region_reference: Option<String>,
    /// The statistics are the empty-zone fallback, not measured values
    pub degenerate: bool,
}

impl IndexRecord {
    pub fn natural_key(&self) -> (String, IndexKind) {
        (self.source_item.clone(), self.index_kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Destination for index records with update-or-create semantics
pub trait CatalogSink {
    fn upsert(&mut self, record: IndexRecord) -> EoResult<UpsertOutcome>;
}

/// Catalog kept in memory, keyed by the record's natural key
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    records: HashMap<(String, IndexKind), IndexRecord>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source_item: &str, kind: IndexKind) -> Option<&IndexRecord> {
        self.records.get(&(source_item.to_string(), kind))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &IndexRecord> {
        self.records.values()
    }
}

impl CatalogSink for InMemoryCatalog {
    fn upsert(&mut self, record: IndexRecord) -> EoResult<UpsertOutcome> {
        match self.records.insert(record.natural_key(), record) {
            Some(_) => Ok(UpsertOutcome::Updated),
            None => Ok(UpsertOutcome::Created),
        }
    }
}
