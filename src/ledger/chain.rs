//! Ledger implementation
//!
//! Append-only, linear chain of StateRecords for one branch.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ForkStoreError, Result};
use crate::payload::ContentHash;

use super::StateRecord;

/// Append-only history of one branch
///
/// Position in the vector is the record's position. Every record's
/// `parent` names the record right before it, so the chain never forks
/// inside one ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    records: Vec<StateRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the record that would be appended next
    ///
    /// Parent and position are taken from the current terminal record.
    pub fn next_record(
        &self,
        id: impl Into<String>,
        content_hash: ContentHash,
        row_count: usize,
        column_count: usize,
        config_snapshot: serde_json::Value,
        delta_summary: impl Into<String>,
    ) -> StateRecord {
        StateRecord {
            id: id.into(),
            parent: self.terminal().map(|r| r.id.clone()),
            position: self.records.len(),
            timestamp: Utc::now(),
            content_hash,
            row_count,
            column_count,
            config_snapshot,
            delta_summary: delta_summary.into(),
        }
    }

    /// Append a record
    ///
    /// Fails with `LedgerConflict` unless the record's parent is the
    /// current terminal id and its position is the current length.
    pub fn append(&mut self, branch: &str, record: StateRecord) -> Result<usize> {
        let expected_parent = self.terminal().map(|r| r.id.as_str());
        if record.parent.as_deref() != expected_parent {
            return Err(ForkStoreError::LedgerConflict {
                branch: branch.to_string(),
                reason: format!(
                    "parent {:?} does not match terminal {:?}",
                    record.parent, expected_parent
                ),
            });
        }
        if record.position != self.records.len() {
            return Err(ForkStoreError::LedgerConflict {
                branch: branch.to_string(),
                reason: format!(
                    "position {} does not match ledger length {}",
                    record.position,
                    self.records.len()
                ),
            });
        }

        self.records.push(record);
        Ok(self.records.len() - 1)
    }

    /// Most recent record
    pub fn terminal(&self) -> Option<&StateRecord> {
        self.records.last()
    }

    /// Most recent record bearing this label
    pub fn latest(&self, id: &str) -> Option<&StateRecord> {
        self.records.iter().rev().find(|r| r.id == id)
    }

    /// Record at an exact position
    pub fn at(&self, position: usize) -> Option<&StateRecord> {
        self.records.get(position)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    pub fn records(&self) -> &[StateRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check that parent links and positions reconstruct commit order
    pub fn verify_chain(&self) -> bool {
        self.records.iter().enumerate().all(|(i, record)| {
            let expected_parent = i.checked_sub(1).map(|p| self.records[p].id.as_str());
            record.position == i && record.parent.as_deref() == expected_parent
        })
    }
}
