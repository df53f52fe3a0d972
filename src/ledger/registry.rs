//! Branch registry
//!
//! Branch name → Branch (fork point + ledger). Holds no notion of an
//! active branch; that lives in each caller's Session.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ForkStoreError, Result};

use super::{BranchSummary, ForkPoint, Ledger, StateRecord};

/// One branch: when it was created, where it came from, and its history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub created_at: DateTime<Utc>,
    pub forked_from: Option<ForkPoint>,
    #[serde(rename = "states")]
    pub ledger: Ledger,
}

impl Branch {
    fn new(forked_from: Option<ForkPoint>) -> Self {
        Self {
            created_at: Utc::now(),
            forked_from,
            ledger: Ledger::new(),
        }
    }
}

/// All live branches, ordered by name
#[derive(Debug, Clone)]
pub struct BranchRegistry {
    root: String,
    branches: BTreeMap<String, Branch>,
}

impl BranchRegistry {
    /// Create a registry holding only the empty root branch
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let mut branches = BTreeMap::new();
        branches.insert(root.clone(), Branch::new(None));
        Self { root, branches }
    }

    pub fn root_name(&self) -> &str {
        &self.root
    }

    pub fn contains(&self, name: &str) -> bool {
        self.branches.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&Branch> {
        self.branches
            .get(name)
            .ok_or_else(|| ForkStoreError::UnknownBranch(name.to_string()))
    }

    pub fn ledger(&self, name: &str) -> Result<&Ledger> {
        self.get(name).map(|b| &b.ledger)
    }

    pub fn branch_names(&self) -> Vec<String> {
        self.branches.keys().cloned().collect()
    }

    pub fn branches(&self) -> &BTreeMap<String, Branch> {
        &self.branches
    }

    /// Append a record to a branch's ledger
    pub fn append_record(&mut self, branch: &str, record: StateRecord) -> Result<usize> {
        let entry = self
            .branches
            .get_mut(branch)
            .ok_or_else(|| ForkStoreError::UnknownBranch(branch.to_string()))?;
        entry.ledger.append(branch, record)
    }

    /// Latest record of a branch
    pub fn terminal_record(&self, branch: &str) -> Result<&StateRecord> {
        self.ledger(branch)?
            .terminal()
            .ok_or_else(|| ForkStoreError::NotFound(format!("branch '{}' has no records", branch)))
    }

    /// Most recent record with this label on a branch
    pub fn record(&self, branch: &str, state_id: &str) -> Result<&StateRecord> {
        self.ledger(branch)?.latest(state_id).ok_or_else(|| {
            ForkStoreError::NotFound(format!("state '{}' not in branch '{}'", state_id, branch))
        })
    }

    /// Config snapshot of the latest record with this label
    pub fn config_at(&self, branch: &str, state_id: &str) -> Result<serde_json::Value> {
        self.record(branch, state_id).map(|r| r.config_snapshot.clone())
    }

    /// Register a new, empty branch forked from an existing record
    pub fn create_branch(&mut self, name: &str, fork: ForkPoint) -> Result<()> {
        if self.branches.contains_key(name) {
            return Err(ForkStoreError::BranchExists(name.to_string()));
        }

        let source = self.branches.get(&fork.branch).ok_or_else(|| {
            ForkStoreError::SourceNotFound(format!("branch '{}' does not exist", fork.branch))
        })?;
        match source.ledger.at(fork.position) {
            Some(record) if record.id == fork.state_id => {}
            _ => {
                return Err(ForkStoreError::SourceNotFound(format!(
                    "state '{}' at position {} not in branch '{}'",
                    fork.state_id, fork.position, fork.branch
                )))
            }
        }

        self.branches.insert(name.to_string(), Branch::new(Some(fork)));
        Ok(())
    }

    /// Remove a branch and its ledger
    ///
    /// The root branch and the caller's active branch are refused before
    /// anything is touched.
    pub fn delete_branch(&mut self, name: &str, active: &str) -> Result<Branch> {
        self.ensure_deletable(name, active)?;
        self.branches
            .remove(name)
            .ok_or_else(|| ForkStoreError::UnknownBranch(name.to_string()))
    }

    /// Check that `delete_branch` would succeed, without mutating
    pub fn ensure_deletable(&self, name: &str, active: &str) -> Result<()> {
        if name == self.root {
            return Err(ForkStoreError::ProtectedBranch(name.to_string()));
        }
        if name == active {
            return Err(ForkStoreError::ActiveBranch(name.to_string()));
        }
        if !self.branches.contains_key(name) {
            return Err(ForkStoreError::UnknownBranch(name.to_string()));
        }
        Ok(())
    }

    /// Drop a branch unconditionally (rollback of a failed fork)
    pub(crate) fn discard_branch(&mut self, name: &str) {
        if name != self.root {
            self.branches.remove(name);
        }
    }

    /// Summary statistics for a branch
    pub fn summary(&self, name: &str) -> Result<BranchSummary> {
        let branch = self.get(name)?;
        let terminal = branch.ledger.terminal();

        Ok(BranchSummary {
            name: name.to_string(),
            states: branch.ledger.len(),
            terminal_state: terminal.map(|r| r.id.clone()),
            row_count: terminal.map(|r| r.row_count),
            column_count: terminal.map(|r| r.column_count),
            last_modified: terminal.map(|r| r.timestamp),
            forked_from: branch.forked_from.clone(),
        })
    }
}
