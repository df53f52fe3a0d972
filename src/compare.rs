//! Branch comparison
//!
//! Shape-level comparison of two checkpoints. Values are never diffed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::payload::Payload;

/// Shape of one side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSide {
    pub branch: String,
    pub state_id: String,
    pub rows: usize,
    pub cols: usize,
    /// Estimated resident size in bytes
    pub memory_bytes: usize,
}

impl ComparisonSide {
    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / 1e6
    }
}

/// Result of comparing one checkpoint on each of two branches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub branch_a: ComparisonSide,
    pub branch_b: ComparisonSide,
    /// Sorted column names present only on side A
    pub columns_only_in_a: Vec<String>,
    /// Sorted column names present only on side B
    pub columns_only_in_b: Vec<String>,
    /// Sorted column names present on both sides
    pub common_columns: Vec<String>,
}

impl ComparisonReport {
    pub(crate) fn build(
        (branch_a, state_a, payload_a): (&str, &str, &Payload),
        (branch_b, state_b, payload_b): (&str, &str, &Payload),
    ) -> Self {
        let cols_a: BTreeSet<&str> = payload_a.column_names().into_iter().collect();
        let cols_b: BTreeSet<&str> = payload_b.column_names().into_iter().collect();

        Self {
            branch_a: side(branch_a, state_a, payload_a),
            branch_b: side(branch_b, state_b, payload_b),
            columns_only_in_a: owned(cols_a.difference(&cols_b)),
            columns_only_in_b: owned(cols_b.difference(&cols_a)),
            common_columns: owned(cols_a.intersection(&cols_b)),
        }
    }

    /// True when both sides have the same column set
    pub fn same_columns(&self) -> bool {
        self.columns_only_in_a.is_empty() && self.columns_only_in_b.is_empty()
    }

    /// Row count difference, B minus A
    pub fn row_delta(&self) -> i64 {
        self.branch_b.rows as i64 - self.branch_a.rows as i64
    }
}

fn side(branch: &str, state_id: &str, payload: &Payload) -> ComparisonSide {
    ComparisonSide {
        branch: branch.to_string(),
        state_id: state_id.to_string(),
        rows: payload.row_count(),
        cols: payload.column_count(),
        memory_bytes: payload.memory_footprint(),
    }
}

fn owned<'a, 'b: 'a>(names: impl Iterator<Item = &'a &'b str>) -> Vec<String> {
    names.map(|s| s.to_string()).collect()
}
