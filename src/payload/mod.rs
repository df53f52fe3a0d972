//! Payload Module
//!
//! The tabular value a pipeline stage hands to the store.
//!
//! ## Responsibilities
//! - Ordered, uniquely named, typed columns sharing one row count
//! - Immutable once built (stages produce new payloads, never edit)
//! - Memory footprint estimation for comparisons
//! - Columnar on-disk encoding and content hashing (see `codec`)

mod column;
pub mod codec;

use std::collections::HashSet;

use crate::error::{ForkStoreError, Result};

pub use codec::{content_hash, decode, encode, ContentHash};
pub use column::{Column, ColumnData, ColumnType};

/// An immutable table: ordered named columns of equal length
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    columns: Vec<Column>,
    row_count: usize,
}

impl Payload {
    /// Build a payload, validating equal column lengths and unique names
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map(|c| c.len()).unwrap_or(0);

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(ForkStoreError::InvalidPayload(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
            if column.len() != row_count {
                return Err(ForkStoreError::InvalidPayload(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    row_count
                )));
            }
        }

        Ok(Self { columns, row_count })
    }

    /// A payload with no columns and no rows
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            row_count: 0,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in payload order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Approximate resident size in bytes (cells plus column names)
    pub fn memory_footprint(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.name.len() + c.data.memory_footprint())
            .sum()
    }

    /// Consume the payload, returning its columns (to build a modified copy)
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}
