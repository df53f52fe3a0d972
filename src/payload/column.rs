//! Column definitions
//!
//! A column is a name plus a homogeneous, nullable cell vector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cell type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ColumnType {
    Numeric = 0x01,
    Text = 0x02,
    Boolean = 0x03,
    Temporal = 0x04,
}

impl ColumnType {
    /// Convert from the on-disk tag byte
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(ColumnType::Numeric),
            0x02 => Some(ColumnType::Text),
            0x03 => Some(ColumnType::Boolean),
            0x04 => Some(ColumnType::Temporal),
            _ => None,
        }
    }
}

/// Homogeneous cell storage. `None` is a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    Boolean(Vec<Option<bool>>),
    /// Microseconds since the Unix epoch
    Temporal(Vec<Option<i64>>),
}

impl ColumnData {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Numeric(_) => ColumnType::Numeric,
            ColumnData::Text(_) => ColumnType::Text,
            ColumnData::Boolean(_) => ColumnType::Boolean,
            ColumnData::Temporal(_) => ColumnType::Temporal,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Temporal(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of missing cells
    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.iter().filter(|c| c.is_none()).count(),
            ColumnData::Text(v) => v.iter().filter(|c| c.is_none()).count(),
            ColumnData::Boolean(v) => v.iter().filter(|c| c.is_none()).count(),
            ColumnData::Temporal(v) => v.iter().filter(|c| c.is_none()).count(),
        }
    }

    /// Approximate resident size in bytes
    ///
    /// Fixed-width cells count their `Option<T>` size; text cells add
    /// their string bytes on top of the `Option<String>` header.
    pub fn memory_footprint(&self) -> usize {
        use std::mem::size_of;
        match self {
            ColumnData::Numeric(v) => v.len() * size_of::<Option<f64>>(),
            ColumnData::Boolean(v) => v.len() * size_of::<Option<bool>>(),
            ColumnData::Temporal(v) => v.len() * size_of::<Option<i64>>(),
            ColumnData::Text(v) => {
                v.len() * size_of::<Option<String>>()
                    + v.iter().flatten().map(|s| s.len()).sum::<usize>()
            }
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn numeric(name: impl Into<String>, cells: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnData::Numeric(cells))
    }

    pub fn text(name: impl Into<String>, cells: Vec<Option<String>>) -> Self {
        Self::new(name, ColumnData::Text(cells))
    }

    pub fn boolean(name: impl Into<String>, cells: Vec<Option<bool>>) -> Self {
        Self::new(name, ColumnData::Boolean(cells))
    }

    pub fn temporal(name: impl Into<String>, cells: Vec<Option<i64>>) -> Self {
        Self::new(name, ColumnData::Temporal(cells))
    }

    /// Build a temporal column from chrono timestamps
    pub fn from_datetimes(name: impl Into<String>, cells: Vec<Option<DateTime<Utc>>>) -> Self {
        let micros = cells
            .into_iter()
            .map(|c| c.map(|dt| dt.timestamp_micros()))
            .collect();
        Self::temporal(name, micros)
    }

    pub fn column_type(&self) -> ColumnType {
        self.data.column_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
