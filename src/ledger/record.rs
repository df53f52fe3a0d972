//! Ledger record definitions
//!
//! Metadata for committed checkpoints and branch fork points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::ContentHash;

/// Metadata for one committed checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Pipeline stage label (unique within a ledger only by position)
    pub id: String,

    /// Id of the immediately preceding record in the same ledger
    pub parent: Option<String>,

    /// Index of this record in its ledger
    pub position: usize,

    /// Commit time
    pub timestamp: DateTime<Utc>,

    /// BLAKE3 digest of the payload contents
    pub content_hash: ContentHash,

    pub row_count: usize,

    pub column_count: usize,

    /// How this checkpoint was produced from its parent, stored verbatim
    pub config_snapshot: serde_json::Value,

    /// Short human-readable description of what changed
    pub delta_summary: String,
}

/// Where a branch was forked from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkPoint {
    pub branch: String,
    pub state_id: String,
    /// Position of the fork record in the source ledger at fork time
    pub position: usize,
}

/// Summary statistics for one branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub name: String,
    pub states: usize,
    pub terminal_state: Option<String>,
    pub row_count: Option<usize>,
    pub column_count: Option<usize>,
    pub last_modified: Option<DateTime<Utc>>,
    pub forked_from: Option<ForkPoint>,
}
