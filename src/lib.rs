//! # forkstore
//!
//! A versioned, branching checkpoint store for tabular pipelines:
//! - Named checkpoints of columnar payloads, each with a ledger record
//! - Bounded in-memory LRU cache with spill-to-disk eviction
//! - Git-like branches forked from any prior checkpoint
//! - Content hashing, comparison and reproducibility export
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      StateManager                            │
//! │   (Single Writer / Multi Reader, explicit Session per user)  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────────┐
//!          │            │                     │
//!          ▼            ▼                     ▼
//!   ┌─────────────┐ ┌─────────────┐   ┌──────────────┐
//!   │ MemoryCache │ │  DiskStore  │   │BranchRegistry│
//!   │    (LRU)    │─▶│  (Spill)    │   │  (Ledgers)   │
//!   └─────────────┘ └──────┬──────┘   └──────────────┘
//!                          │
//!                          ▼
//!                   ┌─────────────┐
//!                   │PayloadCodec │
//!                   │ (CRC+BLAKE3)│
//!                   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod payload;
pub mod cache;
pub mod disk;
pub mod ledger;

pub mod session;
pub mod cancel;
pub mod compare;
pub mod export;
pub mod manager;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ForkStoreError, Result};
pub use config::{Config, SpillSyncStrategy};
pub use manager::StateManager;
pub use session::Session;
pub use cancel::Cancellation;
pub use compare::ComparisonReport;
pub use key::StateKey;
pub use payload::{Column, ColumnData, Payload};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of forkstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
