//! Ledger Module
//!
//! Branch genealogy and per-branch append-only history.
//!
//! ## Responsibilities
//! - Record checkpoint metadata in commit order
//! - Reject appends whose parent is not the current terminal record
//! - Track where each branch was forked from
//! - Guard the root branch and the active branch against deletion
//!
//! ## Shape
//! ```text
//! main:  [df_raw] ← [schema] ← [clean]
//!                       │
//!                       └── fork ──► alt: [schema] ← [clean]
//! ```
//! Each branch's first record reproduces its fork point, so a branch is
//! self-contained and never needs its source to be reconstructed.

mod chain;
mod record;
mod registry;

pub use chain::Ledger;
pub use record::{BranchSummary, ForkPoint, StateRecord};
pub use registry::{Branch, BranchRegistry};
