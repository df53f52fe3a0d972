//! Disk Module
//!
//! Durable spillover for payloads evicted from the memory cache.
//!
//! ## Responsibilities
//! - Persist evicted payloads under a path derived from their StateKey
//! - Read them back for promotion into the cache
//! - Delete a single branch's entries, or everything
//!
//! ## Directory Layout
//! ```text
//! {spill_dir}/
//!   ├── main/                  (escaped branch name)
//!   │     ├── df_raw.fks       (escaped state id + extension)
//!   │     └── df_clean.fks
//!   └── a%3A%3Ab/              (branch "a::b")
//!         └── schema.fks
//! ```
//!
//! Files are written to a temporary name and renamed into place, so a
//! reader never observes a half-written payload. A deleted branch's
//! directory is first renamed to `.{branch}.deleted` and erased after its
//! ledger is gone.

mod store;

pub use store::{DiskStore, SPILL_EXTENSION, TOMBSTONE_SUFFIX};
pub(crate) use store::write_file_atomic;
