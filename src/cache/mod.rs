//! Cache Module
//!
//! Bounded in-memory residency for committed payloads.
//!
//! ## Responsibilities
//! - Keep at most `capacity` payloads resident
//! - Evict the least-recently-used entry on overflow
//! - Hand every victim to a spill callback before dropping it
//! - Drop entries without spilling when a branch is deleted
//!
//! ## Data Structure Choice
//! HashMap for key lookup plus a BTreeMap keyed by a monotonic tick for
//! recency order:
//! - O(log n) touch and eviction
//! - Ticks are unique, so the oldest tick is always a single entry and
//!   ties resolve to insertion order
//! - Not internally synchronized; the StateManager owns it behind a Mutex
//!   because every hit mutates recency

mod lru;

pub use lru::MemoryCache;
