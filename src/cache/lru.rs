//! MemoryCache implementation
//!
//! LRU map from StateKey to shared immutable payloads.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::Result;
use crate::key::StateKey;
use crate::payload::Payload;

/// A resident payload and its last-touch tick
struct CacheSlot {
    payload: Arc<Payload>,
    tick: u64,
}

/// Bounded LRU cache of payloads
pub struct MemoryCache {
    /// Maximum number of resident payloads
    capacity: usize,

    /// Key → resident payload
    entries: HashMap<StateKey, CacheSlot>,

    /// Tick → key, oldest first
    recency: BTreeMap<u64, StateKey>,

    /// Next tick to hand out (monotonic)
    next_tick: u64,
}

impl MemoryCache {
    /// Create an empty cache holding at most `capacity` payloads
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            recency: BTreeMap::new(),
            next_tick: 0,
        }
    }

    /// Insert or replace a payload
    ///
    /// When a new key would exceed capacity, the least-recently-used entry
    /// is passed to `spill` first and only dropped once `spill` succeeds.
    /// If `spill` fails the cache is left exactly as it was and the error
    /// is returned.
    ///
    /// Returns the keys that were evicted.
    pub fn put<F>(&mut self, key: StateKey, payload: Arc<Payload>, mut spill: F) -> Result<Vec<StateKey>>
    where
        F: FnMut(&StateKey, &Payload) -> Result<()>,
    {
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.payload = payload;
            self.touch(&key);
            return Ok(Vec::new());
        }

        let mut evicted = Vec::new();
        while self.entries.len() >= self.capacity {
            let victim = match self.recency.values().next() {
                Some(k) => k.clone(),
                None => break,
            };

            if let Some(slot) = self.entries.get(&victim) {
                spill(&victim, &slot.payload)?;
            }

            if let Some(slot) = self.entries.remove(&victim) {
                self.recency.remove(&slot.tick);
            }
            tracing::debug!(key = %victim, "evicted from memory cache");
            evicted.push(victim);
        }

        let tick = self.bump_tick();
        self.recency.insert(tick, key.clone());
        self.entries.insert(key, CacheSlot { payload, tick });

        Ok(evicted)
    }

    /// Insert a payload read back from disk unless the key became resident
    /// in the meantime, in which case the resident payload wins
    ///
    /// Returns whichever payload is resident afterwards.
    pub fn promote<F>(&mut self, key: StateKey, payload: Arc<Payload>, spill: F) -> Result<Arc<Payload>>
    where
        F: FnMut(&StateKey, &Payload) -> Result<()>,
    {
        if let Some(resident) = self.get(&key) {
            return Ok(resident);
        }
        self.put(key, Arc::clone(&payload), spill)?;
        Ok(payload)
    }

    /// Get a payload, marking it most-recently-used
    pub fn get(&mut self, key: &StateKey) -> Option<Arc<Payload>> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.entries.get(key).map(|slot| Arc::clone(&slot.payload))
    }

    /// Get a payload without changing recency
    pub fn peek(&self, key: &StateKey) -> Option<Arc<Payload>> {
        self.entries.get(key).map(|slot| Arc::clone(&slot.payload))
    }

    /// Check residency without changing recency
    pub fn contains(&self, key: &StateKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop one entry without spilling it
    pub fn remove(&mut self, key: &StateKey) -> Option<Arc<Payload>> {
        let slot = self.entries.remove(key)?;
        self.recency.remove(&slot.tick);
        Some(slot.payload)
    }

    /// Drop every entry matching `predicate` without spilling
    ///
    /// Returns the number of entries dropped.
    pub fn remove_where<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&StateKey) -> bool,
    {
        let doomed: Vec<StateKey> = self.entries.keys().filter(|k| predicate(k)).cloned().collect();
        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }

    /// Drop everything without spilling
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    /// Keys ordered least- to most-recently-used
    pub fn keys_by_recency(&self) -> Vec<StateKey> {
        self.recency.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Move `key` to the most-recently-used position
    fn touch(&mut self, key: &StateKey) {
        let tick = self.bump_tick();
        if let Some(slot) = self.entries.get_mut(key) {
            self.recency.remove(&slot.tick);
            slot.tick = tick;
            self.recency.insert(tick, key.clone());
        }
    }

    fn bump_tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }
}
