//! StateManager Module
//!
//! The orchestrator that composes cache, disk store and branch registry.
//!
//! ## Responsibilities
//! - Commit checkpoints atomically (record + resident payload, or nothing)
//! - Resolve loads through cache → disk promotion → NotFound
//! - Fork, switch and delete branches
//! - Compare, verify and export checkpoints
//! - Erase every cached and spilled payload on cleanup

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::MemoryCache;
use crate::cancel::Cancellation;
use crate::compare::ComparisonReport;
use crate::config::Config;
use crate::disk::DiskStore;
use crate::error::{ForkStoreError, Result};
use crate::export::{self, ExportManifest, RootPayloadInfo, FORMAT_VERSION};
use crate::key::StateKey;
use crate::ledger::{BranchRegistry, BranchSummary, ForkPoint, StateRecord};
use crate::payload::{self, ContentHash, Payload};
use crate::session::Session;

/// A commit that has been hashed but not yet applied
struct PendingCommit<'a> {
    state_id: &'a str,
    payload: Arc<Payload>,
    content_hash: ContentHash,
    config_snapshot: serde_json::Value,
    delta_summary: &'a str,
}

/// The checkpoint store
///
/// ## Concurrency Model: Single Writer / Multiple Readers
///
/// - **Mutations** (commit/branch/switch/delete/cleanup/reset): serialized
///   by `write_lock`. Within one branch, a second session committing on a
///   stale head is rejected with `LedgerConflict`.
///
/// - **Loads**: cache hits take only the cache mutex. Misses serialize on
///   `promotion_lock` and re-check the cache, so two loads of the same key
///   read and insert it once.
///
/// - **Lock order**: write_lock → promotion_lock → registry → cache.
///   Delete and cleanup hold `promotion_lock` too, so a promotion in flight
///   can never resurrect a purged entry.
pub struct StateManager {
    /// Manager configuration
    config: Config,

    /// Branch genealogy and ledgers (many readers, exclusive writer)
    registry: RwLock<BranchRegistry>,

    /// Resident payloads (every hit updates recency, so a Mutex)
    cache: Mutex<MemoryCache>,

    /// Spillover for evicted payloads
    disk: DiskStore,

    /// Serializes mutating operations
    write_lock: Mutex<()>,

    /// Serializes disk → cache promotion
    promotion_lock: Mutex<()>,

    /// Set once `close()` has run, so Drop does not purge twice
    closed: AtomicBool,
}

impl StateManager {
    /// Open a manager with the given config
    ///
    /// The spill directory must belong to this manager alone. Ledgers live
    /// in memory, so any spill files left by an earlier process are
    /// unreachable and get purged here.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let disk = DiskStore::open(&config.spill_dir, config.sync_strategy)?;
        let stale = disk.purge_all()?;
        if stale > 0 {
            info!(stale, dir = %config.spill_dir.display(), "purged stale spill files");
        }

        Ok(Self {
            registry: RwLock::new(BranchRegistry::new(config.root_branch.clone())),
            cache: Mutex::new(MemoryCache::new(config.cache_capacity)),
            disk,
            write_lock: Mutex::new(()),
            promotion_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            config,
        })
    }

    /// Open with a spill path (convenience method)
    ///
    /// Uses default config with the specified spill directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.spill_dir = path.to_path_buf();
        Self::open(config)
    }

    /// A new session positioned at the root branch
    pub fn session(&self) -> Session {
        let registry = self.registry.read();
        let head = registry.ledger(registry.root_name()).map(|l| l.len()).unwrap_or(0);
        Session::new(registry.root_name(), head)
    }

    // =========================================================================
    // Commit / Load
    // =========================================================================

    /// Commit a checkpoint to the session's active branch
    pub fn commit(
        &self,
        session: &mut Session,
        state_id: &str,
        payload: impl Into<Arc<Payload>>,
        config_snapshot: serde_json::Value,
        delta_summary: &str,
    ) -> Result<()> {
        self.commit_with(session, state_id, payload, config_snapshot, delta_summary, &Cancellation::new())
    }

    /// Commit with a cancellation signal
    ///
    /// Steps:
    /// 1. Hash the payload (no locks held)
    /// 2. Acquire write lock, check the session head against the ledger
    /// 3. Insert into the cache, spilling the LRU victim if full
    /// 4. Append the record
    ///
    /// A failure or cancellation before step 4 leaves no trace: the record
    /// is not appended and the cache still holds its previous entries.
    pub fn commit_with(
        &self,
        session: &mut Session,
        state_id: &str,
        payload: impl Into<Arc<Payload>>,
        config_snapshot: serde_json::Value,
        delta_summary: &str,
        cancel: &Cancellation,
    ) -> Result<()> {
        let payload = payload.into();
        let content_hash = payload::content_hash(&payload)?;

        let _write_guard = self.write_lock.lock();
        self.commit_locked(
            session,
            PendingCommit {
                state_id,
                payload,
                content_hash,
                config_snapshot,
                delta_summary,
            },
            cancel,
        )
    }

    /// Internal commit (called with write lock held)
    fn commit_locked(&self, session: &mut Session, pending: PendingCommit<'_>, cancel: &Cancellation) -> Result<()> {
        let record = {
            let registry = self.registry.read();
            let ledger = registry.ledger(&session.active)?;
            if ledger.len() != session.head {
                return Err(ForkStoreError::LedgerConflict {
                    branch: session.active.clone(),
                    reason: format!(
                        "session last saw {} records, branch now has {}",
                        session.head,
                        ledger.len()
                    ),
                });
            }
            ledger.next_record(
                pending.state_id,
                pending.content_hash,
                pending.payload.row_count(),
                pending.payload.column_count(),
                pending.config_snapshot,
                pending.delta_summary,
            )
        };

        cancel.check("commit")?;

        let key = StateKey::new(&session.active, pending.state_id);
        let evicted = self.cache.lock().put(key.clone(), pending.payload, |victim, victim_payload| {
            cancel.check("eviction write")?;
            self.disk.write(victim, victim_payload)
        })?;

        // Head and branch were checked under the write lock, so this append
        // cannot conflict.
        let position = self.registry.write().append_record(&session.active, record)?;
        session.head = position + 1;

        debug!(key = %key, position, evicted = evicted.len(), "committed state");
        Ok(())
    }

    /// Load a checkpoint
    ///
    /// Resolves to the most recent payload committed under `state_id` on
    /// `branch`. The returned payload is immutable and shared; clone it to
    /// derive a new one.
    pub fn load(&self, branch: &str, state_id: &str) -> Result<Arc<Payload>> {
        self.load_with(branch, state_id, &Cancellation::new())
    }

    /// Load with a cancellation signal
    ///
    /// Search order:
    /// 1. MemoryCache
    /// 2. DiskStore (promoted into the cache)
    /// 3. NotFound
    pub fn load_with(&self, branch: &str, state_id: &str, cancel: &Cancellation) -> Result<Arc<Payload>> {
        let key = StateKey::new(branch, state_id);

        if let Some(payload) = self.cache.lock().get(&key) {
            debug!(key = %key, "cache hit");
            return Ok(payload);
        }

        let _promotion_guard = self.promotion_lock.lock();

        // Another loader may have promoted this key while we waited
        if let Some(payload) = self.cache.lock().get(&key) {
            debug!(key = %key, "cache hit after wait");
            return Ok(payload);
        }

        cancel.check("disk read")?;
        let payload = match self.disk.read(&key)? {
            Some(payload) => Arc::new(payload),
            None => return Err(self.diagnose_missing(&key)),
        };

        cancel.check("promotion")?;
        let payload = self.cache.lock().promote(key.clone(), payload, |victim, victim_payload| {
            self.disk.write(victim, victim_payload)
        })?;

        debug!(key = %key, "promoted from disk");
        Ok(payload)
    }

    /// Terminal payload of the session's active branch, if it has one
    pub fn current_state(&self, session: &Session) -> Result<Option<Arc<Payload>>> {
        match self.current_state_id(session)? {
            Some(state_id) => self.load(&session.active, &state_id).map(Some),
            None => Ok(None),
        }
    }

    /// Terminal state id of the session's active branch, if it has one
    pub fn current_state_id(&self, session: &Session) -> Result<Option<String>> {
        let registry = self.registry.read();
        Ok(registry.ledger(&session.active)?.terminal().map(|r| r.id.clone()))
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// Fork a new branch from a state of the session's active branch
    ///
    /// The new branch's first record reproduces the fork payload with the
    /// source record's config, and the session switches to it.
    pub fn branch(&self, session: &mut Session, new_name: &str, fork_state_id: &str) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        let source = session.active.clone();

        let (fork, source_hash, config_snapshot) = {
            let registry = self.registry.read();
            if registry.contains(new_name) {
                return Err(ForkStoreError::BranchExists(new_name.to_string()));
            }
            let record = registry
                .ledger(&source)
                .ok()
                .and_then(|ledger| ledger.latest(fork_state_id))
                .ok_or_else(|| {
                    ForkStoreError::SourceNotFound(format!(
                        "state '{}' not in branch '{}'",
                        fork_state_id, source
                    ))
                })?;
            let fork = ForkPoint {
                branch: source.clone(),
                state_id: fork_state_id.to_string(),
                position: record.position,
            };
            (fork, record.content_hash.clone(), record.config_snapshot.clone())
        };

        let payload = self.load(&source, fork_state_id)?;
        let content_hash = payload::content_hash(&payload)?;
        if content_hash != source_hash {
            return Err(ForkStoreError::Corruption(format!(
                "fork point {}::{} hashes to {}, ledger records {}",
                source, fork_state_id, content_hash, source_hash
            )));
        }

        self.registry.write().create_branch(new_name, fork)?;

        let delta_summary = format!("forked from {}::{}", source, fork_state_id);
        let mut fork_session = Session::new(new_name, 0);
        let committed = self.commit_locked(
            &mut fork_session,
            PendingCommit {
                state_id: fork_state_id,
                payload,
                content_hash,
                config_snapshot,
                delta_summary: &delta_summary,
            },
            &Cancellation::new(),
        );
        if let Err(e) = committed {
            self.registry.write().discard_branch(new_name);
            return Err(e);
        }

        *session = fork_session;
        info!(branch = new_name, from = %source, state = fork_state_id, "created branch");
        Ok(())
    }

    /// Make `name` the session's active branch and return its terminal payload
    ///
    /// Switching to the branch already active refreshes the session head,
    /// which is how a session recovers from a `LedgerConflict`.
    pub fn switch_branch(&self, session: &mut Session, name: &str) -> Result<Arc<Payload>> {
        let _write_guard = self.write_lock.lock();

        let (terminal_id, head) = {
            let registry = self.registry.read();
            let ledger = registry.ledger(name)?;
            let terminal = ledger
                .terminal()
                .ok_or_else(|| ForkStoreError::EmptyBranch(name.to_string()))?;
            (terminal.id.clone(), ledger.len())
        };

        let payload = self.load(name, &terminal_id)?;
        session.move_to(name, head);

        info!(branch = name, state = %terminal_id, "switched branch");
        Ok(payload)
    }

    /// Delete a branch, its ledger, and every cached or spilled payload
    ///
    /// The spill directory is first moved aside, so a failure before the
    /// registry entry goes leaves the branch whole. Erasing the detached
    /// directory happens last; if that fails it is retried by the next
    /// purge.
    pub fn delete_branch(&self, session: &Session, name: &str) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        let _promotion_guard = self.promotion_lock.lock();

        self.registry.read().ensure_deletable(name, &session.active)?;

        let tombstone = self.disk.detach_branch(name)?;
        if let Err(e) = self.registry.write().delete_branch(name, &session.active) {
            if let Some(path) = &tombstone {
                self.disk.restore_detached(name, path)?;
            }
            return Err(e);
        }
        let removed_from_cache = self.cache.lock().remove_where(|key| key.belongs_to(name));

        let removed_from_disk = match &tombstone {
            Some(path) => match self.disk.remove_detached(path) {
                Ok(count) => count,
                Err(e) => {
                    warn!(branch = name, error = %e, "failed to erase detached spill directory");
                    0
                }
            },
            None => 0,
        };

        info!(
            branch = name,
            cached = removed_from_cache,
            spilled = removed_from_disk,
            "deleted branch"
        );
        Ok(())
    }

    // =========================================================================
    // Compare / Verify / Export
    // =========================================================================

    /// Compare one state on each of two branches
    ///
    /// `state_id = None` compares each branch's terminal state.
    pub fn compare(&self, branch_a: &str, branch_b: &str, state_id: Option<&str>) -> Result<ComparisonReport> {
        let state_a = self.resolve_state(branch_a, state_id)?;
        let state_b = self.resolve_state(branch_b, state_id)?;

        let payload_a = self.load(branch_a, &state_a)?;
        let payload_b = self.load(branch_b, &state_b)?;

        Ok(ComparisonReport::build(
            (branch_a, state_a.as_str(), &*payload_a),
            (branch_b, state_b.as_str(), &*payload_b),
        ))
    }

    /// Recompute a state's content hash and check it against its record
    pub fn verify(&self, branch: &str, state_id: &str) -> Result<bool> {
        let expected = self.registry.read().record(branch, state_id)?.content_hash.clone();
        let payload = self.load(branch, state_id)?;
        let actual = payload::content_hash(&payload)?;

        if actual != expected {
            warn!(branch, state = state_id, %expected, %actual, "content hash mismatch");
        }
        Ok(actual == expected)
    }

    /// Write the reproducibility bundle to `target`
    ///
    /// Includes the root branch's origin payload, every branch's ledger
    /// (metadata only) and the active branch's terminal config. If the
    /// origin payload was erased, only the two metadata documents are
    /// written.
    pub fn export(&self, session: &Session, target: &Path) -> Result<()> {
        let registry = self.registry.read().clone();

        let terminal_config = registry
            .ledger(&session.active)?
            .terminal()
            .map(|r| r.config_snapshot.clone())
            .ok_or_else(|| ForkStoreError::EmptyBranch(session.active.clone()))?;

        let root = registry.root_name().to_string();
        let (root_payload, root_info) = match registry.ledger(&root)?.at(0) {
            Some(origin) => match self.load(&root, &origin.id) {
                Ok(payload) => {
                    let content_hash = payload::content_hash(&payload)?;
                    if content_hash != origin.content_hash {
                        warn!(
                            state = %origin.id,
                            "root origin label was re-committed; exporting its latest payload"
                        );
                    }
                    let info = RootPayloadInfo {
                        state_id: origin.id.clone(),
                        content_hash,
                        row_count: payload.row_count(),
                        column_count: payload.column_count(),
                    };
                    (Some(payload), Some(info))
                }
                // Erased by cleanup: the metadata documents are still exported
                Err(ForkStoreError::NotFound(reason)) => {
                    warn!(state = %origin.id, %reason, "root origin payload unavailable; exporting metadata only");
                    (None, None)
                }
                Err(e) => return Err(e),
            },
            None => (None, None),
        };

        let manifest = ExportManifest {
            format_version: FORMAT_VERSION,
            exported_at: Utc::now(),
            root_branch: root,
            active_branch: session.active.clone(),
            root_payload: root_info,
            branches: registry.branches().clone(),
        };

        export::write_artifact(target, &manifest, root_payload.as_deref(), &terminal_config)?;

        info!(target = %target.display(), branches = manifest.branches.len(), "exported pipeline");
        Ok(())
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Release every cached payload and delete every spilled one
    ///
    /// Ledgers are kept; loads fail with NotFound until states are
    /// re-committed. Calling it again is a no-op.
    pub fn cleanup(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        let _promotion_guard = self.promotion_lock.lock();
        self.cleanup_locked()
    }

    /// Cleanup, then start over with an empty root branch
    pub fn reset(&self, session: &mut Session) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        let _promotion_guard = self.promotion_lock.lock();
        self.cleanup_locked()?;

        let root = self.config.root_branch.clone();
        *self.registry.write() = BranchRegistry::new(root.clone());
        *session = Session::new(root, 0);

        info!("reset state manager");
        Ok(())
    }

    /// Cleanup (if configured) and mark closed
    pub fn close(self) -> Result<()> {
        if self.config.purge_on_close {
            self.cleanup()?;
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Internal cleanup (called with write and promotion locks held)
    fn cleanup_locked(&self) -> Result<()> {
        let cached = {
            let mut cache = self.cache.lock();
            let count = cache.len();
            cache.clear();
            count
        };
        let spilled = self.disk.purge_all()?;

        // Counts only: payload contents are never logged
        info!(cached, spilled, at = %Utc::now().to_rfc3339(), "session data purged");
        Ok(())
    }

    // =========================================================================
    // Accessors (for inspection and testing)
    // =========================================================================

    /// Summary statistics for a branch
    pub fn branch_summary(&self, name: &str) -> Result<BranchSummary> {
        self.registry.read().summary(name)
    }

    /// Every record of a branch, oldest first
    pub fn history(&self, branch: &str) -> Result<Vec<StateRecord>> {
        Ok(self.registry.read().ledger(branch)?.records().to_vec())
    }

    /// Most recent record with this label on a branch
    pub fn record(&self, branch: &str, state_id: &str) -> Result<StateRecord> {
        self.registry.read().record(branch, state_id).cloned()
    }

    /// Config snapshot of a state
    pub fn config_at(&self, branch: &str, state_id: &str) -> Result<serde_json::Value> {
        self.registry.read().config_at(branch, state_id)
    }

    /// Names of all live branches, sorted
    pub fn branch_names(&self) -> Vec<String> {
        self.registry.read().branch_names()
    }

    /// Whether a branch exists
    pub fn has_branch(&self, name: &str) -> bool {
        self.registry.read().contains(name)
    }

    /// Whether a state is resident in memory (does not touch recency)
    pub fn is_resident(&self, branch: &str, state_id: &str) -> bool {
        self.cache.lock().contains(&StateKey::new(branch, state_id))
    }

    /// Whether a state has a spill file
    pub fn is_spilled(&self, branch: &str, state_id: &str) -> bool {
        self.disk.contains(&StateKey::new(branch, state_id))
    }

    /// Number of resident payloads
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Number of spilled payloads
    pub fn disk_entry_count(&self) -> Result<usize> {
        self.disk.entry_count()
    }

    /// Get the spill directory path
    pub fn spill_dir(&self) -> &Path {
        self.disk.dir()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Explicit state id, or the branch's terminal state
    fn resolve_state(&self, branch: &str, state_id: Option<&str>) -> Result<String> {
        let registry = self.registry.read();
        let ledger = registry.ledger(branch)?;
        match state_id {
            Some(id) => Ok(id.to_string()),
            None => ledger
                .terminal()
                .map(|r| r.id.clone())
                .ok_or_else(|| ForkStoreError::EmptyBranch(branch.to_string())),
        }
    }

    /// Explain why a key is in neither cache nor disk
    fn diagnose_missing(&self, key: &StateKey) -> ForkStoreError {
        let registry = self.registry.read();
        let reason = match registry.ledger(&key.branch) {
            Err(_) => format!("branch '{}' does not exist", key.branch),
            Ok(ledger) if !ledger.contains(&key.state_id) => {
                format!("state '{}' was never committed on branch '{}'", key.state_id, key.branch)
            }
            Ok(_) => format!("payload for {} was purged", key),
        };
        ForkStoreError::NotFound(reason)
    }
}

impl Drop for StateManager {
    fn drop(&mut self) {
        if self.config.purge_on_close && !self.closed.load(Ordering::SeqCst) {
            if let Err(e) = self.cleanup() {
                warn!(error = %e, "failed to purge spill files on drop");
            }
        }
    }
}
