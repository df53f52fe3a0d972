//! DiskStore implementation
//!
//! One file per StateKey, one directory per branch.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::SpillSyncStrategy;
use crate::error::{ForkStoreError, Result};
use crate::key::{escape_component, StateKey};
use crate::payload::{self, Payload};

/// File extension of spilled payloads
pub const SPILL_EXTENSION: &str = "fks";

/// Suffix of branch directories awaiting removal
pub const TOMBSTONE_SUFFIX: &str = "deleted";

/// Durable holding area for evicted payloads
///
/// ## Concurrency:
/// - All methods use `&self`; distinct keys map to distinct files
/// - Writes go through a unique temp file, so concurrent writers of the
///   same key never interleave bytes (last rename wins)
pub struct DiskStore {
    /// Root spill directory
    dir: PathBuf,

    /// Whether spill files are fsynced before rename
    sync_strategy: SpillSyncStrategy,

    /// Counter for unique temp file names (atomic, lock-free)
    next_tmp_id: AtomicU64,
}

impl DiskStore {
    /// Open or create the spill directory
    pub fn open(dir: &Path, sync_strategy: SpillSyncStrategy) -> Result<Self> {
        fs::create_dir_all(dir)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            sync_strategy,
            next_tmp_id: AtomicU64::new(0),
        })
    }

    /// Serialize and store a payload
    ///
    /// Any failure surfaces as `WriteFailed` and leaves no file behind.
    pub fn write(&self, key: &StateKey, payload: &Payload) -> Result<()> {
        let bytes = payload::encode(payload)?;
        let branch_dir = self.branch_dir(&key.branch);
        let final_path = self.entry_path(key);
        let tmp_path = branch_dir.join(format!(
            "{}.{}.tmp-{}",
            key.state_component(),
            SPILL_EXTENSION,
            self.next_tmp_id.fetch_add(1, Ordering::Relaxed)
        ));

        let sync = self.sync_strategy == SpillSyncStrategy::EveryWrite;
        let result = fs::create_dir_all(&branch_dir)
            .and_then(|_| write_file_atomic(&final_path, &tmp_path, &bytes, sync));

        if let Err(e) = result {
            return Err(ForkStoreError::write_failed(key, e));
        }

        tracing::debug!(key = %key, bytes = bytes.len(), "spilled payload to disk");
        Ok(())
    }

    /// Read a payload back
    ///
    /// Returns:
    /// - `Ok(Some(payload))`: entry present and intact
    /// - `Ok(None)`: no entry for this key
    /// - `Err(Corruption)`: entry present but fails format/CRC checks
    pub fn read(&self, key: &StateKey) -> Result<Option<Payload>> {
        let bytes = match fs::read(self.entry_path(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        payload::decode(&bytes)
            .map(Some)
            .map_err(|e| ForkStoreError::Corruption(format!("spill file for {}: {}", key, e)))
    }

    /// Check whether an entry exists for this key
    pub fn contains(&self, key: &StateKey) -> bool {
        self.entry_path(key).is_file()
    }

    /// Delete a single entry. Returns whether one existed.
    pub fn delete(&self, key: &StateKey) -> Result<bool> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every entry of one branch. Returns the number removed.
    pub fn delete_all(&self, branch: &str) -> Result<usize> {
        match self.detach_branch(branch)? {
            Some(tombstone) => self.remove_detached(&tombstone),
            None => Ok(0),
        }
    }

    /// Move a branch directory aside under a tombstone name
    ///
    /// After this, no key of `branch` resolves to a file, but nothing has
    /// been erased yet. Returns `None` if the branch never spilled.
    /// Tombstones start with `.`, which escaped names never contain, and
    /// are skipped by [`DiskStore::entry_count`].
    pub fn detach_branch(&self, branch: &str) -> Result<Option<PathBuf>> {
        let branch_dir = self.branch_dir(branch);
        if !branch_dir.exists() {
            return Ok(None);
        }

        let tombstone = self
            .dir
            .join(format!(".{}.{}", escape_component(branch), TOMBSTONE_SUFFIX));
        // Left over from an earlier delete whose removal failed
        if tombstone.is_dir() {
            fs::remove_dir_all(&tombstone)?;
        }
        fs::rename(&branch_dir, &tombstone)?;

        tracing::debug!(branch, tombstone = %tombstone.display(), "detached branch spill directory");
        Ok(Some(tombstone))
    }

    /// Undo [`DiskStore::detach_branch`]
    pub fn restore_detached(&self, branch: &str, tombstone: &Path) -> Result<()> {
        fs::rename(tombstone, self.branch_dir(branch))?;
        Ok(())
    }

    /// Erase a directory returned by [`DiskStore::detach_branch`]
    pub fn remove_detached(&self, tombstone: &Path) -> Result<usize> {
        let removed = Self::count_entries(tombstone)?;
        fs::remove_dir_all(tombstone)?;
        Ok(removed)
    }

    /// Delete every entry of every branch. Returns the number removed.
    ///
    /// Also clears detached branch directories and stray files.
    /// Idempotent: purging an already-empty store removes nothing.
    pub fn purge_all(&self) -> Result<usize> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_dir() {
                removed += Self::count_entries(&path)?;
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(removed)
    }

    /// Total number of spilled entries across all branches
    ///
    /// Detached branch directories are not counted.
    pub fn entry_count(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                count += Self::count_entries(&path)?;
            }
        }
        Ok(count)
    }

    /// Get the spill directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a key
    pub fn entry_path(&self, key: &StateKey) -> PathBuf {
        self.branch_dir(&key.branch)
            .join(format!("{}.{}", key.state_component(), SPILL_EXTENSION))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn branch_dir(&self, branch: &str) -> PathBuf {
        self.dir.join(escape_component(branch))
    }

    /// Count finished spill files in a branch directory
    fn count_entries(branch_dir: &Path) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(branch_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(SPILL_EXTENSION) {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Write `bytes` to `tmp_path`, then rename over `final_path`
///
/// The temp file is removed on any failure. With `sync`, the file and its
/// parent directory are fsynced so the rename survives a crash.
pub(crate) fn write_file_atomic(
    final_path: &Path,
    tmp_path: &Path,
    bytes: &[u8],
    sync: bool,
) -> io::Result<()> {
    let result = (|| -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)?;
        file.write_all(bytes)?;
        if sync {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(tmp_path, final_path)?;

        if sync {
            if let Some(parent) = final_path.parent() {
                File::open(parent)?.sync_all()?;
            }
        }
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(tmp_path);
    }
    result
}
