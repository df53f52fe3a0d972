//! Export artifact
//!
//! Reproducibility bundle written by `StateManager::export` and read back
//! by the CLI.
//!
//! ## Layout
//! ```text
//! {target}/
//!   ├── root_payload.fks       (root branch origin payload, codec format)
//!   ├── state_store.json       (every branch's ledger, metadata only)
//!   └── pipeline_config.json   (active branch terminal config snapshot)
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::disk::write_file_atomic;
use crate::error::{ForkStoreError, Result};
use crate::ledger::Branch;
use crate::payload::{self, ContentHash, Payload};

pub const ROOT_PAYLOAD_FILE: &str = "root_payload.fks";
pub const STATE_STORE_FILE: &str = "state_store.json";
pub const PIPELINE_CONFIG_FILE: &str = "pipeline_config.json";

/// Current export format version
pub const FORMAT_VERSION: u32 = 1;

/// Identity of the exported root payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootPayloadInfo {
    pub state_id: String,
    pub content_hash: ContentHash,
    pub row_count: usize,
    pub column_count: usize,
}

/// Contents of `state_store.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub root_branch: String,
    pub active_branch: String,
    pub root_payload: Option<RootPayloadInfo>,
    pub branches: BTreeMap<String, Branch>,
}

impl ExportManifest {
    /// Load `state_store.json` from an export directory
    pub fn read(dir: &Path) -> Result<Self> {
        let bytes = fs::read(dir.join(STATE_STORE_FILE))?;
        let manifest: ExportManifest = serde_json::from_slice(&bytes)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(ForkStoreError::Corruption(format!(
                "unsupported export format version {}",
                manifest.format_version
            )));
        }
        Ok(manifest)
    }

    pub fn branch(&self, name: &str) -> Option<&Branch> {
        self.branches.get(name)
    }
}

/// Result of checking an export directory
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub branches: usize,
    pub records: usize,
    /// Branches whose parent chain does not reconstruct commit order
    pub broken_chains: Vec<String>,
    /// Whether the root payload matched its recorded hash (None if absent)
    pub root_payload_ok: Option<bool>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.broken_chains.is_empty() && self.root_payload_ok != Some(false)
    }
}

/// Write the export files
///
/// `root_payload.fks` is only present when a root payload is given. Every file goes through a temp name and rename, so a failed export
/// never leaves a truncated document behind. Failures surface as
/// `WriteFailed`.
pub(crate) fn write_artifact(
    dir: &Path,
    manifest: &ExportManifest,
    root_payload: Option<&Payload>,
    terminal_config: &serde_json::Value,
) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| ForkStoreError::write_failed(dir.display(), e))?;

    match root_payload {
        Some(payload) => {
            let bytes = payload::encode(payload)?;
            write_document(dir, ROOT_PAYLOAD_FILE, &bytes)?;
        }
        // A payload left by an earlier export would no longer match the manifest
        None => {
            let stale = dir.join(ROOT_PAYLOAD_FILE);
            match fs::remove_file(&stale) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(ForkStoreError::write_failed(stale.display(), e)),
            }
        }
    }

    let store_json = serde_json::to_vec_pretty(manifest)?;
    write_document(dir, STATE_STORE_FILE, &store_json)?;

    let config_json = serde_json::to_vec_pretty(terminal_config)?;
    write_document(dir, PIPELINE_CONFIG_FILE, &config_json)?;

    Ok(())
}

/// Decode the root payload of an export, if one was written
pub fn read_root_payload(dir: &Path) -> Result<Option<Payload>> {
    match fs::read(dir.join(ROOT_PAYLOAD_FILE)) {
        Ok(bytes) => payload::decode(&bytes).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read the terminal configuration document
pub fn read_pipeline_config(dir: &Path) -> Result<serde_json::Value> {
    let bytes = fs::read(dir.join(PIPELINE_CONFIG_FILE))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Check ledger chains and the root payload hash of an export
pub fn verify_artifact(dir: &Path) -> Result<VerifyReport> {
    let manifest = ExportManifest::read(dir)?;

    let broken_chains = manifest
        .branches
        .iter()
        .filter(|(_, branch)| !branch.ledger.verify_chain())
        .map(|(name, _)| name.clone())
        .collect();

    let root_payload_ok = match (&manifest.root_payload, read_root_payload(dir)) {
        (Some(info), Ok(Some(payload))) => Some(payload::content_hash(&payload)? == info.content_hash),
        (_, Err(ForkStoreError::Corruption(reason))) => {
            tracing::warn!(reason = %reason, "root payload failed to decode");
            Some(false)
        }
        (_, Err(e)) => return Err(e),
        (Some(_), Ok(None)) | (None, Ok(Some(_))) => Some(false),
        (None, Ok(None)) => None,
    };

    Ok(VerifyReport {
        branches: manifest.branches.len(),
        records: manifest.branches.values().map(|b| b.ledger.len()).sum(),
        broken_chains,
        root_payload_ok,
    })
}

fn write_document(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let final_path = dir.join(name);
    let tmp_path = dir.join(format!("{}.tmp", name));
    write_file_atomic(&final_path, &tmp_path, bytes, true)
        .map_err(|e| ForkStoreError::write_failed(final_path.display(), e))
}
