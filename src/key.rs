//! State keys
//!
//! Structured `(branch, state id)` address shared by the cache and the
//! disk store. Path components are escaped so that no two keys map to the
//! same file, whatever characters the names contain.

use std::fmt;

/// Composite key of a cached payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    pub branch: String,
    pub state_id: String,
}

impl StateKey {
    pub fn new(branch: impl Into<String>, state_id: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            state_id: state_id.into(),
        }
    }

    pub fn belongs_to(&self, branch: &str) -> bool {
        self.branch == branch
    }

    /// Escaped directory name of the branch
    pub fn branch_component(&self) -> String {
        escape_component(&self.branch)
    }

    /// Escaped file stem of the state id
    pub fn state_component(&self) -> String {
        escape_component(&self.state_id)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.branch, self.state_id)
    }
}

/// Longest escaped component kept verbatim
///
/// Leaves room for the `.fks` extension and temp suffix under the usual
/// 255-byte file name limit.
pub const MAX_COMPONENT_LEN: usize = 200;

/// Percent-encode every byte outside `[A-Za-z0-9_-]`
///
/// Injective, and never produces `/`, `.` or `:`, so the result is always
/// a single safe path component. The empty string maps to `%`, which no
/// non-empty input can produce.
///
/// An encoding longer than [`MAX_COMPONENT_LEN`] is replaced by `~` and the
/// hex BLAKE3 digest of the raw name. `~` is always escaped in the
/// percent form, so digest names never collide with verbatim ones.
pub fn escape_component(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_string();
    }

    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }

    if out.len() > MAX_COMPONENT_LEN {
        return format!("~{}", blake3::hash(raw.as_bytes()).to_hex());
    }
    out
}
