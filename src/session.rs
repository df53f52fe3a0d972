//! Session context
//!
//! The active branch of one user session, passed explicitly to every
//! StateManager operation. Several sessions can share one manager.

/// Per-session cursor: the active branch and the ledger length this
/// session last observed on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub(crate) active: String,
    pub(crate) head: usize,
}

impl Session {
    pub(crate) fn new(active: impl Into<String>, head: usize) -> Self {
        Self {
            active: active.into(),
            head,
        }
    }

    /// Name of the active branch
    pub fn active_branch(&self) -> &str {
        &self.active
    }

    /// Number of records this session has seen on its active branch
    ///
    /// A commit succeeds only if the branch still has exactly this many
    /// records; otherwise another session moved it and the commit is
    /// rejected as a ledger conflict.
    pub fn head(&self) -> usize {
        self.head
    }

    pub(crate) fn move_to(&mut self, branch: impl Into<String>, head: usize) {
        self.active = branch.into();
        self.head = head;
    }
}
