//! Tests for Ledger and BranchRegistry
//!
//! These tests verify:
//! - Parent links and positions follow commit order
//! - Appends that do not extend the terminal record are rejected
//! - Repeated labels resolve to the latest record
//! - Branch creation and deletion rules (exists, source, root, active)
//! - Summaries and JSON shape of exported branches

use forkstore::ledger::{BranchRegistry, ForkPoint, Ledger, StateRecord};
use forkstore::payload::{self, ContentHash};
use forkstore::{Column, ForkStoreError, Payload};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn hash_of(rows: usize) -> ContentHash {
    let payload = Payload::new(vec![Column::numeric("x", vec![Some(1.0); rows])]).unwrap();
    payload::content_hash(&payload).unwrap()
}

fn next(ledger: &Ledger, id: &str, rows: usize) -> StateRecord {
    ledger.next_record(id, hash_of(rows), rows, 1, json!({ "stage": id }), format!("{} done", id))
}

fn commit(registry: &mut BranchRegistry, branch: &str, id: &str, rows: usize) -> usize {
    let record = next(registry.ledger(branch).unwrap(), id, rows);
    registry.append_record(branch, record).unwrap()
}

fn fork(branch: &str, state_id: &str, position: usize) -> ForkPoint {
    ForkPoint {
        branch: branch.to_string(),
        state_id: state_id.to_string(),
        position,
    }
}

fn registry_with_main(ids: &[&str]) -> BranchRegistry {
    let mut registry = BranchRegistry::new("main");
    for (i, id) in ids.iter().enumerate() {
        commit(&mut registry, "main", id, 100 - i);
    }
    registry
}

// =============================================================================
// Ledger Tests
// =============================================================================

#[test]
fn test_parent_chain_follows_commit_order() {
    let mut ledger = Ledger::new();
    for id in ["raw", "clean", "scaled"] {
        let record = next(&ledger, id, 1);
        ledger.append("main", record).unwrap();
    }

    let records = ledger.records();
    assert_eq!(records[0].parent, None);
    assert_eq!(records[1].parent.as_deref(), Some("raw"));
    assert_eq!(records[2].parent.as_deref(), Some("clean"));
    assert_eq!(records.iter().map(|r| r.position).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(ledger.verify_chain());
}

#[test]
fn test_append_rejects_stale_parent() {
    let mut ledger = Ledger::new();
    let first = next(&ledger, "a", 1);
    let stale = next(&ledger, "b", 1);
    ledger.append("main", first).unwrap();

    let result = ledger.append("main", stale);

    assert!(matches!(result, Err(ForkStoreError::LedgerConflict { .. })));
    assert_eq!(ledger.len(), 1);
}

#[test]
fn test_append_rejects_wrong_position_with_same_parent() {
    let mut ledger = Ledger::new();
    let record = next(&ledger, "a", 1);
    ledger.append("main", record).unwrap();
    let record = next(&ledger, "a", 1);
    ledger.append("main", record).unwrap();

    // Parent "a" matches the terminal id, but position 1 is already taken
    let mut replay = ledger.records()[1].clone();
    replay.position = 1;
    let result = ledger.append("main", replay);

    assert!(matches!(result, Err(ForkStoreError::LedgerConflict { .. })));
}

#[test]
fn test_repeated_label_resolves_to_latest() {
    let mut ledger = Ledger::new();
    for (id, rows) in [("s", 10), ("t", 20), ("s", 30)] {
        let record = next(&ledger, id, rows);
        ledger.append("main", record).unwrap();
    }

    assert_eq!(ledger.latest("s").unwrap().row_count, 30);
    assert_eq!(ledger.latest("s").unwrap().position, 2);
    assert_eq!(ledger.at(0).unwrap().row_count, 10);
    assert!(ledger.verify_chain());
}

#[test]
fn test_verify_chain_detects_tampering() {
    let mut ledger = Ledger::new();
    for id in ["a", "b"] {
        let record = next(&ledger, id, 1);
        ledger.append("main", record).unwrap();
    }

    let mut records = ledger.records().to_vec();
    records[1].parent = Some("zzz".to_string());
    let tampered: Ledger = serde_json::from_value(serde_json::to_value(&records).unwrap()).unwrap();

    assert!(!tampered.verify_chain());
}

// =============================================================================
// Registry Record Tests
// =============================================================================

#[test]
fn test_new_registry_has_empty_root() {
    let registry = BranchRegistry::new("main");

    assert_eq!(registry.root_name(), "main");
    assert_eq!(registry.branch_names(), vec!["main"]);
    assert!(registry.ledger("main").unwrap().is_empty());
    assert!(matches!(registry.terminal_record("main"), Err(ForkStoreError::NotFound(_))));
}

#[test]
fn test_record_lookup() {
    let registry = registry_with_main(&["raw", "clean"]);

    assert_eq!(registry.terminal_record("main").unwrap().id, "clean");
    assert_eq!(registry.record("main", "raw").unwrap().row_count, 100);
    assert_eq!(registry.config_at("main", "clean").unwrap(), json!({ "stage": "clean" }));
    assert!(matches!(registry.record("main", "nope"), Err(ForkStoreError::NotFound(_))));
    assert!(matches!(registry.ledger("ghost"), Err(ForkStoreError::UnknownBranch(_))));
}

#[test]
fn test_append_to_unknown_branch() {
    let mut registry = BranchRegistry::new("main");
    let record = Ledger::new().next_record("a", hash_of(1), 1, 1, json!(null), "");

    let result = registry.append_record("ghost", record);

    assert!(matches!(result, Err(ForkStoreError::UnknownBranch(_))));
}

// =============================================================================
// Branch Creation Tests
// =============================================================================

#[test]
fn test_create_branch_from_record() {
    let mut registry = registry_with_main(&["raw", "clean"]);

    registry.create_branch("alt", fork("main", "raw", 0)).unwrap();

    let branch = registry.get("alt").unwrap();
    assert_eq!(branch.forked_from, Some(fork("main", "raw", 0)));
    assert!(branch.ledger.is_empty());
    assert_eq!(registry.branch_names(), vec!["alt", "main"]);
}

#[test]
fn test_create_existing_branch_fails() {
    let mut registry = registry_with_main(&["raw"]);
    registry.create_branch("alt", fork("main", "raw", 0)).unwrap();

    let result = registry.create_branch("alt", fork("main", "raw", 0));

    assert!(matches!(result, Err(ForkStoreError::BranchExists(_))));
}

#[test]
fn test_create_branch_missing_source() {
    let mut registry = registry_with_main(&["raw"]);

    let unknown_branch = registry.create_branch("a", fork("ghost", "raw", 0));
    let unknown_state = registry.create_branch("b", fork("main", "nope", 0));
    let wrong_position = registry.create_branch("c", fork("main", "raw", 3));

    assert!(matches!(unknown_branch, Err(ForkStoreError::SourceNotFound(_))));
    assert!(matches!(unknown_state, Err(ForkStoreError::SourceNotFound(_))));
    assert!(matches!(wrong_position, Err(ForkStoreError::SourceNotFound(_))));
    assert_eq!(registry.branch_names(), vec!["main"]);
}

// =============================================================================
// Branch Deletion Tests
// =============================================================================

#[test]
fn test_delete_branch() {
    let mut registry = registry_with_main(&["raw"]);
    registry.create_branch("alt", fork("main", "raw", 0)).unwrap();
    commit(&mut registry, "alt", "raw", 100);

    let removed = registry.delete_branch("alt", "main").unwrap();

    assert_eq!(removed.ledger.len(), 1);
    assert!(!registry.contains("alt"));
}

#[test]
fn test_delete_root_refused() {
    let mut registry = registry_with_main(&["raw"]);
    registry.create_branch("alt", fork("main", "raw", 0)).unwrap();

    let result = registry.delete_branch("main", "alt");

    assert!(matches!(result, Err(ForkStoreError::ProtectedBranch(_))));
    assert!(registry.contains("main"));
}

#[test]
fn test_delete_active_refused() {
    let mut registry = registry_with_main(&["raw"]);
    registry.create_branch("alt", fork("main", "raw", 0)).unwrap();

    let result = registry.delete_branch("alt", "alt");

    assert!(matches!(result, Err(ForkStoreError::ActiveBranch(_))));
    assert!(registry.contains("alt"));
}

#[test]
fn test_delete_unknown_branch() {
    let mut registry = BranchRegistry::new("main");

    let result = registry.delete_branch("ghost", "main");

    assert!(matches!(result, Err(ForkStoreError::UnknownBranch(_))));
}

#[test]
fn test_forked_ledgers_are_independent() {
    let mut registry = registry_with_main(&["raw", "clean"]);
    registry.create_branch("alt", fork("main", "raw", 0)).unwrap();
    commit(&mut registry, "alt", "raw", 100);
    commit(&mut registry, "alt", "alt_clean", 95);
    commit(&mut registry, "main", "scaled", 92);

    assert_eq!(registry.ledger("main").unwrap().len(), 3);
    assert_eq!(registry.ledger("alt").unwrap().len(), 2);
    assert_eq!(registry.record("alt", "alt_clean").unwrap().parent.as_deref(), Some("raw"));
}

// =============================================================================
// Summary Tests
// =============================================================================

#[test]
fn test_summary_of_populated_branch() {
    let registry = registry_with_main(&["raw", "clean"]);

    let summary = registry.summary("main").unwrap();

    assert_eq!(summary.name, "main");
    assert_eq!(summary.states, 2);
    assert_eq!(summary.terminal_state.as_deref(), Some("clean"));
    assert_eq!(summary.row_count, Some(99));
    assert_eq!(summary.column_count, Some(1));
    assert!(summary.last_modified.is_some());
    assert!(summary.forked_from.is_none());
}

#[test]
fn test_summary_of_empty_branch() {
    let registry = BranchRegistry::new("main");

    let summary = registry.summary("main").unwrap();

    assert_eq!(summary.states, 0);
    assert!(summary.terminal_state.is_none());
    assert!(summary.row_count.is_none());
    assert!(matches!(registry.summary("ghost"), Err(ForkStoreError::UnknownBranch(_))));
}

#[test]
fn test_branch_json_shape() {
    let mut registry = registry_with_main(&["raw"]);
    registry.create_branch("alt", fork("main", "raw", 0)).unwrap();

    let value = serde_json::to_value(registry.get("alt").unwrap()).unwrap();

    assert_eq!(value["forked_from"]["branch"], "main");
    assert_eq!(value["forked_from"]["state_id"], "raw");
    assert!(value["states"].as_array().unwrap().is_empty());
}
