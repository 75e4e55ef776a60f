mod common;

use predicates::prelude::*;

fn ids(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_blocked_task_cannot_be_completed_until_blocker_is_done() {
    let dir = common::setup_test_env();
    let root = dir.path();
    common::add_task(root, "t1", "web");
    common::add_task(root, "t2", "web");

    let edge = common::run_json(root, &["dep", "add", "t2", "t1", "--project", "web"]);
    assert_eq!(edge["dependentTaskId"], "t2");
    assert_eq!(edge["blockingTaskId"], "t1");

    let t2 = common::run_json(root, &["task", "get", "t2"]);
    assert_eq!(t2["isBlocked"], true);
    assert_eq!(t2["dependencies"], serde_json::json!(["t1"]));

    common::tfe_in(root)
        .args(["task", "done", "t2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TASK_BLOCKED"))
        .stderr(predicate::str::contains("t1"));

    let t1 = common::run_json(root, &["task", "done", "t1"]);
    assert_eq!(t1["completed"], true);
    assert_eq!(t1["dependentTaskIds"], serde_json::json!(["t2"]));

    let started = common::run_json(root, &["task", "start", "t2"]);
    assert_eq!(started["status"], "doing");
    assert_eq!(started["isBlocked"], false);
}

#[test]
fn test_transitive_cycle_is_rejected_with_the_cycle() {
    let dir = common::setup_test_env();
    let root = dir.path();
    for id in ["t1", "t2", "t3"] {
        common::add_task(root, id, "web");
    }
    common::run_json(root, &["dep", "add", "t2", "t3", "--project", "web"]);
    common::run_json(root, &["dep", "add", "t3", "t1", "--project", "web"]);

    common::tfe_in(root)
        .args(["dep", "add", "t1", "t2", "--project", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CIRCULAR_DEPENDENCY"))
        .stderr(predicate::str::contains("t1 → t2 → t3 → t1"));

    let t1 = common::run_json(root, &["task", "get", "t1"]);
    assert_eq!(t1["dependencies"], serde_json::json!([]));
}

#[test]
fn test_self_dependency_is_rejected() {
    let dir = common::setup_test_env();
    let root = dir.path();
    common::add_task(root, "t1", "web");

    common::tfe_in(root)
        .args(["dep", "add", "t1", "t1", "--project", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SELF_DEPENDENCY"));
}

#[test]
fn test_cross_project_and_missing_endpoints_are_rejected() {
    let dir = common::setup_test_env();
    let root = dir.path();
    common::add_task(root, "a", "web");
    common::add_task(root, "x", "mobile");

    common::tfe_in(root)
        .args(["dep", "add", "a", "x", "--project", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_INPUT"));

    common::tfe_in(root)
        .args(["dep", "add", "a", "ghost", "--project", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TASK_NOT_FOUND"));
}

#[test]
fn test_order_and_critical_path() {
    let dir = common::setup_test_env();
    let root = dir.path();
    for id in ["ship", "build", "design", "docs"] {
        common::add_task(root, id, "web");
    }
    common::run_json(root, &["dep", "add", "build", "design", "--project", "web"]);
    common::run_json(root, &["dep", "add", "ship", "build", "--project", "web"]);
    common::run_json(root, &["dep", "add", "ship", "docs", "--project", "web"]);

    let order = ids(&common::run_json(root, &["dep", "order", "--project", "web"]));
    let position = |id: &str| order.iter().position(|o| o == id).unwrap();
    assert_eq!(order.len(), 4);
    assert!(position("design") < position("build"));
    assert!(position("build") < position("ship"));
    assert!(position("docs") < position("ship"));

    let path = ids(&common::run_json(
        root,
        &["dep", "critical-path", "--project", "web"],
    ));
    assert_eq!(path, vec!["design", "build", "ship"]);
}

#[test]
fn test_status_validate_and_remove() {
    let dir = common::setup_test_env();
    let root = dir.path();
    common::add_task(root, "a", "web");
    common::add_task(root, "b", "web");
    common::run_json(root, &["dep", "add", "b", "a", "--project", "web"]);

    let status = common::run_json(root, &["dep", "status", "b"]);
    assert_eq!(status["isBlocked"], true);
    assert_eq!(status["canStart"], false);
    assert_eq!(status["blockingTasks"][0]["id"], "a");

    let validation = common::run_json(root, &["dep", "validate", "a", "b", "--project", "web"]);
    assert_eq!(validation["valid"], false);
    assert_eq!(
        validation["circularDependencies"][0],
        serde_json::json!(["a", "b", "a"])
    );

    let removed = common::run_json(root, &["dep", "remove", "b", "a"]);
    assert_eq!(removed["removed"], true);

    let status = common::run_json(root, &["dep", "status", "b"]);
    assert_eq!(status["canStart"], true);
    let a = common::run_json(root, &["task", "get", "a"]);
    assert_eq!(a["dependentTaskIds"], serde_json::json!([]));
}

#[test]
fn test_deleting_a_blocker_unblocks_dependents() {
    let dir = common::setup_test_env();
    let root = dir.path();
    common::add_task(root, "a", "web");
    common::add_task(root, "b", "web");
    common::run_json(root, &["dep", "add", "b", "a", "--project", "web"]);

    let deleted = common::run_json(root, &["task", "delete", "a"]);
    assert_eq!(deleted["deleted"], true);

    let b = common::run_json(root, &["task", "get", "b"]);
    assert_eq!(b["isBlocked"], false);
    assert_eq!(b["dependencies"], serde_json::json!([]));

    common::tfe_in(root)
        .args(["task", "get", "a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TASK_NOT_FOUND"));
}
