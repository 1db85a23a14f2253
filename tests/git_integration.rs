//! Integration tests against a real git binary
//!
//! Each test builds a throwaway repository in a temp dir (`master` with one commit and
//! a `dev` branch) and drives the lifecycle offline, so nothing touches a remote.
//!
//! ## Environment Variables
//!
//! - `BRANCHFLOW_GIT_TEST_ENABLED=true`: Required to run any git tests
//!
//! ## Running Tests
//!
//! ```bash
//! BRANCHFLOW_GIT_TEST_ENABLED=true cargo test --test git_integration
//! ```

use std::env;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use branchflow::api::Capabilities;
use branchflow::branch::{BranchKind, BranchNaming};
use branchflow::git::GitCli;
use branchflow::hooks::HookInstaller;
use branchflow::ledger::IssueLedger;
use branchflow::lifecycle::{BranchLifecycle, LifecycleError};
use branchflow::projects::ProjectContext;
use branchflow::prompt::ScriptedPrompter;
use branchflow::sequencer::{CommandSequencer, ProcessRunner, SystemProcessRunner};
use branchflow::store::MemoryStore;

// ─── Configuration Helpers ───────────────────────────────────────────────────

fn git_tests_enabled() -> bool {
    env::var("BRANCHFLOW_GIT_TEST_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

macro_rules! skip_if_not_configured {
    () => {
        if !git_tests_enabled() || !GitCli::is_installed() {
            eprintln!("Skipping test: BRANCHFLOW_GIT_TEST_ENABLED not set to true");
            return;
        }
    };
}

async fn git(repo: &Path, args: &str) -> String {
    let output = SystemProcessRunner
        .exec(&format!("git {}", args), repo)
        .await
        .expect("git should start");
    assert!(output.success(), "git {} failed", args);
    output.stdout
}

/// Fresh repository on `master` with a `dev` branch
async fn init_repo() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let repo = temp.path();

    git(repo, "init -q").await;
    git(repo, "symbolic-ref HEAD refs/heads/master").await;
    git(repo, "config user.email test@example.com").await;
    git(repo, "config user.name Test").await;
    git(repo, "commit -q --allow-empty -m initial").await;
    git(repo, "branch dev").await;

    temp
}

fn lifecycle(answers: &[&str]) -> BranchLifecycle {
    BranchLifecycle::new(
        BranchNaming::default(),
        CommandSequencer::new(Arc::new(SystemProcessRunner)),
        IssueLedger::new(Arc::new(MemoryStore::new())),
        Arc::new(ScriptedPrompter::new(answers.iter().copied())),
        Capabilities::new(),
        HookInstaller::new("branchflow", "/tmp/branchflow-test/store.json"),
    )
    .with_no_update(true)
}

// ─── Lifecycle Tests ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_feature_init_and_close() {
    skip_if_not_configured!();
    let temp = init_repo().await;
    let ctx = ProjectContext::new("scratch", temp.path());
    let lifecycle = lifecycle(&[]);

    let outcome = lifecycle
        .init(&ctx, BranchKind::Feature, Some("login".to_string()))
        .await
        .expect("init should succeed");
    assert_eq!(outcome.branch, "feature/login");

    let current = GitCli::current_branch(&SystemProcessRunner, temp.path())
        .await
        .unwrap();
    assert_eq!(current, "feature/login");

    git(temp.path(), "commit -q --allow-empty -m work").await;

    let closed = lifecycle.close(&ctx).await.expect("close should succeed");
    assert!(!closed.pushed);
    assert_eq!(closed.descriptor.kind, BranchKind::Feature);
}

#[tokio::test]
async fn test_release_close_creates_annotated_tag() {
    skip_if_not_configured!();
    let temp = init_repo().await;
    let ctx = ProjectContext::new("scratch", temp.path());
    let lifecycle = lifecycle(&["1.2.0"]);

    lifecycle
        .init(&ctx, BranchKind::Release, None)
        .await
        .expect("init should succeed");
    lifecycle.close(&ctx).await.expect("close should succeed");

    let message = git(temp.path(), "tag -l --format='%(contents)' v1.2.0").await;
    assert_eq!(message, "New release for v1.2.0");
}

#[tokio::test]
async fn test_init_on_existing_branch_fails_at_create_step() {
    skip_if_not_configured!();
    let temp = init_repo().await;
    git(temp.path(), "branch hotfix/0.1.1").await;
    let ctx = ProjectContext::new("scratch", temp.path());

    let err = lifecycle(&[])
        .init(&ctx, BranchKind::Hotfix, Some("0.1.1".to_string()))
        .await
        .unwrap_err();

    match err {
        LifecycleError::Sequence(e) => assert_eq!(e.index(), 1),
        other => panic!("expected sequence failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_close_on_master_is_a_classification_failure() {
    skip_if_not_configured!();
    let temp = init_repo().await;
    let ctx = ProjectContext::new("scratch", temp.path());

    let err = lifecycle(&[]).close(&ctx).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Classification { ref branch } if branch == "master"));
}
