#![cfg(feature = "sqlite")]

use checkout_repo::{build_repo, Repo};
use checkout_types::ports::order_repository::OrderRepository;

#[tokio::test]
async fn builds_sqlite_repo_from_url() {
    // Use a temp DB path for isolation.
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("checkout-test.db");
    let url = format!("sqlite://{}", db_path.display());

    let repo: Repo = build_repo(Some(&url)).await.expect("build repo");
    // basic sanity: the pending projection should succeed and be empty
    let pending = repo.list_pending().await.expect("list pending");
    assert!(pending.is_empty());
}
