use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::error::{InfraError, ValidationError};
use crate::storage::InMemoryDocumentStore;

fn reconciler() -> (AuthorReconciler, Arc<InMemoryDocumentStore>) {
    let store = Arc::new(InMemoryDocumentStore::new());
    (AuthorReconciler::new(store.clone()), store)
}

#[tokio::test]
async fn test_reconcile_creates_new_author() {
    let (reconciler, store) = reconciler();

    let author = reconciler
        .reconcile(&AuthorInput::new("john.doe", true))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(author.username, "john.doe");
    assert!(author.active);
    assert_eq!(store.author_count().await, 1);
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let (reconciler, store) = reconciler();
    let input = AuthorInput::new("john.doe", true);

    let first = reconciler.reconcile(&input).await.unwrap().unwrap();
    let second = reconciler.reconcile(&input).await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(store.author_count().await, 1);
}

#[tokio::test]
async fn test_reconcile_normalizes_username() {
    let (reconciler, store) = reconciler();

    let first = reconciler
        .reconcile(&AuthorInput::new("JoHn.DoE ", true))
        .await
        .unwrap()
        .unwrap();
    let second = reconciler
        .reconcile(&AuthorInput::new("john.doe", false))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.username, "john.doe");
    assert!(!second.active);
    assert_eq!(store.author_count().await, 1);
}

#[tokio::test]
async fn test_reconcile_merges_only_active_flag() {
    let (reconciler, _) = reconciler();

    let created = reconciler
        .reconcile(&AuthorInput::new("alice", false))
        .await
        .unwrap()
        .unwrap();
    let merged = reconciler
        .reconcile(&AuthorInput::new("ALICE", true))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(merged.id, created.id);
    assert_eq!(merged.username, created.username);
    assert!(merged.active);
}

#[tokio::test]
async fn test_reconcile_rejects_invalid_username_without_store_call() {
    let (reconciler, store) = reconciler();

    let too_long = "a".repeat(51);
    for username in ["ab", "  x ", too_long.as_str()] {
        let result = reconciler.reconcile(&AuthorInput::new(username, true)).await;
        assert!(matches!(
            result,
            Err(ServiceError::Validation(ValidationError::InvalidUsername { .. }))
        ));
    }
    assert_eq!(store.author_upsert_count(), 0);
}

#[tokio::test]
async fn test_reconcile_store_failure_is_transient() {
    let (reconciler, store) = reconciler();
    store.set_fail_on_write(true).await;

    let err = reconciler
        .reconcile(&AuthorInput::new("alice", true))
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(matches!(err, ServiceError::Infra(InfraError::Storage(_))));
}

#[tokio::test(start_paused = true)]
async fn test_reconcile_times_out() {
    let store = Arc::new(InMemoryDocumentStore::new());
    store.set_latency(Some(Duration::from_secs(5))).await;
    let reconciler = AuthorReconciler::with_timeout(store, Duration::from_secs(2));

    let err = reconciler
        .reconcile(&AuthorInput::new("alice", true))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Infra(InfraError::Timeout { .. })));
}

#[tokio::test]
async fn test_reconcile_lost_upsert_is_empty() {
    let (reconciler, store) = reconciler();
    store.set_lose_upserts(true).await;

    let result = reconciler
        .reconcile(&AuthorInput::new("alice", true))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_concurrent_reconciles_create_single_record() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let reconciler = Arc::new(AuthorReconciler::new(store.clone()));

    let handles: Vec<_> = ["carol", "Carol", " CAROL", "carol "]
        .into_iter()
        .map(|name| {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.reconcile(&AuthorInput::new(name, true)).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().unwrap().id);
    }
    ids.dedup();

    assert_eq!(ids.len(), 1);
    assert_eq!(store.author_count().await, 1);
}

#[tokio::test]
async fn test_find_author_and_active_check() {
    let (reconciler, store) = reconciler();
    reconciler
        .reconcile(&AuthorInput::new("alice", true))
        .await
        .unwrap();
    reconciler
        .reconcile(&AuthorInput::new("bob", false))
        .await
        .unwrap();

    assert!(reconciler.find_author(" ALICE ").await.unwrap().is_some());
    assert!(reconciler.is_author_active("alice").await.unwrap());
    assert!(!reconciler.is_author_active("bob").await.unwrap());
    assert!(!reconciler.is_author_active("nobody").await.unwrap());

    store.set_fail_on_read(true).await;
    assert!(reconciler.find_author("   ").await.unwrap().is_none());
}
