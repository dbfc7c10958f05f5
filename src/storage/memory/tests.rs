use std::sync::Arc;

use super::*;
use crate::model::Page;
use crate::test_utils::{epoch, ids, make_post, seeded_store};

fn scan_all(index: i64, size: i64) -> PostScan {
    PostScan {
        enabled: None,
        sort: SortKey::CreationTime,
        page: Page::new(index, size).unwrap(),
    }
}

#[tokio::test]
async fn test_upsert_creates_then_merges() {
    let store = InMemoryDocumentStore::new();

    let first = store.upsert_active("alice", true).await.unwrap().unwrap();
    assert!(first.created);
    assert!(first.author.active);

    let second = store.upsert_active("alice", false).await.unwrap().unwrap();
    assert!(!second.created);
    assert!(!second.author.active);
    assert_eq!(second.author.id, first.author.id);
    assert_eq!(store.author_count().await, 1);
}

#[tokio::test]
async fn test_concurrent_upserts_same_username_create_one_record() {
    let store = Arc::new(InMemoryDocumentStore::new());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.upsert_active("bob", i % 2 == 0).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().unwrap().created {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(store.author_count().await, 1);
}

#[tokio::test]
async fn test_lose_upserts_returns_none() {
    let store = InMemoryDocumentStore::new();
    store.set_lose_upserts(true).await;

    assert!(store.upsert_active("carol", true).await.unwrap().is_none());
}

#[tokio::test]
async fn test_insert_assigns_id() {
    let store = InMemoryDocumentStore::new();
    let post = store
        .insert(NewPost {
            message: "hi".to_string(),
            creation_time: epoch(),
            author_username: "alice".to_string(),
            enabled: true,
        })
        .await
        .unwrap();

    assert!(!post.id.as_str().is_empty());
    assert_eq!(store.find_by_id(&post.id).await.unwrap(), Some(post));
}

#[tokio::test]
async fn test_update_missing_post_returns_none() {
    let store = InMemoryDocumentStore::new();
    let result = store
        .update(&PostId::new("missing"), &PostChanges::new("x", false))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_update_only_touches_mutable_fields() {
    let original = make_post("p1", "alice", 5, true);
    let store = seeded_store(&[("alice", true)], vec![original.clone()]).await;

    let updated = store
        .update(&PostId::new("p1"), &PostChanges::new("edited", false))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.message, "edited");
    assert!(!updated.enabled);
    assert_eq!(updated.creation_time, original.creation_time);
    assert_eq!(updated.author_username, original.author_username);
}

#[tokio::test]
async fn test_find_by_ids_skips_unknown() {
    let store = seeded_store(
        &[],
        vec![make_post("p1", "alice", 1, true), make_post("p2", "bob", 2, true)],
    )
    .await;

    let found = store
        .find_by_ids(&[PostId::new("p2"), PostId::new("nope"), PostId::new("p1")])
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["p2", "p1"]);
}

#[tokio::test]
async fn test_scan_sorts_newest_first_and_paginates() {
    let posts = (1..=5)
        .map(|i| make_post(&format!("p{i}"), "alice", i, true))
        .collect();
    let store = seeded_store(&[("alice", true)], posts).await;

    let first = store.scan(None, &scan_all(0, 3)).await.unwrap();
    assert_eq!(ids(&first), vec!["p5", "p4", "p3"]);

    let second = store.scan(None, &scan_all(1, 4)).await.unwrap();
    assert_eq!(ids(&second), vec!["p1"]);

    let beyond = store.scan(None, &scan_all(9, 4)).await.unwrap();
    assert!(beyond.is_empty());
}

#[tokio::test]
async fn test_scan_active_author_excludes_inactive() {
    let store = seeded_store(
        &[("alice", true), ("bob", false)],
        vec![
            make_post("a1", "alice", 1, true),
            make_post("b1", "bob", 2, true),
            make_post("orphan", "nobody", 3, true),
        ],
    )
    .await;

    let alice = store
        .scan_active_author("alice", &scan_all(0, 10))
        .await
        .unwrap();
    assert_eq!(ids(&alice), vec!["a1"]);

    let bob = store
        .scan_active_author("bob", &scan_all(0, 10))
        .await
        .unwrap();
    assert!(bob.is_empty());

    let nobody = store
        .scan_active_author("nobody", &scan_all(0, 10))
        .await
        .unwrap();
    assert!(nobody.is_empty());
}

#[tokio::test]
async fn test_injected_failures() {
    let store = InMemoryDocumentStore::new();
    store.set_fail_on_read(true).await;
    assert!(matches!(
        store.find_by_username("alice").await,
        Err(StorageError::Unavailable(_))
    ));

    store.set_fail_on_read(false).await;
    store.set_fail_on_write(true).await;
    assert!(matches!(
        store.upsert_active("alice", true).await,
        Err(StorageError::Unavailable(_))
    ));
    assert_eq!(store.author_count().await, 0);
}
