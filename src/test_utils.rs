//! Test fixtures shared across module tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::interfaces::AuthorStore;
use crate::model::{Post, PostId};
use crate::storage::InMemoryDocumentStore;

/// Fixed instant every fixture timestamp is offset from.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// A post created `minutes` after [`epoch`].
pub fn make_post(id: &str, author: &str, minutes: i64, enabled: bool) -> Post {
    Post {
        id: PostId::new(id),
        message: format!("message {id}"),
        creation_time: epoch() + Duration::minutes(minutes),
        author_username: author.to_string(),
        enabled,
    }
}

/// Store seeded with the given authors and posts.
pub async fn seeded_store(
    authors: &[(&str, bool)],
    posts: Vec<Post>,
) -> Arc<InMemoryDocumentStore> {
    let store = Arc::new(InMemoryDocumentStore::new());
    for (username, active) in authors {
        store.upsert_active(username, *active).await.unwrap();
    }
    for post in posts {
        store.seed_post(post).await;
    }
    store
}

/// Ids of the given posts, in order.
pub fn ids(posts: &[Post]) -> Vec<&str> {
    posts.iter().map(|p| p.id.as_str()).collect()
}
