//! In-memory document store for standalone mode and tests.
//!
//! Authors are keyed by username, which gives the same uniqueness guarantee a
//! unique index gives a real store. All writes happen under one lock, so an
//! upsert is atomic with respect to concurrent upserts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::interfaces::document_store::{
    AuthorStore, AuthorUpsert, PostScan, PostStore, Result, StorageError,
};
use crate::model::{Author, NewPost, Post, PostChanges, PostId, SortKey};

#[derive(Default)]
struct Collections {
    authors: HashMap<String, Author>,
    posts: HashMap<PostId, Post>,
}

#[derive(Default)]
struct Faults {
    fail_reads: bool,
    fail_writes: bool,
    latency: Option<Duration>,
    lose_upserts: bool,
}

/// Document store held in process memory.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    data: RwLock<Collections>,
    faults: RwLock<Faults>,
    post_scans: AtomicUsize,
    author_upserts: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read fail with `Unavailable`.
    pub async fn set_fail_on_read(&self, fail: bool) {
        self.faults.write().await.fail_reads = fail;
    }

    /// Make every write fail with `Unavailable`.
    pub async fn set_fail_on_write(&self, fail: bool) {
        self.faults.write().await.fail_writes = fail;
    }

    /// Delay every call by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.faults.write().await.latency = latency;
    }

    /// Acknowledge upserts without returning the stored record.
    pub async fn set_lose_upserts(&self, lose: bool) {
        self.faults.write().await.lose_upserts = lose;
    }

    /// Number of post scans (plain or joined) served so far.
    pub fn post_scan_count(&self) -> usize {
        self.post_scans.load(Ordering::SeqCst)
    }

    /// Number of author upserts served so far.
    pub fn author_upsert_count(&self) -> usize {
        self.author_upserts.load(Ordering::SeqCst)
    }

    /// Number of stored authors.
    pub async fn author_count(&self) -> usize {
        self.data.read().await.authors.len()
    }

    /// Insert a post with every field chosen by the caller, bypassing id and
    /// timestamp assignment. Intended for seeding fixtures.
    pub async fn seed_post(&self, post: Post) {
        self.data.write().await.posts.insert(post.id.clone(), post);
    }

    async fn before_read(&self) -> Result<()> {
        let (fail, latency) = {
            let faults = self.faults.read().await;
            (faults.fail_reads, faults.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(StorageError::Unavailable("read failure injected".to_string()));
        }
        Ok(())
    }

    async fn before_write(&self) -> Result<()> {
        let (fail, latency) = {
            let faults = self.faults.read().await;
            (faults.fail_writes, faults.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(StorageError::Unavailable("write failure injected".to_string()));
        }
        Ok(())
    }
}

/// Newest first, ties broken by id so pages are stable.
fn sort_descending(posts: &mut [Post], key: SortKey) {
    match key {
        SortKey::CreationTime => posts.sort_by(|a, b| {
            b.creation_time
                .cmp(&a.creation_time)
                .then_with(|| b.id.cmp(&a.id))
        }),
    }
}

fn window(mut posts: Vec<Post>, scan: &PostScan) -> Vec<Post> {
    sort_descending(&mut posts, scan.sort);
    let skip = usize::try_from(scan.page.skip()).unwrap_or(usize::MAX);
    let limit = usize::try_from(scan.page.limit()).unwrap_or(usize::MAX);
    posts.into_iter().skip(skip).take(limit).collect()
}

fn matches_enabled(post: &Post, enabled: Option<bool>) -> bool {
    enabled.map_or(true, |wanted| post.enabled == wanted)
}

#[async_trait]
impl AuthorStore for InMemoryDocumentStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Author>> {
        self.before_read().await?;
        Ok(self.data.read().await.authors.get(username).cloned())
    }

    async fn upsert_active(&self, username: &str, active: bool) -> Result<Option<AuthorUpsert>> {
        self.before_write().await?;
        self.author_upserts.fetch_add(1, Ordering::SeqCst);

        let upsert = {
            let mut data = self.data.write().await;
            let mut created = false;
            let author = data
                .authors
                .entry(username.to_string())
                .or_insert_with(|| {
                    created = true;
                    Author {
                        id: Uuid::new_v4().simple().to_string(),
                        username: username.to_string(),
                        active,
                    }
                });
            author.active = active;
            AuthorUpsert {
                author: author.clone(),
                created,
            }
        };

        if self.faults.read().await.lose_upserts {
            return Ok(None);
        }
        Ok(Some(upsert))
    }
}

#[async_trait]
impl PostStore for InMemoryDocumentStore {
    async fn insert(&self, post: NewPost) -> Result<Post> {
        self.before_write().await?;
        let stored = Post {
            id: PostId::new(Uuid::new_v4().simple().to_string()),
            message: post.message,
            creation_time: post.creation_time,
            author_username: post.author_username,
            enabled: post.enabled,
        };
        self.data
            .write()
            .await
            .posts
            .insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>> {
        self.before_read().await?;
        Ok(self.data.read().await.posts.get(id).cloned())
    }

    async fn find_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>> {
        self.before_read().await?;
        let data = self.data.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| data.posts.get(id).cloned())
            .collect())
    }

    async fn update(&self, id: &PostId, changes: &PostChanges) -> Result<Option<Post>> {
        self.before_write().await?;
        let mut data = self.data.write().await;
        Ok(data.posts.get_mut(id).map(|post| {
            post.message = changes.message.clone();
            post.enabled = changes.enabled;
            post.clone()
        }))
    }

    async fn scan(&self, author: Option<&str>, scan: &PostScan) -> Result<Vec<Post>> {
        self.before_read().await?;
        self.post_scans.fetch_add(1, Ordering::SeqCst);

        let data = self.data.read().await;
        let posts = data
            .posts
            .values()
            .filter(|post| author.map_or(true, |name| post.author_username == name))
            .filter(|post| matches_enabled(post, scan.enabled))
            .cloned()
            .collect();
        Ok(window(posts, scan))
    }

    async fn scan_active_author(&self, author: &str, scan: &PostScan) -> Result<Vec<Post>> {
        self.before_read().await?;
        self.post_scans.fetch_add(1, Ordering::SeqCst);

        let data = self.data.read().await;
        let posts = data
            .posts
            .values()
            .filter(|post| {
                data.authors
                    .get(&post.author_username)
                    .is_some_and(|joined| joined.active && joined.username == author)
            })
            .filter(|post| matches_enabled(post, scan.enabled))
            .cloned()
            .collect();
        Ok(window(posts, scan))
    }
}

#[cfg(test)]
mod tests;
