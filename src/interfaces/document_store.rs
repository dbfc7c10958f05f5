//! Document store interface for authors and posts.

use async_trait::async_trait;

use crate::model::{Author, NewPost, Page, Post, PostChanges, PostId, SortKey};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Invalid document id: {0}")]
    InvalidId(String),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[cfg(feature = "mongodb")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// Outcome of an atomic author upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorUpsert {
    /// The stored record after the write.
    pub author: Author,
    /// Whether the write inserted a new record.
    pub created: bool,
}

/// Post-side predicates, sort and window shared by every scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostScan {
    /// Match on `enabled`; `None` matches every post.
    pub enabled: Option<bool>,
    /// Sort field. Order is always descending.
    pub sort: SortKey,
    /// Skip/limit window.
    pub page: Page,
}

/// Author persistence.
///
/// Usernames passed in are already normalized. Implementations must hold a
/// unique index on `username`.
#[async_trait]
pub trait AuthorStore: Send + Sync {
    /// Find an author by its unique username.
    async fn find_by_username(&self, username: &str) -> Result<Option<Author>>;

    /// Atomically insert the author or set only its `active` flag.
    ///
    /// Concurrent calls for the same username must converge on one record.
    /// Returns `None` when the store acknowledged the write but the record
    /// could not be read back.
    async fn upsert_active(&self, username: &str, active: bool) -> Result<Option<AuthorUpsert>>;
}

/// Post persistence.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert a post, assigning its id.
    async fn insert(&self, post: NewPost) -> Result<Post>;

    /// Find a post by id regardless of author state.
    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>>;

    /// Find every post whose id is listed. Unknown ids are skipped.
    async fn find_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>>;

    /// Overwrite the mutable fields of an existing post.
    ///
    /// Returns `None` when no post has the given id.
    async fn update(&self, id: &PostId, changes: &PostChanges) -> Result<Option<Post>>;

    /// Filtered, sorted, paginated scan over posts only.
    ///
    /// `author` adds an equality predicate on the post's author username.
    async fn scan(&self, author: Option<&str>, scan: &PostScan) -> Result<Vec<Post>>;

    /// Scan joined to authors: only posts whose author is `author` and whose
    /// stored author record is active.
    async fn scan_active_author(&self, author: &str, scan: &PostScan) -> Result<Vec<Post>>;
}
