//! Paginated post search.
//!
//! The engine picks a [`SearchStrategy`] from the query alone, then runs it
//! against the document store. Every strategy returns posts newest first.

mod strategy;

pub use strategy::SearchStrategy;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::DEFAULT_STORE_TIMEOUT_MS;
use crate::error::{with_deadline, ServiceError};
use crate::interfaces::{AuthorStore, PostScan, PostStore};
use crate::model::{Post, SearchQuery};

/// Strategy-selecting search over posts and author state.
pub struct PostQueryEngine {
    posts: Arc<dyn PostStore>,
    authors: Arc<dyn AuthorStore>,
    timeout: Duration,
    author_precheck: bool,
}

impl PostQueryEngine {
    pub fn new(posts: Arc<dyn PostStore>, authors: Arc<dyn AuthorStore>) -> Self {
        Self {
            posts,
            authors,
            timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            author_precheck: false,
        }
    }

    /// Bound every store call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve author filters with a lookup before scanning posts.
    pub fn with_author_precheck(mut self, enabled: bool) -> Self {
        self.author_precheck = enabled;
        self
    }

    /// The strategy [`search`](Self::search) would run for `query`.
    pub fn strategy_for<'q>(&self, query: &'q SearchQuery) -> SearchStrategy<'q> {
        SearchStrategy::select(query, self.author_precheck)
    }

    /// Run a validated search and return one page of posts.
    #[tracing::instrument(name = "post.search", skip_all, fields(author = ?query.author_filter(), status = %query.status()))]
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Post>, ServiceError> {
        let scan = PostScan {
            enabled: query.status().enabled_filter(),
            sort: query.sort_key(),
            page: query.page(),
        };

        let strategy = self.strategy_for(query);
        debug!(strategy = strategy.name(), "Selected search strategy");

        let posts = match strategy {
            SearchStrategy::Join { author } => {
                with_deadline(
                    "post join scan",
                    self.timeout,
                    self.posts.scan_active_author(author, &scan),
                )
                .await?
            }
            SearchStrategy::PrecheckedAuthor { author } => {
                let found = with_deadline(
                    "author lookup",
                    self.timeout,
                    self.authors.find_by_username(author),
                )
                .await?;
                if !found.is_some_and(|a| a.active) {
                    debug!(author, "Author unknown or inactive, skipping post scan");
                    return Ok(Vec::new());
                }
                with_deadline("post scan", self.timeout, self.posts.scan(Some(author), &scan))
                    .await?
            }
            SearchStrategy::StatusOnly => {
                with_deadline("post scan", self.timeout, self.posts.scan(None, &scan)).await?
            }
        };

        debug!(count = posts.len(), "Search complete");
        Ok(posts)
    }
}
