//! Post write and read paths.
//!
//! Writes go author gate, then store, then change event. Events are only
//! emitted for writes that committed, and never block the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::{Config, SearchConfig};
use crate::emitter::ChangeEventEmitter;
use crate::error::{with_deadline, ServiceError, ValidationError};
use crate::interfaces::{AuthorStore, MessageBroker, PostStore};
use crate::model::{
    non_blank, Author, AuthorInput, ChangeEvent, Post, PostChanges, PostDraft, PostId, SearchQuery,
    SearchQueryBuilder,
};

use super::{AuthorReconciler, PostQueryEngine};

/// Facade over reconciliation, search, persistence and emission.
pub struct PostService {
    posts: Arc<dyn PostStore>,
    reconciler: Arc<AuthorReconciler>,
    query: PostQueryEngine,
    emitter: Arc<ChangeEventEmitter>,
    search: SearchConfig,
    timeout: Duration,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostStore>,
        reconciler: Arc<AuthorReconciler>,
        query: PostQueryEngine,
        emitter: Arc<ChangeEventEmitter>,
        search: SearchConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            posts,
            reconciler,
            query,
            emitter,
            search,
            timeout,
        }
    }

    /// Wire every collaborator from configuration. Spawns the emitter's
    /// dispatcher, so it must run inside a tokio runtime.
    pub fn from_config(
        config: &Config,
        authors: Arc<dyn AuthorStore>,
        posts: Arc<dyn PostStore>,
        broker: Arc<dyn MessageBroker>,
    ) -> Self {
        let timeout = config.storage.timeout();
        let reconciler = Arc::new(AuthorReconciler::with_timeout(authors.clone(), timeout));
        let query = PostQueryEngine::new(posts.clone(), authors)
            .with_timeout(timeout)
            .with_author_precheck(config.search.author_precheck);
        let emitter = Arc::new(ChangeEventEmitter::from_config(
            broker,
            &config.messaging,
            config.emitter.clone(),
        ));
        Self::new(posts, reconciler, query, emitter, config.search.clone(), timeout)
    }

    pub fn reconciler(&self) -> &Arc<AuthorReconciler> {
        &self.reconciler
    }

    pub fn emitter(&self) -> &Arc<ChangeEventEmitter> {
        &self.emitter
    }

    /// Create a post for an existing, active author and announce it.
    #[tracing::instrument(name = "post.insert", skip_all, fields(correlation_id = %correlation_id.trim()))]
    pub async fn insert_post(
        &self,
        correlation_id: &str,
        draft: PostDraft,
    ) -> Result<Post, ServiceError> {
        let correlation_id = require_correlation_id(correlation_id)?;
        let new_post = draft.into_new_post(Utc::now())?;

        if !self.reconciler.is_author_active(&new_post.author_username).await? {
            return Err(ValidationError::AuthorNotActive(new_post.author_username).into());
        }

        let post = with_deadline("post insert", self.timeout, self.posts.insert(new_post)).await?;
        info!(post_id = %post.id, author = %post.author_username, "Post created");

        self.announce(correlation_id, ChangeEvent::created(&post));
        Ok(post)
    }

    /// Overwrite a post's message and status. `None` when no post has `id`;
    /// nothing is emitted in that case.
    #[tracing::instrument(name = "post.update", skip_all, fields(correlation_id = %correlation_id.trim(), post_id = %id.trim()))]
    pub async fn update_post(
        &self,
        correlation_id: &str,
        id: &str,
        changes: PostChanges,
    ) -> Result<Option<Post>, ServiceError> {
        let correlation_id = require_correlation_id(correlation_id)?;
        let id = PostId::parse(id)?;
        changes.validate()?;

        let updated =
            with_deadline("post update", self.timeout, self.posts.update(&id, &changes)).await?;

        match updated {
            Some(post) => {
                info!(post_id = %post.id, enabled = post.enabled, "Post updated");
                self.announce(correlation_id, ChangeEvent::updated(&post));
                Ok(Some(post))
            }
            None => {
                info!(post_id = %id, "Post not found, nothing updated");
                Ok(None)
            }
        }
    }

    /// Fetch one post regardless of its author's state.
    pub async fn retrieve_post_by_id(&self, id: &str) -> Result<Option<Post>, ServiceError> {
        let id = PostId::parse(id)?;
        Ok(with_deadline("post lookup", self.timeout, self.posts.find_by_id(&id)).await?)
    }

    /// Fetch every listed post that exists. Blank ids are skipped.
    pub async fn retrieve_posts_by_ids<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> Result<Vec<Post>, ServiceError> {
        let ids: Vec<PostId> = ids
            .iter()
            .filter_map(|id| PostId::parse(id.as_ref()).ok())
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(with_deadline("post batch lookup", self.timeout, self.posts.find_by_ids(&ids)).await?)
    }

    /// A query builder seeded with the configured search defaults.
    pub fn search_builder(&self) -> Result<SearchQueryBuilder, ValidationError> {
        self.search.builder()
    }

    pub async fn search_posts(&self, query: &SearchQuery) -> Result<Vec<Post>, ServiceError> {
        self.query.search(query).await
    }

    pub async fn find_author_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Author>, ServiceError> {
        self.reconciler.find_author(username).await
    }

    pub async fn is_author_active(&self, username: &str) -> Result<bool, ServiceError> {
        self.reconciler.is_author_active(username).await
    }

    pub async fn reconcile_author(&self, input: &AuthorInput) -> Result<Option<Author>, ServiceError> {
        self.reconciler.reconcile(input).await
    }

    fn announce(&self, correlation_id: &str, event: ChangeEvent) {
        let post_id = event.id.clone();
        if let Err(e) = self.emitter.emit_detached(correlation_id, event) {
            warn!(post_id = %post_id, error = %e, "Change event not scheduled");
        }
    }
}

fn require_correlation_id(correlation_id: &str) -> Result<&str, ValidationError> {
    non_blank(correlation_id).ok_or(ValidationError::BlankCorrelationId)
}
