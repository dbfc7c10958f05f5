//! Author reconciliation.
//!
//! Creates or merges an author's active flag by normalized username. The
//! store's atomic upsert is the only serialization point: concurrent
//! reconciliations of one username converge on a single record.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::DEFAULT_STORE_TIMEOUT_MS;
use crate::error::{with_deadline, ServiceError};
use crate::interfaces::AuthorStore;
use crate::model::{non_blank, normalize_username, validated_username, Author, AuthorInput};

/// Idempotent create-or-merge of author active state.
pub struct AuthorReconciler {
    authors: Arc<dyn AuthorStore>,
    timeout: Duration,
}

impl AuthorReconciler {
    /// Create a reconciler with the default store timeout.
    pub fn new(authors: Arc<dyn AuthorStore>) -> Self {
        Self::with_timeout(authors, Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS))
    }

    /// Create a reconciler whose store calls are bounded by `timeout`.
    pub fn with_timeout(authors: Arc<dyn AuthorStore>, timeout: Duration) -> Self {
        Self { authors, timeout }
    }

    /// Insert the author, or set only the stored record's active flag.
    ///
    /// Returns `None` when the store acknowledged the write without returning
    /// the record. Repeating the same input leaves the store unchanged.
    #[tracing::instrument(name = "author.reconcile", skip_all, fields(username = %input.username.trim()))]
    pub async fn reconcile(&self, input: &AuthorInput) -> Result<Option<Author>, ServiceError> {
        let username = validated_username(&input.username)?;

        let upsert = with_deadline(
            "author upsert",
            self.timeout,
            self.authors.upsert_active(&username, input.active),
        )
        .await?;

        match upsert {
            Some(upsert) if upsert.created => {
                info!(username = %upsert.author.username, active = upsert.author.active, "Author created");
                Ok(Some(upsert.author))
            }
            Some(upsert) => {
                info!(username = %upsert.author.username, active = upsert.author.active, "Author merged");
                Ok(Some(upsert.author))
            }
            None => {
                debug!(username = %username, "Upsert returned no record");
                Ok(None)
            }
        }
    }

    /// Look up an author by username. Blank usernames are absent.
    pub async fn find_author(&self, username: &str) -> Result<Option<Author>, ServiceError> {
        let Some(username) = non_blank(username).map(normalize_username) else {
            return Ok(None);
        };
        Ok(with_deadline(
            "author lookup",
            self.timeout,
            self.authors.find_by_username(&username),
        )
        .await?)
    }

    /// Whether the author exists and is active.
    pub async fn is_author_active(&self, username: &str) -> Result<bool, ServiceError> {
        Ok(self
            .find_author(username)
            .await?
            .is_some_and(|author| author.active))
    }
}

#[cfg(test)]
mod tests;
