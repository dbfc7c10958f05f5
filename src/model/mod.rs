//! Domain records: authors, posts, change events and search queries.

mod event;
mod query;

pub use event::{Action, ChangeEvent};
pub use query::{
    Page, PostStatus, SearchQuery, SearchQueryBuilder, SortKey, DEFAULT_PAGE_INDEX,
    DEFAULT_PAGE_SIZE,
};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, USERNAME_MAX_LEN, USERNAME_MIN_LEN};

/// Lowercase and trim a username. Applied before every author lookup or write.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Normalize a username and enforce the length constraint.
pub fn validated_username(username: &str) -> Result<String, ValidationError> {
    let normalized = normalize_username(username);
    let len = normalized.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ValidationError::InvalidUsername {
            username: normalized,
            min: USERNAME_MIN_LEN,
            max: USERNAME_MAX_LEN,
        });
    }
    Ok(normalized)
}

/// Returns `Some(trimmed)` for non-blank input.
pub(crate) fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Author identity as stored in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub username: String,
    pub active: bool,
}

/// Author shape submitted for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorInput {
    pub username: String,
    pub active: bool,
}

impl AuthorInput {
    pub fn new(username: impl Into<String>, active: bool) -> Self {
        Self {
            username: username.into(),
            active,
        }
    }
}

/// Opaque post identifier assigned by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a caller-supplied id, rejecting blanks.
    pub fn parse(id: &str) -> Result<Self, ValidationError> {
        non_blank(id)
            .map(|trimmed| Self(trimmed.to_string()))
            .ok_or(ValidationError::BlankPostId)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub message: String,
    pub creation_time: DateTime<Utc>,
    pub author_username: String,
    pub enabled: bool,
}

/// Client submission for a new post.
///
/// Carries no timestamp or status: creation time is always assigned by the
/// server and new posts always start enabled. Unknown fields such as a
/// client-supplied `creationTime` are ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    pub message: String,
    pub author_username: String,
}

impl PostDraft {
    pub fn new(message: impl Into<String>, author_username: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            author_username: author_username.into(),
        }
    }

    /// Validate and stamp the draft, producing the record to persist.
    pub fn into_new_post(self, now: DateTime<Utc>) -> Result<NewPost, ValidationError> {
        if non_blank(&self.message).is_none() {
            return Err(ValidationError::BlankMessage);
        }
        Ok(NewPost {
            message: self.message,
            creation_time: now,
            author_username: validated_username(&self.author_username)?,
            enabled: true,
        })
    }
}

/// A validated post ready for insertion; the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub message: String,
    pub creation_time: DateTime<Utc>,
    pub author_username: String,
    pub enabled: bool,
}

/// The mutable fields of an existing post.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostChanges {
    pub message: String,
    pub enabled: bool,
}

impl PostChanges {
    pub fn new(message: impl Into<String>, enabled: bool) -> Self {
        Self {
            message: message.into(),
            enabled,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match non_blank(&self.message) {
            Some(_) => Ok(()),
            None => Err(ValidationError::BlankMessage),
        }
    }
}
