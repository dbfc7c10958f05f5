//! Post change events published to the broker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Post, PostId};

/// Kind of mutation that produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Created,
    Updated,
}

/// Wire payload for a post mutation.
///
/// The correlation id is carried as a broker header next to this payload,
/// never inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub id: PostId,
    pub message: String,
    pub creation_time: DateTime<Utc>,
    pub author_username: String,
    pub enabled: bool,
    pub action: Action,
}

impl ChangeEvent {
    pub fn from_post(post: &Post, action: Action) -> Self {
        Self {
            id: post.id.clone(),
            message: post.message.clone(),
            creation_time: post.creation_time,
            author_username: post.author_username.clone(),
            enabled: post.enabled,
            action,
        }
    }

    pub fn created(post: &Post) -> Self {
        Self::from_post(post, Action::Created)
    }

    pub fn updated(post: &Post) -> Self {
        Self::from_post(post, Action::Updated)
    }
}
