//! Inbound author record from the identity feed.

use serde::Deserialize;

use crate::error::ValidationError;
use crate::model::{non_blank, AuthorInput};

/// Author record as published by the identity service.
///
/// `active` defaults to `false` when absent, matching how the feed encodes
/// deactivated users.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSyncPayload {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, alias = "isActive")]
    pub active: bool,
}

impl AuthorSyncPayload {
    /// Decode and structurally validate a record body.
    pub fn decode(bytes: &[u8]) -> Result<Self, ValidationError> {
        let payload: Self = serde_json::from_slice(bytes)
            .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if non_blank(&self.username).is_none() {
            return Err(ValidationError::MalformedPayload(
                "username must not be blank".to_string(),
            ));
        }
        if non_blank(&self.first_name).is_none() {
            return Err(ValidationError::MalformedPayload(
                "firstName must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// The author shape handed to reconciliation. Names are not stored.
    pub fn to_author_input(&self) -> AuthorInput {
        AuthorInput::new(self.username.clone(), self.active)
    }
}
