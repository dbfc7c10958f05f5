//! Paginated post search parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{non_blank, normalize_username};
use crate::error::ValidationError;

/// Default page index when none is supplied.
pub const DEFAULT_PAGE_INDEX: i64 = 0;
/// Default page size when none is supplied.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// A validated page window. Index is zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    index: u64,
    size: u64,
}

impl Page {
    /// Rejects `index < 0` and `size <= 0`.
    pub fn new(index: i64, size: i64) -> Result<Self, ValidationError> {
        if index < 0 || size <= 0 {
            return Err(ValidationError::InvalidPage { index, size });
        }
        Ok(Self {
            index: index as u64,
            size: size as u64,
        })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of records to skip: `index * size`.
    pub fn skip(&self) -> u64 {
        self.index.saturating_mul(self.size)
    }

    /// Maximum number of records to return.
    pub fn limit(&self) -> u64 {
        self.size
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            index: DEFAULT_PAGE_INDEX as u64,
            size: DEFAULT_PAGE_SIZE as u64,
        }
    }
}

/// Post status filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Enabled,
    Disabled,
    #[default]
    All,
}

impl PostStatus {
    /// The `enabled` value to match, or `None` when every post qualifies.
    pub fn enabled_filter(&self) -> Option<bool> {
        match self {
            PostStatus::Enabled => Some(true),
            PostStatus::Disabled => Some(false),
            PostStatus::All => None,
        }
    }
}

impl FromStr for PostStatus {
    type Err = ValidationError;

    /// Case-insensitive parse by status name.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "enabled" => Ok(PostStatus::Enabled),
            "disabled" => Ok(PostStatus::Disabled),
            "all" => Ok(PostStatus::All),
            _ => Err(ValidationError::UnknownStatus(value.to_string())),
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PostStatus::Enabled => "enabled",
            PostStatus::Disabled => "disabled",
            PostStatus::All => "all",
        };
        f.write_str(name)
    }
}

/// Post field to sort by. Results are always newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    #[serde(rename = "creationTime")]
    CreationTime,
}

impl SortKey {
    /// Document field name the key maps to.
    pub fn field(&self) -> &'static str {
        match self {
            SortKey::CreationTime => "creationTime",
        }
    }
}

impl FromStr for SortKey {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match non_blank(value).map(str::to_ascii_lowercase).as_deref() {
            Some("creationtime") | Some("creation_time") => Ok(SortKey::CreationTime),
            _ => Err(ValidationError::UnknownSortKey(value.to_string())),
        }
    }
}

/// A validated post search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    author_filter: Option<String>,
    status: PostStatus,
    page: Page,
    sort_key: SortKey,
}

impl SearchQuery {
    pub fn builder() -> SearchQueryBuilder {
        SearchQueryBuilder::default()
    }

    /// Normalized author filter, if any.
    pub fn author_filter(&self) -> Option<&str> {
        self.author_filter.as_deref()
    }

    pub fn status(&self) -> PostStatus {
        self.status
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }
}

/// Builder for [`SearchQuery`]. Validation happens in [`build`](Self::build),
/// before any store call can be made.
#[derive(Debug, Clone)]
pub struct SearchQueryBuilder {
    author: Option<String>,
    status: PostStatus,
    index: i64,
    size: i64,
    sort_key: SortKey,
}

impl Default for SearchQueryBuilder {
    fn default() -> Self {
        Self {
            author: None,
            status: PostStatus::All,
            index: DEFAULT_PAGE_INDEX,
            size: DEFAULT_PAGE_SIZE,
            sort_key: SortKey::CreationTime,
        }
    }
}

impl SearchQueryBuilder {
    /// Filter by author. Blank values clear the filter.
    pub fn author(mut self, username: &str) -> Self {
        self.author = non_blank(username).map(normalize_username);
        self
    }

    /// Filter by author when present.
    pub fn maybe_author(self, username: Option<&str>) -> Self {
        match username {
            Some(name) => self.author(name),
            None => self,
        }
    }

    pub fn status(mut self, status: PostStatus) -> Self {
        self.status = status;
        self
    }

    /// Parse and set the status filter by name.
    pub fn status_name(self, status: &str) -> Result<Self, ValidationError> {
        Ok(self.status(status.parse()?))
    }

    pub fn page(mut self, index: i64, size: i64) -> Self {
        self.index = index;
        self.size = size;
        self
    }

    pub fn at_page(mut self, index: i64) -> Self {
        self.index = index;
        self
    }

    pub fn page_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    pub fn sort_key(mut self, sort_key: SortKey) -> Self {
        self.sort_key = sort_key;
        self
    }

    pub fn build(self) -> Result<SearchQuery, ValidationError> {
        Ok(SearchQuery {
            author_filter: self.author,
            status: self.status,
            page: Page::new(self.index, self.size)?,
            sort_key: self.sort_key,
        })
    }
}
