//! Post search defaults.

use serde::Deserialize;

use crate::error::ValidationError;
use crate::model::{PostStatus, SearchQueryBuilder, SortKey, DEFAULT_PAGE_INDEX, DEFAULT_PAGE_SIZE};

/// Defaults applied to every new search, overridable per request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Page index used when a request gives none.
    pub page_index: i64,
    /// Page size used when a request gives none.
    pub page_size: i64,
    /// Sort key name.
    pub sort_by: String,
    /// Status filter name (enabled, disabled, all).
    pub status: String,
    /// Look the author up before scanning posts, returning an empty page
    /// early when the author is unknown or inactive.
    pub author_precheck: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_index: DEFAULT_PAGE_INDEX,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: SortKey::CreationTime.field().to_string(),
            status: PostStatus::All.to_string(),
            author_precheck: false,
        }
    }
}

impl SearchConfig {
    /// A query builder seeded with these defaults.
    pub fn builder(&self) -> Result<SearchQueryBuilder, ValidationError> {
        let sort_key: SortKey = self.sort_by.parse()?;
        let status: PostStatus = self.status.parse()?;
        Ok(SearchQueryBuilder::default()
            .page(self.page_index, self.page_size)
            .sort_key(sort_key)
            .status(status))
    }
}
