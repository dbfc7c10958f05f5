use crate::model::SearchQuery;

/// How a search reaches the store.
///
/// `StatusOnly` never consults author state, so it returns posts of inactive
/// authors too; only searches naming an author are gated on the author being
/// active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy<'q> {
    /// Posts joined to authors, restricted to the active author `author`.
    Join { author: &'q str },
    /// Author looked up first; an unknown or inactive author yields an empty
    /// page without touching posts.
    PrecheckedAuthor { author: &'q str },
    /// Posts filtered by status only.
    StatusOnly,
}

impl<'q> SearchStrategy<'q> {
    pub fn select(query: &'q SearchQuery, author_precheck: bool) -> Self {
        match (query.author_filter(), author_precheck) {
            (Some(author), false) => SearchStrategy::Join { author },
            (Some(author), true) => SearchStrategy::PrecheckedAuthor { author },
            (None, _) => SearchStrategy::StatusOnly,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SearchStrategy::Join { .. } => "join",
            SearchStrategy::PrecheckedAuthor { .. } => "prechecked_author",
            SearchStrategy::StatusOnly => "status_only",
        }
    }
}
