//! Application services: author reconciliation, post search and the post facade.

pub mod author_reconciler;
pub mod post_query;
pub mod post_service;

pub use author_reconciler::AuthorReconciler;
pub use post_query::{PostQueryEngine, SearchStrategy};
pub use post_service::PostService;
