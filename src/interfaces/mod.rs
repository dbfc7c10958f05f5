//! Abstract interfaces for quill's external collaborators.
//!
//! These traits define the contracts for:
//! - Document storage (authors and posts)
//! - Message broker (change-event publication, author-sync subscription)

pub mod broker;
pub mod document_store;

pub use broker::{
    Acknowledger, BusError, Delivery, Headers, InboundRecord, MessageBroker, OutboundRecord,
    Subscription,
};
pub use document_store::{AuthorStore, AuthorUpsert, PostScan, PostStore, StorageError};
