//! Storage implementations.

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::interfaces::{AuthorStore, PostStore};

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "mongodb")]
pub mod mongodb;

#[cfg(feature = "memory")]
pub use memory::InMemoryDocumentStore;

#[cfg(feature = "mongodb")]
pub use mongodb::MongoDocumentStore;

/// Author and post stores sharing one backend.
pub type DocumentStores = (Arc<dyn AuthorStore>, Arc<dyn PostStore>);

/// Initialize storage based on configuration.
///
/// Returns the (AuthorStore, PostStore) pair for the configured backend.
pub async fn init_storage(
    config: &StorageConfig,
) -> Result<DocumentStores, Box<dyn std::error::Error>> {
    info!(storage_type = %config.storage_type, "Initializing document store");

    match config.storage_type {
        StorageType::Memory => {
            #[cfg(feature = "memory")]
            {
                let store = Arc::new(InMemoryDocumentStore::new());
                let stores: DocumentStores = (store.clone(), store);
                Ok(stores)
            }

            #[cfg(not(feature = "memory"))]
            {
                tracing::error!("Memory storage requested but 'memory' feature is not enabled");
                Err("Memory feature not enabled".into())
            }
        }
        StorageType::Mongodb => {
            #[cfg(feature = "mongodb")]
            {
                let client = ::mongodb::Client::with_uri_str(&config.mongodb.uri).await?;
                let store =
                    Arc::new(MongoDocumentStore::new(&client, &config.mongodb.database).await?);
                info!(database = %config.mongodb.database, "MongoDB document store ready");
                let stores: DocumentStores = (store.clone(), store);
                Ok(stores)
            }

            #[cfg(not(feature = "mongodb"))]
            {
                tracing::error!("MongoDB storage requested but 'mongodb' feature is not enabled");
                Err("MongoDB feature not enabled".into())
            }
        }
    }
}
