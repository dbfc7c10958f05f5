//! quill-sync: Author synchronisation worker
//!
//! Consumes author records from the upstream author topic and reconciles them
//! into the document store, so post writes and searches see current author
//! state.
//!
//! ## Architecture
//! ```text
//! [author topic] --(broker)--> [quill-sync] --(upsert)--> [document store]
//! ```
//!
//! ## Configuration
//! - QUILL_CONFIG: Path to a YAML config file (optional)
//! - QUILL_LOG: Tracing filter (default: info)
//! - QUILL__*: Overrides with `__` as the section separator,
//!   e.g. QUILL__MESSAGING__AUTHORS_TOPIC

use std::sync::Arc;

use tracing::{error, info};

use quill::bus::init_broker;
use quill::config::Config;
use quill::consumer::AuthorSyncConsumer;
use quill::services::AuthorReconciler;
use quill::storage::init_storage;
use quill::utils::bootstrap::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;
    let (authors, _posts) = init_storage(&config.storage).await?;
    let broker = init_broker(&config.messaging).await?;

    let reconciler = Arc::new(AuthorReconciler::with_timeout(
        authors,
        config.storage.timeout(),
    ));
    let consumer =
        AuthorSyncConsumer::from_config(reconciler, &config.messaging, config.consumer.clone());

    let topic = config.messaging.authors_topic.clone();
    info!(
        topic = %topic,
        storage_type = %config.storage.storage_type,
        max_retries = config.consumer.max_retries,
        "quill-sync started"
    );

    tokio::select! {
        result = consumer.run(broker.as_ref(), &topic) => {
            if let Err(e) = result {
                error!(error = %e, "Author sync consumer stopped");
                return Err(e.into());
            }
            info!("Author subscription closed");
        }
        _ = shutdown_signal() => {}
    }

    info!("quill-sync stopped");
    Ok(())
}
