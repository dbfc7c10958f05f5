//! Bounded buffer between emit attempts and the broker.
//!
//! A dispatcher task drains the buffer, starting publishes in submission
//! order with up to `concurrency` in flight, and settles each record's
//! [`PublishAck`]. The ack timeout runs from the moment a publish starts, so
//! time spent queued behind other records never counts against the broker.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::EmitError;
use crate::config::{BufferConfig, OverflowPolicy};
use crate::interfaces::{BusError, MessageBroker, OutboundRecord};

/// Settlement callback carried by every buffered record.
pub struct PublishAck {
    correlation_id: String,
    key: Option<String>,
    done: oneshot::Sender<Result<(), EmitError>>,
}

impl PublishAck {
    /// The broker accepted the record.
    pub fn ack(self) {
        info!(
            correlation_id = %self.correlation_id,
            post_id = ?self.key,
            "Change event acknowledged"
        );
        let _ = self.done.send(Ok(()));
    }

    /// The broker rejected the record.
    pub fn nack(self, err: BusError) {
        error!(
            correlation_id = %self.correlation_id,
            post_id = ?self.key,
            error = %err,
            "Change event nacked"
        );
        let _ = self.done.send(Err(EmitError::Nack(err)));
    }

    /// The broker did not settle the record within `after`.
    pub fn timed_out(self, after: Duration) {
        warn!(
            correlation_id = %self.correlation_id,
            post_id = ?self.key,
            timeout = ?after,
            "Change event publish timed out"
        );
        let _ = self.done.send(Err(EmitError::Timeout(after)));
    }

    /// The submitter stopped waiting for this record.
    fn is_abandoned(&self) -> bool {
        self.done.is_closed()
    }
}

struct Envelope {
    record: OutboundRecord,
    ack: PublishAck,
}

pub struct OutboundBuffer {
    sender: mpsc::Sender<Envelope>,
    overflow: OverflowPolicy,
    capacity: usize,
    ack_timeout: Duration,
}

impl OutboundBuffer {
    /// Create the buffer and spawn its dispatcher on the current runtime.
    ///
    /// At most `concurrency` publishes run at once. The dispatcher exits once
    /// the buffer is dropped and drained.
    pub fn spawn(broker: Arc<dyn MessageBroker>, config: &BufferConfig, concurrency: usize) -> Self {
        let capacity = config.capacity.max(1);
        let ack_timeout = config.ack_timeout();
        let (sender, receiver) = mpsc::channel(capacity);
        tokio::spawn(dispatch(broker, receiver, concurrency.max(1), ack_timeout));
        Self {
            sender,
            overflow: config.overflow,
            capacity,
            ack_timeout,
        }
    }

    /// Records waiting for the dispatcher.
    pub fn pending(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    /// Enqueue one record and wait for the broker to settle it.
    ///
    /// Under [`OverflowPolicy::Block`] the wait for space is bounded by the ack
    /// timeout and reported as [`EmitError::BufferFull`].
    pub async fn submit(&self, record: OutboundRecord, correlation_id: &str) -> Result<(), EmitError> {
        let (done, settled) = oneshot::channel();
        let envelope = Envelope {
            ack: PublishAck {
                correlation_id: correlation_id.to_string(),
                key: record.key.clone(),
                done,
            },
            record,
        };

        match self.overflow {
            OverflowPolicy::Fail => self.sender.try_send(envelope).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => EmitError::BufferFull,
                mpsc::error::TrySendError::Closed(_) => EmitError::Closed,
            })?,
            OverflowPolicy::Block => {
                match tokio::time::timeout(self.ack_timeout, self.sender.send(envelope)).await {
                    Ok(sent) => sent.map_err(|_| EmitError::Closed)?,
                    Err(_) => return Err(EmitError::BufferFull),
                }
            }
        }

        settled.await.unwrap_or(Err(EmitError::Closed))
    }
}

async fn dispatch(
    broker: Arc<dyn MessageBroker>,
    receiver: mpsc::Receiver<Envelope>,
    concurrency: usize,
    ack_timeout: Duration,
) {
    let broker = broker.as_ref();
    ReceiverStream::new(receiver)
        .for_each_concurrent(concurrency, |envelope| {
            publish_one(broker, envelope, ack_timeout)
        })
        .await;
    debug!("Outbound buffer closed, dispatcher stopping");
}

async fn publish_one(broker: &dyn MessageBroker, envelope: Envelope, ack_timeout: Duration) {
    let Envelope { record, ack } = envelope;
    if ack.is_abandoned() {
        debug!(
            correlation_id = %ack.correlation_id,
            post_id = ?ack.key,
            "Submitter gone, skipping publish"
        );
        return;
    }

    // Dropping the publish on timeout keeps a retried record from also
    // landing late.
    match tokio::time::timeout(ack_timeout, broker.publish(record)).await {
        Ok(Ok(())) => ack.ack(),
        Ok(Err(err)) => ack.nack(err),
        Err(_) => ack.timed_out(ack_timeout),
    }
}
