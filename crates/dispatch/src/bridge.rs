//! Queue bridge: connects a [`QueueConsumer`] to the dispatch loop.
//!
//! ```text
//!   [queue] --poll--> [poller] --Msg<Envelope>--> [DispatchService::run] --Ack--> [acker] --ack/nack--> [queue]
//! ```
//!
//! Shutdown order: the poller stops and drops its sender, the loop drains
//! what is already queued, then the acker drains the remaining acks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use craft_core::config::QueueConfig;
use craft_core::event::Envelope;
use craft_queue::{parse_message, QueueConsumer};

use crate::service::{Ack, DispatchService, DispatchStats, Msg};

/// Floor for the back-off after a failed poll.
const MIN_ERROR_BACKOFF: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy)]
pub struct BridgeOptions {
    pub max_batch_size: u32,
    /// Bound of both the message and the ack channel.
    pub channel_capacity: usize,
    /// Pause between polls. Zero means back-to-back long polls.
    pub poll_interval: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            channel_capacity: 16,
            poll_interval: Duration::ZERO,
        }
    }
}

impl BridgeOptions {
    pub fn from_queue_config(queue: &QueueConfig) -> Self {
        Self {
            max_batch_size: queue.max_batch_size,
            poll_interval: Duration::from_millis(queue.poll_interval_ms),
            ..Self::default()
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

pub struct QueueBridge {
    consumer: Arc<dyn QueueConsumer>,
    service: Arc<DispatchService>,
    options: BridgeOptions,
}

impl QueueBridge {
    pub fn new(
        consumer: Arc<dyn QueueConsumer>,
        service: Arc<DispatchService>,
        options: BridgeOptions,
    ) -> Self {
        Self {
            consumer,
            service,
            options,
        }
    }

    /// Run until `shutdown` is notified, then drain and return the loop stats.
    pub async fn run(self, shutdown: Arc<Notify>) -> DispatchStats {
        let capacity = self.options.channel_capacity.max(1);
        let (msg_tx, msg_rx) = mpsc::channel(capacity);
        let (ack_tx, ack_rx) = mpsc::channel(capacity);

        let poller = tokio::spawn(poll_loop(
            self.consumer.clone(),
            msg_tx,
            self.options,
            self.service.marker_suffix().to_string(),
            shutdown,
        ));
        let acker = tokio::spawn(ack_loop(self.consumer, ack_rx));

        let stats = self.service.run(msg_rx, ack_tx).await;

        if let Err(e) = poller.await {
            error!(error = %e, "Queue poller task failed");
        }
        match acker.await {
            Ok((acked, nacked)) => info!(acked, nacked, "Ack loop drained"),
            Err(e) => error!(error = %e, "Ack task failed"),
        }
        stats
    }
}

async fn poll_loop(
    consumer: Arc<dyn QueueConsumer>,
    tx: mpsc::Sender<Msg<Envelope>>,
    options: BridgeOptions,
    marker_suffix: String,
    shutdown: Arc<Notify>,
) {
    let error_backoff = options.poll_interval.max(MIN_ERROR_BACKOFF);
    info!(
        max_batch_size = options.max_batch_size,
        poll_interval_ms = options.poll_interval.as_millis() as u64,
        "Queue poller started"
    );

    loop {
        let polled = tokio::select! {
            _ = shutdown.notified() => break,
            polled = consumer.poll_batch(options.max_batch_size) => polled,
        };

        let messages = match polled {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, backoff_ms = error_backoff.as_millis() as u64, "Queue poll failed, backing off");
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = tokio::time::sleep(error_backoff) => continue,
                }
            }
        };

        for message in messages {
            let envelope = parse_message(&message, &marker_suffix);
            debug!(
                message_id = %message.id,
                kind = envelope.kind(),
                attempt = message.attempt_count,
                "Received message"
            );
            let msg = Msg {
                message_id: message.id,
                receipt_handle: message.receipt_handle,
                body: envelope,
            };
            if tx.send(msg).await.is_err() {
                warn!("Dispatch loop is gone, poller stopping");
                return;
            }
        }

        if !options.poll_interval.is_zero() {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = tokio::time::sleep(options.poll_interval) => {}
            }
        }
    }

    info!("Queue poller stopped");
}

/// Returns (acked, nacked) counts once every sender is gone.
async fn ack_loop(consumer: Arc<dyn QueueConsumer>, mut rx: mpsc::Receiver<Ack>) -> (u64, u64) {
    let (mut acked, mut nacked) = (0u64, 0u64);

    while let Some(ack) = rx.recv().await {
        let result = if ack.is_success() {
            acked += 1;
            consumer.ack(&ack.receipt_handle).await
        } else {
            nacked += 1;
            consumer.nack(&ack.receipt_handle).await
        };
        if let Err(e) = result {
            warn!(message_id = %ack.message_id, error = %e, "Failed to acknowledge message");
        }
    }

    (acked, nacked)
}
