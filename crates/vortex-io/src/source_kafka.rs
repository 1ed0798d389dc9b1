//! The Kafka consumer-group source.
//!
//! Mirrors the original sarama `Consumer`: a consumer-group client with
//! auto-commit disabled, restoring the last committed offset on assignment
//! via `committed`+`seek`, and committing only when the sink asks it to
//! (after a successful flush) or when a rebalance is about to revoke our
//! partitions.

use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use futures::StreamExt;
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::Message as _;
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::Offset;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vortex_core::Record;

/// How long to wait on the broker for committed-offset lookups and commits
/// issued from inside a rebalance callback.
const REBALANCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Restores committed offsets on assignment, commits synchronously before a
/// revoke, and signals `KafkaSource::await_rebalance` — the `rdkafka`
/// equivalent of sarama's `Setup`/`Cleanup` consumer-group hooks.
///
/// Holds a weak back-reference to the `StreamConsumer` it is attached to, set
/// once by [`KafkaSource::new`] right after the consumer is wrapped in an
/// `Arc` (the context is moved into the consumer at construction time, so it
/// cannot hold a strong reference to its own owner).
struct VortexConsumerContext {
    consumer: OnceLock<Weak<StreamConsumer<VortexConsumerContext>>>,
    rebalanced: Arc<Notify>,
}

impl VortexConsumerContext {
    fn new(rebalanced: Arc<Notify>) -> Self {
        Self {
            consumer: OnceLock::new(),
            rebalanced,
        }
    }

    fn set_consumer(&self, consumer: &Arc<StreamConsumer<VortexConsumerContext>>) {
        let _ = self.consumer.set(Arc::downgrade(consumer));
    }

    fn consumer(&self) -> Option<Arc<StreamConsumer<VortexConsumerContext>>> {
        self.consumer.get().and_then(Weak::upgrade)
    }

    /// Fetches the group's committed offsets for the just-assigned partitions
    /// and seeks each one there, so consumption resumes exactly where the
    /// last commit left off instead of wherever `auto.offset.reset` would
    /// otherwise land.
    fn restore_committed_offsets(&self, assignment: &TopicPartitionList) {
        let Some(consumer) = self.consumer() else {
            return;
        };

        let committed = match consumer.committed_offsets(assignment.clone(), REBALANCE_TIMEOUT) {
            Ok(committed) => committed,
            Err(err) => {
                warn!(%err, "Failed to fetch committed offsets on assignment");
                return;
            }
        };

        for elem in committed.elements() {
            if let Offset::Offset(offset) = elem.offset() {
                if let Err(err) = consumer.seek(elem.topic(), elem.partition(), Offset::Offset(offset), REBALANCE_TIMEOUT) {
                    warn!(
                        %err,
                        topic = elem.topic(),
                        partition = elem.partition(),
                        "Failed to seek to committed offset"
                    );
                }
            }
        }
    }
}

impl ClientContext for VortexConsumerContext {}

impl ConsumerContext for VortexConsumerContext {
    fn pre_rebalance<'a>(&self, rebalance: &Rebalance<'a>) {
        match rebalance {
            Rebalance::Assign(assignment) => {
                info!(partitions = assignment.count(), "Received assignment from Kafka");
                self.restore_committed_offsets(assignment);
            }
            Rebalance::Revoke(_) => {
                info!("Re-balance is about to happen. Committing offsets...");
                if let Some(consumer) = self.consumer() {
                    if let Err(err) = consumer.commit_consumer_state(CommitMode::Sync) {
                        warn!(%err, "Failed to commit offsets before rebalance");
                    }
                }
                self.rebalanced.notify_one();
            }
            Rebalance::Error(err) => {
                warn!(%err, "Rebalance error");
            }
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, _offsets: &TopicPartitionList) {
        match result {
            Ok(()) => debug!("Committed offsets"),
            Err(err) => warn!(%err, "Failed to commit offsets"),
        }
    }
}

/// Reads the configured topics as part of a consumer group, publishing each
/// message as a [`Record`] over a capacity-1 channel (the hand-off is
/// deliberately unbuffered: it is the pipeline's only source of backpressure)
/// and committing offsets only on request from the sink.
pub struct KafkaSource {
    consumer: Arc<StreamConsumer<VortexConsumerContext>>,
    cancel: CancellationToken,
    rebalanced: Arc<Notify>,
}

/// A handle the sink uses to ask the source to commit the offsets of every
/// message handed off so far. Sending never blocks on the source's response;
/// a dropped source is treated as "there is nothing left to commit".
#[derive(Clone)]
pub struct CommitHandle {
    tx: mpsc::Sender<()>,
}

impl CommitHandle {
    /// Requests an asynchronous offset commit. Fire-and-forget, like the
    /// original's buffered non-blocking send on its commit channel.
    pub fn request_commit(&self) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(()).await;
        });
    }
}

impl KafkaSource {
    /// Builds the consumer-group client. The session timeout is mirrored into
    /// the socket read timeout (plus 5s slack) exactly as the original does,
    /// so a stalled broker connection is detected before the group coordinator
    /// would otherwise reassign the partition.
    pub fn new(config: &vortex_core::config::KafkaConfig) -> anyhow::Result<Self> {
        let session_timeout_ms = config.session_timeout_sec * 1000;
        let socket_timeout_ms = session_timeout_ms + 5_000;
        let rebalanced = Arc::new(Notify::new());

        let consumer: StreamConsumer<VortexConsumerContext> = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("group.id", &config.group_name)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", session_timeout_ms.to_string())
            .set("socket.timeout.ms", socket_timeout_ms.to_string())
            .create_with_context(VortexConsumerContext::new(Arc::clone(&rebalanced)))?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics)?;

        let consumer = Arc::new(consumer);
        consumer.context().set_consumer(&consumer);

        Ok(Self {
            consumer,
            cancel: CancellationToken::new(),
            rebalanced,
        })
    }

    /// Spawns the consume loop. Returns the inbound record stream and a handle
    /// the sink uses to request offset commits. The loop exits once the
    /// returned `CancellationToken` (see [`KafkaSource::stop`]) is cancelled or
    /// the record channel's receiver is dropped.
    pub fn run(&self) -> (mpsc::Receiver<Record>, CommitHandle) {
        let (record_tx, record_rx) = mpsc::channel(1);
        let (commit_tx, mut commit_rx) = mpsc::channel::<()>(1);

        let consumer = Arc::clone(&self.consumer);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut stream = consumer.stream();
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Source stop requested, ending consume loop");
                        break;
                    }

                    Some(()) = commit_rx.recv() => {
                        if let Err(err) = consumer.commit_consumer_state(CommitMode::Async) {
                            warn!(%err, "Failed to request offset commit");
                        }
                    }

                    message = stream.next() => {
                        let Some(message) = message else { break };
                        match message {
                            Ok(borrowed) => {
                                let record = Record {
                                    topic: borrowed.topic().to_string(),
                                    partition: borrowed.partition(),
                                    offset: borrowed.offset(),
                                    key: borrowed.key().unwrap_or_default().to_vec(),
                                    value: borrowed.payload().unwrap_or_default().to_vec(),
                                    headers: borrowed
                                        .headers()
                                        .map(|headers| {
                                            (0..headers.count())
                                                .map(|i| {
                                                    let header = headers.get(i);
                                                    (
                                                        header.key.to_string(),
                                                        header.value.unwrap_or_default().to_vec(),
                                                    )
                                                })
                                                .collect()
                                        })
                                        .unwrap_or_default(),
                                    timestamp: borrowed
                                        .timestamp()
                                        .to_millis()
                                        .and_then(|ms| chrono::DateTime::from_timestamp_millis(ms))
                                        .unwrap_or_else(chrono::Utc::now),
                                };
                                debug!(
                                    topic = %record.topic,
                                    partition = record.partition,
                                    offset = record.offset,
                                    "Consumed message"
                                );

                                crate::metrics::record_consumption(&record);

                                // Hand off to the sink before marking the offset: marking
                                // first would let this offset become committable before the
                                // record has actually reached the sink.
                                if record_tx.send(record).await.is_err() {
                                    break;
                                }

                                if let Err(err) = consumer.store_offset_from_message(&borrowed) {
                                    warn!(%err, "Failed to store offset for later commit");
                                }
                            }
                            Err(err) => {
                                warn!(%err, "Kafka error while consuming message");
                            }
                        }
                    }
                }
            }
        });

        (record_rx, CommitHandle { tx: commit_tx })
    }

    /// Waits for the next pre-rebalance revoke, the async equivalent of
    /// blocking on the original's unbuffered rebalance channel. A revoke that
    /// happens before anyone is waiting is not lost: one permit is held until
    /// the next call consumes it.
    pub async fn await_rebalance(&self) {
        self.rebalanced.notified().await;
    }

    /// Cancels the consume loop. The loop's own task drops the consumer, which
    /// triggers a final leave-group notification to the coordinator.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
