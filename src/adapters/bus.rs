//! Inbound/outbound message bus adapters (C7), backed by `rdkafka`.
//!
//! Grounded on `internal/pubsub/{consumer,producer}.go` of the original
//! source: one `StreamConsumer` for the inbound task topic, and one
//! `FutureProducer` per outbound probe topic (mirroring
//! `Producers map[string]*pubsub.Producer`).

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::Message as _;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::util::Timeout;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Res, ResExt};
use crate::wire::{TaskConsume, TaskProduce};

/// Opaque handle threaded back into `commit` — the topic/partition/offset
/// coordinate of a received message. Callers never interpret it directly.
#[derive(Debug, Clone)]
pub struct OffsetHandle {
    topic: String,
    partition: i32,
    offset: i64,
}

#[derive(Debug, Clone)]
pub struct ConsumedMessage {
    pub key: String,
    pub value: TaskConsume,
    pub time: OffsetDateTime,
    pub origin: OffsetHandle,
}

#[derive(Debug, Clone)]
pub struct ProducedMessage {
    pub key: String,
    pub value: TaskProduce,
    pub time: OffsetDateTime,
}

impl ProducedMessage {
    pub fn new(task_id: String, urls: Vec<String>) -> Self {
        Self {
            key: Uuid::new_v4().to_string(),
            value: TaskProduce { id: task_id, urls },
            time: OffsetDateTime::now_utc(),
        }
    }
}

#[async_trait]
pub trait InboundQueue: Send + Sync {
    async fn fetch_one(&mut self, cancel: CancellationToken) -> Res<ConsumedMessage>;
    async fn commit(&mut self, message: &ConsumedMessage) -> Res<()>;
    async fn close(&mut self) -> Res<()>;
}

#[async_trait]
pub trait OutboundQueue: Send + Sync {
    async fn publish(&mut self, message: ProducedMessage) -> Res<()>;
    async fn close(&mut self) -> Res<()>;
}

pub struct KafkaInboundQueue {
    consumer: StreamConsumer,
}

impl KafkaInboundQueue {
    pub fn new(brokers: &str, topic: &str) -> Res<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", "crawl-worker")
            .set("enable.auto.commit", "false")
            .set("fetch.min.bytes", "10000")
            .create()
            .context("Failed to build Kafka consumer")?;

        consumer.subscribe(&[topic]).context("Failed to subscribe to inbound topic")?;

        Ok(Self { consumer })
    }
}

#[async_trait]
impl InboundQueue for KafkaInboundQueue {
    async fn fetch_one(&mut self, cancel: CancellationToken) -> Res<ConsumedMessage> {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(std::io::Error::other("exit on context done")).context("inbound fetch cancelled");
            }
            received = self.consumer.recv() => received.context("Failed to fetch inbound message")?,
        };

        let payload = msg.payload().unwrap_or_default();
        let value: TaskConsume = serde_json::from_slice(payload).context("Failed to decode task payload")?;

        Ok(ConsumedMessage {
            key: msg.key().map(String::from_utf8_lossy).map(|c| c.into_owned()).unwrap_or_default(),
            value,
            time: OffsetDateTime::now_utc(),
            origin: OffsetHandle {
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
            },
        })
    }

    async fn commit(&mut self, message: &ConsumedMessage) -> Res<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.origin.topic,
            message.origin.partition,
            rdkafka::Offset::Offset(message.origin.offset + 1),
        )
        .context("Failed to build offset commit list")?;

        self.consumer.commit(&tpl, CommitMode::Async).context("Failed to commit inbound offset")
    }

    async fn close(&mut self) -> Res<()> {
        self.consumer.unsubscribe();
        Ok(())
    }
}

pub struct KafkaOutboundQueue {
    producer: FutureProducer,
    topic: String,
}

impl KafkaOutboundQueue {
    pub fn new(brokers: &str, topic: &str) -> Res<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .create()
            .context("Failed to build Kafka producer")?;

        Ok(Self { producer, topic: topic.to_string() })
    }
}

#[async_trait]
impl OutboundQueue for KafkaOutboundQueue {
    async fn publish(&mut self, message: ProducedMessage) -> Res<()> {
        let payload = serde_json::to_vec(&message.value).context("Failed to encode probe shard")?;

        let record = FutureRecord::to(&self.topic).key(&message.key).payload(&payload);

        self.producer
            .send(record, Timeout::Never)
            .await
            .map_err(|(err, _)| err)
            .context("Failed to publish probe shard")
    }

    async fn close(&mut self) -> Res<()> {
        self.producer
            .flush(Timeout::After(Duration::from_secs(5)))
            .context("Failed to flush Kafka producer on close")
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Hand-rolled stub in the teacher's style, mirroring the original
    /// suite's `kafkaReaderStub`/`kafkaWriterStub`. `committed` is shared
    /// behind an `Arc<Mutex<..>>` so a test can keep a handle to it after the
    /// stub is boxed and moved into a `Coordinator`.
    pub struct StubInboundQueue {
        pub pending: VecDeque<TaskConsume>,
        pub committed: Arc<Mutex<Vec<String>>>,
        pub closed: Arc<Mutex<bool>>,
    }

    impl StubInboundQueue {
        pub fn new(tasks: Vec<TaskConsume>) -> Self {
            Self {
                pending: tasks.into(),
                committed: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(Mutex::new(false)),
            }
        }
    }

    #[async_trait]
    impl InboundQueue for StubInboundQueue {
        async fn fetch_one(&mut self, _cancel: CancellationToken) -> Res<ConsumedMessage> {
            let value = self
                .pending
                .pop_front()
                .ok_or_else(|| std::io::Error::other("no more stub tasks"))
                .context("stub queue exhausted")?;

            let id = value.id.clone();
            Ok(ConsumedMessage {
                key: id.clone(),
                value,
                time: OffsetDateTime::now_utc(),
                origin: OffsetHandle { topic: "stub".to_string(), partition: 0, offset: 0 },
            })
        }

        async fn commit(&mut self, message: &ConsumedMessage) -> Res<()> {
            self.committed.lock().unwrap().push(message.value.id.clone());
            Ok(())
        }

        async fn close(&mut self) -> Res<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct StubOutboundQueue {
        pub published: Vec<ProducedMessage>,
        pub closed: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl OutboundQueue for StubOutboundQueue {
        async fn publish(&mut self, message: ProducedMessage) -> Res<()> {
            self.published.push(message);
            Ok(())
        }

        async fn close(&mut self) -> Res<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }
}
