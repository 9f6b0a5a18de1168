//! Publish/subscribe over Redis Streams: `XADD` with an approximately-trimmed `MAXLEN`,
//! consumer groups via `XREADGROUP`/`XACK` for at-least-once delivery. A payload that
//! fails to parse is logged and acknowledged anyway — one bad message must never wedge
//! the stream for every other consumer in the group.

use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::Commands;
use serde::{de::DeserializeOwned, Serialize};

use crate::config::RedisConfig;
use crate::events::schemas::{
    AnprRequest, AnprResult, DetectionEvent, EventTopics, PtzCommandEvent, PtzStatusEvent,
    SystemEvent, TrackingEvent,
};

pub struct MessageBus {
    client: redis::Client,
    stream_max_len: usize,
}

impl MessageBus {
    pub fn connect(cfg: &RedisConfig) -> redis::RedisResult<Self> {
        let url = match &cfg.password {
            Some(pw) => format!("redis://:{}@{}:{}", pw, cfg.host, cfg.port),
            None => format!("redis://{}:{}", cfg.host, cfg.port),
        };
        let client = redis::Client::open(url)?;
        Ok(Self { client, stream_max_len: cfg.stream_max_len })
    }

    pub fn publish<T: Serialize>(&self, topic: &str, event: &T) -> redis::RedisResult<String> {
        let mut conn = self.client.get_connection()?;
        let payload = serde_json::to_string(event).expect("event payloads always serialize");
        conn.xadd_maxlen(
            topic,
            redis::streams::StreamMaxlen::Approx(self.stream_max_len),
            "*",
            &[("data", payload)],
        )
    }

    /// Idempotent: `BUSYGROUP` (the group already exists) is swallowed.
    pub fn ensure_group(&self, topic: &str, group: &str) -> redis::RedisResult<()> {
        let mut conn = self.client.get_connection()?;
        let result: redis::RedisResult<()> = conn.xgroup_create_mkstream(topic, group, "0");
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.to_string().contains("BUSYGROUP") => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Blocks up to `block_ms` waiting for up to `count` messages, hands each decoded
    /// payload to `handler`, then acknowledges it regardless of whether `handler`
    /// accepted or rejected it — the acknowledgment is what keeps a poison-pill message
    /// from being redelivered forever.
    pub fn subscribe<T, F>(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        block_ms: usize,
        count: usize,
        mut handler: F,
    ) -> redis::RedisResult<()>
    where
        T: DeserializeOwned,
        F: FnMut(T),
    {
        let mut conn = self.client.get_connection()?;
        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .block(block_ms)
            .count(count);
        let reply: StreamReadReply = conn.xread_options(&[topic], &[">"], &opts)?;

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                if let Some(redis::Value::BulkString(raw)) = entry.map.get("data") {
                    match serde_json::from_slice::<T>(raw) {
                        Ok(decoded) => handler(decoded),
                        Err(err) => {
                            tracing::warn!(id = %entry.id, %err, "bad event payload, acknowledging anyway");
                        }
                    }
                } else {
                    tracing::warn!(id = %entry.id, "event entry missing data field, acknowledging anyway");
                }
                let _: redis::RedisResult<i64> = conn.xack(topic, group, &[&entry.id]);
            }
        }
        Ok(())
    }

    pub fn trim(&self, topic: &str) -> redis::RedisResult<()> {
        let mut conn = self.client.get_connection()?;
        let _: i64 = conn.xtrim(topic, redis::streams::StreamMaxlen::Approx(self.stream_max_len))?;
        Ok(())
    }
}

/// Everything the pipeline's blocking worker thread ever hands to the bus. Kept as one
/// enum so a single `flume` channel can carry all topics across the blocking/async
/// boundary without the worker thread ever touching a Redis connection itself.
#[derive(Debug, Clone)]
pub enum BusEvent {
    Detection(DetectionEvent),
    Tracking(TrackingEvent),
    PtzCommand(PtzCommandEvent),
    PtzStatus(PtzStatusEvent),
    AnprRequest(AnprRequest),
    System(SystemEvent),
}

impl BusEvent {
    fn topic(&self) -> &'static str {
        match self {
            BusEvent::Detection(_) => EventTopics::DETECTIONS,
            BusEvent::Tracking(_) => EventTopics::TRACKING,
            BusEvent::PtzCommand(_) => EventTopics::PTZ_COMMANDS,
            BusEvent::PtzStatus(_) => EventTopics::PTZ_STATUS,
            BusEvent::AnprRequest(_) => EventTopics::ANPR_REQUESTS,
            BusEvent::System(_) => EventTopics::SYSTEM,
        }
    }

    fn publish_with(&self, bus: &MessageBus) -> redis::RedisResult<String> {
        match self {
            BusEvent::Detection(e) => bus.publish(self.topic(), e),
            BusEvent::Tracking(e) => bus.publish(self.topic(), e),
            BusEvent::PtzCommand(e) => bus.publish(self.topic(), e),
            BusEvent::PtzStatus(e) => bus.publish(self.topic(), e),
            BusEvent::AnprRequest(e) => bus.publish(self.topic(), e),
            BusEvent::System(e) => bus.publish(self.topic(), e),
        }
    }
}

/// Drains `rx` on a dedicated thread, publishing each event to Redis. Lives on its own
/// thread rather than a tokio task because the bus's Redis calls are synchronous — this
/// keeps blocking I/O off the async runtime entirely, mirroring how the capture thread
/// is kept off it too.
pub fn spawn_publisher(
    bus: MessageBus,
    rx: flume::Receiver<BusEvent>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            if let Err(err) = event.publish_with(&bus) {
                tracing::warn!(%err, "failed to publish event");
            }
        }
    })
}
