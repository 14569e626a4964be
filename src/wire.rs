//! Wire formats for the inbound task message and outbound probe messages
//! (spec.md §6).

use serde::{Deserialize, Serialize};

/// Inbound task payload, as published to `KAFKA_TOPIC_API`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConsume {
    pub id: String,
    pub url: String,
    #[serde(rename = "forwardTo")]
    pub forward_to: Vec<String>,
    #[serde(rename = "skipCrawler", default)]
    pub skip_crawler: bool,
}

/// Outbound per-shard payload, one per recognized probe topic.
#[derive(Debug, Clone, Serialize)]
pub struct TaskProduce {
    pub id: String,
    pub urls: Vec<String>,
}
