//! Process-wide configuration (C8, ambient). Loaded once from the
//! environment (optionally seeded by a `.env` file, mirroring the original
//! Go binary's `pathToEnvFile = ".env"` convention) with the defaults from
//! spec.md §6. An unparseable numeric value falls back to its default and is
//! logged as a warning rather than failing startup.

use std::time::Duration;

use crate::error::Log;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub kafka_url: String,
    pub kafka_topic_api: String,
    pub default_timeout: Duration,
    pub num_threads: usize,
    pub max_depth: u8,
    pub grpc_addr: String,
}

impl AppConfig {
    pub async fn load() -> Self {
        // Absence of a `.env` file is expected in containerized deployments.
        let _ = dotenvy::dotenv();

        Self {
            kafka_url: env_or("KAFKA_URL", "localhost:9092"),
            kafka_topic_api: env_or("KAFKA_TOPIC_API", "API-Service-Message"),
            default_timeout: Duration::from_secs(env_parsed_or("CRAWLER_DEFAULT_TIMEOUT", 60).await),
            num_threads: env_parsed_or("CRAWLER_NUM_OF_THREADS", 50).await,
            max_depth: env_parsed_or("CRAWLER_MAX_DEPTH", 5).await,
            grpc_addr: env_or("GRPC_ADDR", ":9090"),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

async fn env_parsed_or<T: std::str::FromStr + std::fmt::Display + Copy>(name: &str, default: T) -> T {
    let Ok(raw) = std::env::var(name) else {
        return default;
    };

    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            let _ = format!("Invalid value for {name}: {raw:?}, falling back to default {default}")
                .log("[WARN]")
                .await;
            default
        }
    }
}
