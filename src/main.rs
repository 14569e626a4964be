/*!
**A same-host crawl worker**

Consumes crawl tasks from a Kafka topic, explores every reachable URL beneath
each task's seed under a configurable depth and concurrency cap, classifies
the fetched pages against a fixed set of vulnerability-probe feature masks,
and forwards the resulting URL shards to per-probe Kafka topics (5xx findings
go out over gRPC instead).

## Configuration

All configuration is environment-driven (optionally seeded by a `.env`
file) — see [`config::AppConfig`] for the full list of variables and
defaults.

## Logging

Set `LOG_FILE` to redirect structured logs to a file; otherwise warnings and
fatal errors go to stderr.

## Shutdown

SIGINT/SIGTERM cancel the top-level context. The in-flight task is allowed to
reach its per-task deadline or quiescence, whichever comes first, then every
adapter is closed before the process exits.
*/

use std::collections::HashMap;
use std::sync::Arc;

use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

mod adapters;
mod classifier;
mod config;
mod coordinator;
mod engine;
mod error;
mod extract;
mod fetch;
mod model;
mod wire;

use adapters::bus::{KafkaInboundQueue, KafkaOutboundQueue, OutboundQueue};
use adapters::rpc::GrpcRpcSink;
use config::AppConfig;
use coordinator::Coordinator;
use error::{Log, Res, ResExt};
use fetch::ReqwestFetcher;

/// Probe topics the coordinator publishes URL shards to over the bus. `5XX`
/// is excluded: it is delivered over RPC instead (spec.md §6).
const BUS_PROBES: &[&str] = &["SQLI", "BA", "XSS", "LFI"];

fn shutdown_signal() -> CancellationToken {
    let cancel = CancellationToken::new();

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sig) => sig,
                Err(_) => return,
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }

            cancel.cancel();
        });
    }

    #[cfg(not(unix))]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        });
    }

    cancel
}

async fn run() -> Res<()> {
    let log_file = std::env::var("LOG_FILE").ok().map(std::path::PathBuf::from);
    let _ = error::LOG_FILE_PATH.set(log_file);

    let config = AppConfig::load().await;

    let cancel = shutdown_signal();

    let fetcher: Arc<dyn fetch::HttpFetcher> =
        Arc::new(ReqwestFetcher::new(fetch::DEFAULT_FETCH_TIMEOUT).context("Failed to build HTTP client")?);

    let inbound = Box::new(
        KafkaInboundQueue::new(&config.kafka_url, &config.kafka_topic_api)
            .context("Failed to build inbound Kafka queue")?,
    );

    let mut outbound: HashMap<String, Box<dyn OutboundQueue>> = HashMap::new();
    for probe in BUS_PROBES {
        let queue = KafkaOutboundQueue::new(&config.kafka_url, probe)
            .with_context(|| format!("Failed to build outbound Kafka queue for probe {probe}"))?;
        outbound.insert(probe.to_string(), Box::new(queue));
    }

    let rpc = Box::new(
        GrpcRpcSink::connect(config.grpc_addr.clone())
            .await
            .context("Failed to connect to report RPC service")?,
    );

    let mut coordinator = Coordinator::new(config, fetcher, inbound, outbound, rpc, cancel.clone());

    loop {
        if let Err(err) = coordinator.execute_next_task().await {
            // A cancelled fetch during shutdown is expected, not a failure
            // (spec.md §7): don't warn about it.
            if !cancel.is_cancelled() {
                format!("{} {}", "[WARN]:".yellow(), err).log("[WARN]").await?;
            }
        }

        if cancel.is_cancelled() {
            String::from("Exiting on termination signal").log("[INFO]").await?;
            break;
        }
    }

    coordinator.shutdown().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    match run().await {
        Ok(_) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "FATAL:".red().bold(), e);
            std::process::ExitCode::FAILURE
        }
    }
}
