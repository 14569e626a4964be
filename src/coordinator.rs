//! Task coordinator (C6): drives one crawl per inbound task and fans the
//! classified result out to the bus and the RPC sink.
//!
//! Grounded on `cmd/app/main.go`'s `ExecuteNextTask` loop shape and
//! `cmd/app/config.go`'s env-configured engine construction.

use std::collections::HashMap;
use std::sync::Arc;

use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::adapters::bus::{InboundQueue, OutboundQueue, ProducedMessage};
use crate::adapters::rpc::RpcSink;
use crate::classifier::{self, PROBE_5XX};
use crate::config::AppConfig;
use crate::engine::Engine;
use crate::error::{Log, Res, ResExt};
use crate::fetch::HttpFetcher;
use crate::model::NUM_FEATURES;

pub struct Coordinator {
    config: AppConfig,
    fetcher: Arc<dyn HttpFetcher>,
    inbound: Box<dyn InboundQueue>,
    outbound: HashMap<String, Box<dyn OutboundQueue>>,
    rpc: Box<dyn RpcSink>,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(
        config: AppConfig,
        fetcher: Arc<dyn HttpFetcher>,
        inbound: Box<dyn InboundQueue>,
        outbound: HashMap<String, Box<dyn OutboundQueue>>,
        rpc: Box<dyn RpcSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self { config, fetcher, inbound, outbound, rpc, cancel }
    }

    /// Runs one iteration: fetch, crawl, classify, dispatch, acknowledge.
    /// Errors from the inbound fetch itself (not individual publishes) are
    /// returned so the caller can decide whether to keep looping.
    pub async fn execute_next_task(&mut self) -> Res<()> {
        let message = self.inbound.fetch_one(self.cancel.clone()).await?;
        let task = &message.value;

        if Url::parse(&task.url).is_err() {
            format!("Skipping task {}: malformed URL {}", task.id, task.url).log("[WARN]").await?;
            return Ok(());
        }

        let task_cancel = self.cancel.child_token();
        let engine = Engine::new(task_cancel.clone(), &task.url, Arc::clone(&self.fetcher))
            .with_context(|| format!("Failed to build crawl engine for task {}", task.id))?;

        engine.set_concurrency(self.config.num_threads);
        engine.set_max_depth(if task.skip_crawler { 0 } else { self.config.max_depth });

        let deadline = tokio::spawn({
            let task_cancel = task_cancel.clone();
            let timeout = self.config.default_timeout;
            async move {
                tokio::time::sleep(timeout).await;
                task_cancel.cancel();
            }
        });

        engine.submit(crate::model::Link::seed(task.url.clone()));
        engine.join().await;
        deadline.abort();

        if task.skip_crawler {
            for mut entry in engine.results().iter_mut() {
                entry.features = [true; NUM_FEATURES];
            }
        }

        let classified = classifier::classify(engine.results(), &task.forward_to);

        for (probe, urls) in classified.shards {
            let Some(queue) = self.outbound.get_mut(&probe) else {
                format!("No outbound queue configured for probe {probe}, dropping shard for task {}", task.id)
                    .log("[WARN]")
                    .await?;
                continue;
            };

            let produced = ProducedMessage::new(task.id.clone(), urls);
            if let Err(err) = queue.publish(produced).await {
                format!(
                    "{} Failed to publish shard for probe {} on task {}: {}",
                    "[WARN]:".yellow(),
                    probe,
                    task.id,
                    err
                )
                .log("[WARN]")
                .await?;
            }
        }

        if task.forward_to.iter().any(|p| p == PROBE_5XX) && !classified.error_responses.is_empty() {
            if let Err(err) = self.rpc.push_5xx(&task.id, &classified.error_responses).await {
                format!("Failed to push 5xx report for task {}: {}", task.id, err).log("[WARN]").await?;
            }
        }

        self.inbound.commit(&message).await
    }

    /// Closes every adapter on the way out. Per spec.md §7's "logged only"
    /// taxonomy, a close failure on any single adapter does not stop the
    /// others from being closed, and none of them fail the shutdown itself —
    /// only a failure to log propagates.
    pub async fn shutdown(mut self) -> Res<()> {
        if let Err(err) = self.inbound.close().await {
            format!("Failed to close inbound queue at shutdown: {err}").log("[WARN]").await?;
        }

        for (probe, mut queue) in self.outbound.drain() {
            if let Err(err) = queue.close().await {
                format!("Failed to close outbound queue for probe {probe} at shutdown: {err}")
                    .log("[WARN]")
                    .await?;
            }
        }

        if let Err(err) = self.rpc.close().await {
            format!("Failed to close RPC sink at shutdown: {err}").log("[WARN]").await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::adapters::bus::test_support::{StubInboundQueue, StubOutboundQueue};
    use crate::adapters::rpc::test_support::StubRpcSink;
    use crate::fetch::test_support::StubFetcher;
    use crate::wire::TaskConsume;

    fn config() -> AppConfig {
        AppConfig {
            kafka_url: "unused".to_string(),
            kafka_topic_api: "unused".to_string(),
            default_timeout: Duration::from_secs(5),
            num_threads: 4,
            max_depth: 5,
            grpc_addr: "unused".to_string(),
        }
    }

    fn task(id: &str, url: &str, forward_to: &[&str], skip_crawler: bool) -> TaskConsume {
        TaskConsume {
            id: id.to_string(),
            url: url.to_string(),
            forward_to: forward_to.iter().map(|s| s.to_string()).collect(),
            skip_crawler,
        }
    }

    #[tokio::test]
    async fn s2_publishes_shards_and_commits() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .with_page("https://ex/", 200, "<form></form><a href='/q?x=1'>q</a>")
                .with_page("https://ex/q?x=1", 200, "<html></html>"),
        );

        let inbound = Box::new(StubInboundQueue::new(vec![task(
            "t1",
            "https://ex/",
            &["SQLI", "XSS", "LFI"],
            false,
        )]));

        let mut outbound: HashMap<String, Box<dyn OutboundQueue>> = HashMap::new();
        outbound.insert("SQLI".to_string(), Box::new(StubOutboundQueue::default()));
        outbound.insert("XSS".to_string(), Box::new(StubOutboundQueue::default()));
        outbound.insert("LFI".to_string(), Box::new(StubOutboundQueue::default()));

        let rpc = Box::new(StubRpcSink::default());

        let mut coordinator =
            Coordinator::new(config(), fetcher, inbound, outbound, rpc, CancellationToken::new());

        coordinator.execute_next_task().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_url_is_skipped_without_committing() {
        let fetcher = Arc::new(StubFetcher::new());
        let inbound_stub = StubInboundQueue::new(vec![task("t1", "not a url", &["SQLI"], false)]);
        let committed = Arc::clone(&inbound_stub.committed);
        let inbound = Box::new(inbound_stub);
        let outbound = HashMap::new();
        let rpc = Box::new(StubRpcSink::default());

        let mut coordinator =
            Coordinator::new(config(), fetcher, inbound, outbound, rpc, CancellationToken::new());

        coordinator.execute_next_task().await.unwrap();

        assert!(committed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn s3_pushes_5xx_over_rpc() {
        let fetcher = Arc::new(StubFetcher::new().with_page("https://ex/", 503, ""));
        let inbound = Box::new(StubInboundQueue::new(vec![task("t1", "https://ex/", &["5XX"], false)]));
        let outbound = HashMap::new();
        let rpc_stub = StubRpcSink::default();
        let pushed = Arc::clone(&rpc_stub.pushed);
        let rpc = Box::new(rpc_stub);

        let mut coordinator =
            Coordinator::new(config(), fetcher, inbound, outbound, rpc, CancellationToken::new());

        coordinator.execute_next_task().await.unwrap();

        let pushed = pushed.lock().unwrap();
        assert_eq!(pushed.as_slice(), &[("t1".to_string(), 1)]);
    }

    #[tokio::test]
    async fn s6_skip_crawler_forces_every_feature_true() {
        let fetcher = Arc::new(StubFetcher::new().with_page("https://ex/", 200, "<html></html>"));
        let inbound = Box::new(StubInboundQueue::new(vec![task(
            "t1",
            "https://ex/",
            &["SQLI", "XSS", "LFI"],
            true,
        )]));

        let mut outbound: HashMap<String, Box<dyn OutboundQueue>> = HashMap::new();
        outbound.insert("SQLI".to_string(), Box::new(StubOutboundQueue::default()));
        outbound.insert("XSS".to_string(), Box::new(StubOutboundQueue::default()));
        outbound.insert("LFI".to_string(), Box::new(StubOutboundQueue::default()));

        let rpc = Box::new(StubRpcSink::default());

        let mut coordinator =
            Coordinator::new(config(), fetcher, inbound, outbound, rpc, CancellationToken::new());

        coordinator.execute_next_task().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_every_adapter() {
        let fetcher = Arc::new(StubFetcher::new());
        let inbound_stub = StubInboundQueue::new(vec![]);
        let inbound_closed = Arc::clone(&inbound_stub.closed);
        let inbound = Box::new(inbound_stub);

        let sqli_stub = StubOutboundQueue::default();
        let sqli_closed = Arc::clone(&sqli_stub.closed);
        let xss_stub = StubOutboundQueue::default();
        let xss_closed = Arc::clone(&xss_stub.closed);

        let mut outbound: HashMap<String, Box<dyn OutboundQueue>> = HashMap::new();
        outbound.insert("SQLI".to_string(), Box::new(sqli_stub));
        outbound.insert("XSS".to_string(), Box::new(xss_stub));

        let rpc_stub = StubRpcSink::default();
        let rpc_closed = Arc::clone(&rpc_stub.closed);
        let rpc = Box::new(rpc_stub);

        let coordinator = Coordinator::new(config(), fetcher, inbound, outbound, rpc, CancellationToken::new());

        coordinator.shutdown().await.unwrap();

        assert!(*inbound_closed.lock().unwrap());
        assert!(*sqli_closed.lock().unwrap());
        assert!(*xss_closed.lock().unwrap());
        assert!(*rpc_closed.lock().unwrap());
    }
}
