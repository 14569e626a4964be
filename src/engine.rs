//! Crawl engine (C4) — the core of this worker.
//!
//! A dynamically-sized worker pool performs a breadth-first traversal of a
//! single host: bounded concurrency via a semaphore, dedup via an atomic
//! claim on the result map, a depth cap, and cooperative cancellation via a
//! `CancellationToken`. See spec.md §4.C4 for the full contract this module
//! implements.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use scraper::{Html, Selector};
use tokio::sync::{Notify, OnceCell, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Res, ResExt};
use crate::extract::extract_links;
use crate::fetch::HttpFetcher;
use crate::model::{HAS_FORM, HAS_QUERY, HAS_STATUS_ERROR, Link, NUM_FEATURES, Response};

/// Concurrency used when `set_concurrency` is never called, mirroring the
/// original's single-slot channel before `SetNumberOfThreads` runs.
const DEFAULT_CONCURRENCY: usize = 1;

/// A minimal async wait-group: `add`/`done`/`wait`, the Rust analogue of
/// `sync.WaitGroup` in the original source.
struct WaitGroup {
    count: AtomicI64,
    notify: Notify,
}

impl WaitGroup {
    fn new() -> Self {
        Self { count: AtomicI64::new(0), notify: Notify::new() }
    }

    fn add(&self, n: i64) {
        self.count.fetch_add(n, Ordering::SeqCst);
    }

    fn done(&self) {
        let prev = self.count.fetch_sub(1, Ordering::SeqCst);
        if prev <= 1 {
            self.notify.notify_waiters();
        }
    }

    async fn wait(&self) {
        loop {
            // Register for notification *before* checking the counter, so a
            // `done()` landing between the check and the wait can't be missed.
            let notified = self.notify.notified();
            if self.count.load(Ordering::SeqCst) <= 0 {
                return;
            }
            notified.await;
        }
    }
}

struct EngineInner {
    seed_url: Url,
    seed_host: String,
    cancel: CancellationToken,
    fetcher: Arc<dyn HttpFetcher>,
    anchor_selector: Selector,
    form_selector: Selector,
    max_depth: OnceCell<u8>,
    semaphore: OnceCell<Arc<Semaphore>>,
    results: DashMap<String, Response>,
    wait_group: WaitGroup,
}

impl EngineInner {
    /// Admission rules 1–2 and 4 of spec.md §4.C4 (cancelled, out-of-scope,
    /// depth exceeded). Rule 3 ("already claimed") is enforced atomically at
    /// the claim step via the result map's entry API, not here.
    fn admit(&self, link: &Link) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if !self.in_scope(&link.url) {
            return false;
        }
        let max_depth = *self.max_depth.get().unwrap_or(&0);
        link.depth <= max_depth
    }

    /// Case-sensitive substring match of the seed host within the candidate
    /// URL. Deliberately permissive (accepts subdomains and path-prefixed
    /// equivalents) — see spec.md §9 "Host-scope predicate" and DESIGN.md.
    fn in_scope(&self, url: &str) -> bool {
        !self.seed_host.is_empty() && url.contains(&self.seed_host)
    }

    async fn semaphore(&self) -> Arc<Semaphore> {
        self.semaphore
            .get_or_init(|| async { Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)) })
            .await
            .clone()
    }

    /// Blocks until a slot is free or cancellation fires. `None` on
    /// cancellation, so callers can bail out immediately.
    async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let semaphore = self.semaphore().await;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = semaphore.acquire_owned() => permit.ok(),
        }
    }
}

/// The public C4 contract: `new`, `set_concurrency`, `set_max_depth`,
/// `submit`, `join` (spec's `await`, renamed to dodge the `await` keyword),
/// and `results`.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(cancel: CancellationToken, seed_url: &str, fetcher: Arc<dyn HttpFetcher>) -> Res<Self> {
        let parsed = Url::parse(seed_url).context("Failed to parse seed URL")?;
        let seed_host = parsed.host_str().unwrap_or_default().to_string();

        let anchor_selector = Selector::parse("a[href]")
            .context("Failed to parse selector for anchor tags")?;
        let form_selector = Selector::parse("form")
            .context("Failed to parse selector for form tags")?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                seed_url: parsed,
                seed_host,
                cancel,
                fetcher,
                anchor_selector,
                form_selector,
                max_depth: OnceCell::new(),
                semaphore: OnceCell::new(),
                results: DashMap::new(),
                wait_group: WaitGroup::new(),
            }),
        })
    }

    /// Must be called before any `submit`; a no-op once work has started.
    pub fn set_concurrency(&self, n: usize) {
        let _ = self.inner.semaphore.set(Arc::new(Semaphore::new(n.max(1))));
    }

    /// Must be called before any `submit`; a no-op once work has started.
    pub fn set_max_depth(&self, depth: u8) {
        let _ = self.inner.max_depth.set(depth);
    }

    /// Enqueues a single link for exploration. Safe to call from outside;
    /// recursive internal submissions go through the same admission path.
    pub fn submit(&self, link: Link) {
        self.inner.wait_group.add(1);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { run_unit(inner, link).await });
    }

    /// Blocks until the engine is quiescent. The result map is stable once
    /// this returns; the engine must not be reused afterward.
    pub async fn join(&self) {
        self.inner.wait_group.wait().await;
        if let Some(sem) = self.inner.semaphore.get() {
            sem.close();
        }
    }

    pub fn results(&self) -> &DashMap<String, Response> {
        &self.inner.results
    }
}

async fn run_unit(inner: Arc<EngineInner>, link: Link) {
    let Some(permit) = inner.acquire().await else {
        inner.wait_group.done();
        return;
    };
    explore_link(inner, link, permit).await;
}

async fn explore_link(inner: Arc<EngineInner>, link: Link, permit: OwnedSemaphorePermit) {
    if !inner.admit(&link) {
        drop(permit);
        inner.wait_group.done();
        return;
    }

    match inner.results.entry(link.url.clone()) {
        Entry::Occupied(_) => {
            drop(permit);
            inner.wait_group.done();
            return;
        }
        Entry::Vacant(v) => {
            v.insert(Response::placeholder(link.clone()));
        }
    }

    let fetched = inner.fetcher.fetch(&link.url).await;
    let (status, text) = match fetched {
        Ok(pair) => pair,
        Err(_) => {
            inner.results.remove(&link.url);
            drop(permit);
            inner.wait_group.done();
            return;
        }
    };

    let mut features = [false; NUM_FEATURES];
    features[HAS_QUERY] = url_has_query(&link.url);
    features[HAS_STATUS_ERROR] = status >= 500;

    if status == 200 {
        let parsed = Html::parse_document(&text);
        features[HAS_FORM] = parsed.select(&inner.form_selector).next().is_some();
    }

    inner.results.insert(
        link.url.clone(),
        Response { link: link.clone(), status_code: status, body: Some(text.clone()), features },
    );

    // Increment before spawning (the open-question correction from spec.md
    // §9: the original incremented the wait group *after* spawning the
    // child-enqueue goroutine, a narrow race window).
    inner.wait_group.add(1);
    let child_inner = Arc::clone(&inner);
    let parent = link.clone();
    tokio::spawn(async move { extract_and_enqueue(child_inner, parent, text).await });

    drop(permit);
    inner.wait_group.done();
}

/// The child-enqueue unit: extracts links from the just-fetched body, clears
/// the body from the result map, then submits each in-scope child —
/// blocking on the semaphore per candidate so backpressure flows from the
/// concurrency cap, per spec.md §4.C4's scheduling model.
async fn extract_and_enqueue(inner: Arc<EngineInner>, parent: Link, body: String) {
    let doc = Html::parse_document(&body);
    let children = extract_links(&doc, &parent, &inner.seed_url, &inner.anchor_selector, &inner.cancel);

    if let Some(mut response) = inner.results.get_mut(&parent.url) {
        response.clear_body();
    }

    for child in children {
        if inner.cancel.is_cancelled() {
            break;
        }

        let Some(permit) = inner.acquire().await else {
            break;
        };

        inner.wait_group.add(1);
        let child_inner = Arc::clone(&inner);
        tokio::spawn(async move { explore_link(child_inner, child, permit).await });
    }

    inner.wait_group.done();
}

fn url_has_query(raw: &str) -> bool {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.query().map(|q| !q.is_empty()))
        .unwrap_or(false)
}
