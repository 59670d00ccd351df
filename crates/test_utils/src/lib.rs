//! Test helpers shared by the quarry crates' tests.

use quarry_api::{
    BlockedFetch, DataSource, PerformFetch, QuarryError, Request, RequestId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Install a tracing subscriber for test runs.
///
/// Defaults to DEBUG so the evaluator's per-round output is visible,
/// routed through the test writer so `cargo test` captures it per
/// test; `RUST_LOG` overrides the level. Safe to call from every test,
/// only the first install wins.
pub fn enable_tracing() {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(
            tracing::level_filters::LevelFilter::DEBUG.into(),
        )
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A namespaced string request answered with a string value.
///
/// The namespace keeps identifiers of different fixture sources from
/// colliding in the run's cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequest {
    namespace: String,
    key: String,
}

impl KeyRequest {
    /// Construct a request for `key` in `namespace`.
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    /// The bare key, without the namespace.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Request for KeyRequest {
    type Value = String;

    fn identifier(&self) -> RequestId {
        format!("{}/{}", self.namespace, self.key).into()
    }
}

/// How a [RecordingSource] schedules its answers.
#[derive(Debug, Clone, Copy)]
pub enum AnswerMode {
    /// Fill cells inline on the evaluator thread.
    Sync,
    /// Fill cells from one async task per batch, after `delay`.
    Async {
        /// Sleep before answering, to make task overlap observable.
        delay: Duration,
    },
}

/// A fixture-backed source that records every batch it is invoked with.
///
/// Keys present in the fixture map are answered with their value; keys
/// without a fixture fail their cell.
#[derive(Debug)]
pub struct RecordingSource {
    name: String,
    mode: AnswerMode,
    fixtures: HashMap<String, String>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    spans: Arc<Mutex<Vec<(Instant, Instant)>>>,
}

impl RecordingSource {
    /// A source named `name` that answers inline.
    pub fn sync(name: impl Into<String>) -> Self {
        Self::new(name, AnswerMode::Sync)
    }

    /// A source named `name` that answers from an async task after
    /// `delay`.
    pub fn delayed(name: impl Into<String>, delay: Duration) -> Self {
        Self::new(name, AnswerMode::Async { delay })
    }

    fn new(name: impl Into<String>, mode: AnswerMode) -> Self {
        Self {
            name: name.into(),
            mode,
            fixtures: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            spans: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a `key -> value` fixture.
    pub fn with_fixture(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.fixtures.insert(key.into(), value.into());
        self
    }

    /// A request for `key` in this source's namespace (its name).
    pub fn request(&self, key: impl Into<String>) -> KeyRequest {
        KeyRequest::new(self.name.clone(), key)
    }

    /// Batches this source has been invoked with, in invocation order;
    /// each batch lists the bare keys it contained.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of batch-handler invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Total times `key` was seen, across all batches.
    pub fn times_seen(&self, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .filter(|seen| *seen == key)
            .count()
    }

    /// Active intervals of completed async answer tasks.
    pub fn spans(&self) -> Vec<(Instant, Instant)> {
        self.spans.lock().unwrap().clone()
    }
}

impl DataSource for RecordingSource {
    type Request = KeyRequest;

    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, batch: Vec<BlockedFetch<KeyRequest>>) -> Vec<PerformFetch> {
        self.calls.lock().unwrap().push(
            batch
                .iter()
                .map(|fetch| fetch.request().key().to_string())
                .collect(),
        );

        let answers: Vec<_> = batch
            .into_iter()
            .map(|fetch| {
                let value = self.fixtures.get(fetch.request().key()).cloned();
                (fetch, value)
            })
            .collect();

        match self.mode {
            AnswerMode::Sync => {
                vec![PerformFetch::Sync(Box::new(move || answer_all(answers)))]
            }
            AnswerMode::Async { delay } => {
                let spans = self.spans.clone();
                vec![PerformFetch::Async(Box::pin(async move {
                    let start = Instant::now();
                    tokio::time::sleep(delay).await;
                    answer_all(answers);
                    spans.lock().unwrap().push((start, Instant::now()));
                }))]
            }
        }
    }
}

fn answer_all(answers: Vec<(BlockedFetch<KeyRequest>, Option<String>)>) {
    for (fetch, value) in answers {
        match value {
            Some(value) => fetch.put_success(value),
            None => fetch.put_failure(QuarryError::fetch(format!(
                "no fixture for {}",
                fetch.request().identifier()
            ))),
        }
    }
}
