use crate::runner::{run, Runner, RunnerConfig};
use crate::{data_fetch, sequence, zip2, zip3, zip4, Plan, RunSummary};
use quarry_api::{
    BlockedFetch, DataSource, FailureKind, PerformFetch, QuarryError,
};
use quarry_test_utils::{enable_tracing, KeyRequest, RecordingSource};
use std::sync::Arc;
use std::time::Duration;

fn users() -> Arc<RecordingSource> {
    Arc::new(
        RecordingSource::sync("users")
            .with_fixture("1", "alice")
            .with_fixture("2", "bob")
            .with_fixture("3", "carol"),
    )
}

#[tokio::test]
async fn independent_fetches_share_one_round() {
    enable_tracing();
    let users = users();
    let posts = Arc::new(
        RecordingSource::sync("posts").with_fixture("1", "hello"),
    );
    let plan = zip3(
        data_fetch(&users, users.request("1")),
        data_fetch(&users, users.request("2")),
        data_fetch(&posts, posts.request("1")),
    );

    let (result, summary) = Runner::default().run_with_summary(plan).await;

    assert_eq!(
        ("alice".to_string(), "bob".to_string(), "hello".to_string()),
        result.unwrap()
    );
    assert_eq!(1, summary.rounds);
    assert_eq!(1, users.call_count());
    let mut batch = users.calls().remove(0);
    batch.sort();
    assert_eq!(vec!["1".to_string(), "2".to_string()], batch);
    assert_eq!(vec![vec!["1".to_string()]], posts.calls());
}

#[tokio::test]
async fn dependent_fetches_take_two_rounds() {
    let users = Arc::new(RecordingSource::sync("users").with_fixture("1", "7"));
    let posts = Arc::new(
        RecordingSource::sync("posts").with_fixture("7", "post-seven"),
    );
    let plan = {
        let posts = posts.clone();
        data_fetch(&users, users.request("1")).and_then(move |post_id| {
            data_fetch(&posts, posts.request(post_id))
        })
    };

    let (result, summary) = Runner::default().run_with_summary(plan).await;

    assert_eq!("post-seven", result.unwrap());
    assert_eq!(2, summary.rounds);
    assert_eq!(vec![vec!["1".to_string()]], users.calls());
    assert_eq!(vec![vec!["7".to_string()]], posts.calls());
}

#[tokio::test]
async fn duplicate_fetches_collapse_to_one_request() {
    let users = users();
    let plan = zip2(
        data_fetch(&users, users.request("1")),
        data_fetch(&users, users.request("1")),
    );

    let (result, summary) = Runner::default().run_with_summary(plan).await;

    assert_eq!(("alice".to_string(), "alice".to_string()), result.unwrap());
    assert_eq!(1, summary.rounds);
    assert_eq!(vec![vec!["1".to_string()]], users.calls());
    assert_eq!(1, summary.duplicate_requests);
}

#[tokio::test]
async fn failing_branch_does_not_stop_the_batch() {
    let users = users();
    let plan = zip2(
        data_fetch(&users, users.request("1")),
        Plan::<String>::fail(QuarryError::app("branch failed")),
    );

    let (result, summary) = Runner::default().run_with_summary(plan).await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("branch failed"));
    // The live branch's request still went out with the round.
    assert_eq!(1, summary.rounds);
    assert_eq!(vec![vec!["1".to_string()]], users.calls());
}

#[tokio::test]
async fn source_failures_surface_with_their_context() {
    let users = users();
    let plan = zip2(
        data_fetch(&users, users.request("1")),
        data_fetch(&users, users.request("999")),
    );

    let err = run(plan).await.unwrap_err();

    assert_eq!(FailureKind::Fetch, err.kind());
    assert!(err.to_string().contains("no fixture"));
    let mut batch = users.calls().remove(0);
    batch.sort();
    assert_eq!(vec!["1".to_string(), "999".to_string()], batch);
}

#[tokio::test]
async fn sequence_batches_all_elements_in_one_round() {
    let users = users();
    let plan = sequence(
        ["1", "2", "3"]
            .into_iter()
            .map(|key| data_fetch(&users, users.request(key)))
            .collect(),
    );

    let (result, summary) = Runner::default().run_with_summary(plan).await;

    assert_eq!(
        vec!["alice".to_string(), "bob".to_string(), "carol".to_string()],
        result.unwrap()
    );
    assert_eq!(1, summary.rounds);
    assert_eq!(1, users.call_count());
    let mut batch = users.calls().remove(0);
    batch.sort();
    assert_eq!(
        vec!["1".to_string(), "2".to_string(), "3".to_string()],
        batch
    );
}

#[tokio::test]
async fn zip4_spans_one_round() {
    let users = users();
    let plan = zip4(
        data_fetch(&users, users.request("1")),
        data_fetch(&users, users.request("2")),
        data_fetch(&users, users.request("3")),
        data_fetch(&users, users.request("1")),
    );

    let (result, summary) = Runner::default().run_with_summary(plan).await;

    let (a, b, c, d) = result.unwrap();
    assert_eq!(("alice", "bob", "carol", "alice"), (
        a.as_str(),
        b.as_str(),
        c.as_str(),
        d.as_str()
    ));
    assert_eq!(1, summary.rounds);
    assert_eq!(1, users.call_count());
}

#[tokio::test]
async fn bind_defers_the_second_fetch_to_a_later_round() {
    let users = users();
    let plan = {
        let later = users.clone();
        data_fetch(&users, users.request("1"))
            .and_then(move |_| data_fetch(&later, later.request("2")))
    };

    let (result, summary) = Runner::default().run_with_summary(plan).await;

    assert_eq!("bob", result.unwrap());
    assert_eq!(2, summary.rounds);
    assert_eq!(
        vec![vec!["1".to_string()], vec!["2".to_string()]],
        users.calls()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn async_sources_run_concurrently_within_a_round() {
    let users = Arc::new(
        RecordingSource::delayed("users", Duration::from_millis(50))
            .with_fixture("1", "alice"),
    );
    let posts = Arc::new(
        RecordingSource::delayed("posts", Duration::from_millis(50))
            .with_fixture("1", "hello"),
    );
    let plan = zip2(
        data_fetch(&users, users.request("1")),
        data_fetch(&posts, posts.request("1")),
    );

    let (a, b) = run(plan).await.unwrap();
    assert_eq!(("alice", "hello"), (a.as_str(), b.as_str()));

    let users_span = users.spans().remove(0);
    let posts_span = posts.spans().remove(0);
    assert!(
        users_span.0 < posts_span.1 && posts_span.0 < users_span.1,
        "expected the two source tasks to overlap"
    );
}

#[derive(Debug)]
struct Neglectful;

impl DataSource for Neglectful {
    type Request = KeyRequest;

    fn name(&self) -> &str {
        "neglectful"
    }

    fn fetch(
        &self,
        _batch: Vec<BlockedFetch<KeyRequest>>,
    ) -> Vec<PerformFetch> {
        Vec::new()
    }
}

#[tokio::test]
async fn a_source_that_never_answers_is_an_error() {
    let source = Arc::new(Neglectful);
    let plan = data_fetch(&source, KeyRequest::new("neglectful", "1"));
    let err = run(plan).await.unwrap_err();
    assert_eq!(FailureKind::Invariant, err.kind());
    assert!(err.to_string().contains("expected complete fetch"));
}

#[tokio::test]
async fn summary_counts_the_run() {
    enable_tracing();
    let users = users();
    let plan = {
        let later = users.clone();
        zip2(
            data_fetch(&users, users.request("1")),
            data_fetch(&users, users.request("1")),
        )
        .and_then(move |_| data_fetch(&later, later.request("2")))
    };

    let (result, summary) = Runner::new(RunnerConfig { trace: true })
        .run_with_summary(plan)
        .await;

    assert_eq!("bob", result.unwrap());
    assert_eq!(
        RunSummary {
            rounds: 2,
            requests_fetched: 2,
            cache_hits: 0,
            cache_misses: 2,
            duplicate_requests: 1,
            invalidations: 0,
        },
        summary
    );
}

#[test]
fn runner_config_serde() {
    let config: RunnerConfig = serde_json::from_str("{}").unwrap();
    assert!(!config.trace);

    assert_eq!(
        r#"{"trace":true}"#,
        serde_json::to_string(&RunnerConfig { trace: true }).unwrap()
    );
}
