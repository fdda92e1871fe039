// tests/pipeline_run.rs
// End-to-end orchestrator runs with mock feed/provider/store. No sockets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use japan_news_curator::error::{NormalizeError, PipelineError};
use japan_news_curator::feed::FeedSource;
use japan_news_curator::llm::{CompletionProvider, MockProvider};
use japan_news_curator::notify::{Notifier, WebhookNotifier};
use japan_news_curator::pipeline::{self, AppContext};
use japan_news_curator::store::{MemoryStore, SelectionStore};

fn fixture_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Japan News</title>
<item><title>Japan raises rates</title></item>
<item><title>Yahoo Japan トップニュース</title></item>
<item><title>PM visits Taiwan</title></item>
<item><title>Japan raises rates</title></item>
</channel></rss>"#
        .to_string()
}

struct FixtureFeed;

#[async_trait]
impl FeedSource for FixtureFeed {
    async fn fetch(&self, _date: &str) -> Result<String, PipelineError> {
        Ok(fixture_xml())
    }
    fn name(&self) -> &'static str {
        "FixtureFeed"
    }
}

struct FailingFeed;

#[async_trait]
impl FeedSource for FailingFeed {
    async fn fetch(&self, date: &str) -> Result<String, PipelineError> {
        Err(PipelineError::Fetch {
            date: date.to_string(),
            reason: "status 502 Bad Gateway".to_string(),
        })
    }
    fn name(&self) -> &'static str {
        "FailingFeed"
    }
}

/// Counts calls so tests can assert the provider was never reached.
struct CountingProvider {
    calls: Arc<AtomicUsize>,
    fixed: String,
}

#[async_trait]
impl CompletionProvider for CountingProvider {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.fixed.clone())
    }
    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Always fails, as a transport/auth error would.
struct FailingProvider;

#[async_trait]
impl CompletionProvider for FailingProvider {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, PipelineError> {
        Err(PipelineError::Provider("status 401 Unauthorized".to_string()))
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Simulates a webhook endpoint answering non-2xx.
struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _date: &str, _llm_result: &serde_json::Value) -> anyhow::Result<()> {
        anyhow::bail!("webhook non-2xx: 500 Internal Server Error")
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

fn five_selections() -> String {
    serde_json::json!({
        "selections": (1..=5).map(|i| serde_json::json!({
            "title": format!("選出 {i}"),
            "reason": format!("理由 {i}"),
            "writing_direction": format!("角度 {i}"),
        })).collect::<Vec<_>>()
    })
    .to_string()
}

fn ctx(
    feed: Arc<dyn FeedSource>,
    provider: Arc<dyn CompletionProvider>,
    store: Arc<dyn SelectionStore>,
) -> AppContext {
    AppContext {
        feed,
        provider,
        store,
        notifier: Arc::new(WebhookNotifier::new(None)),
        denylist: vec!["Yahoo Japan".to_string(), "地震情報".to_string()],
    }
}

#[tokio::test]
async fn full_run_selects_and_saves() {
    let store = Arc::new(MemoryStore::new());
    let ctx = ctx(
        Arc::new(FixtureFeed),
        Arc::new(MockProvider {
            fixed: five_selections(),
        }),
        store.clone(),
    );

    let report = pipeline::run(&ctx).await.expect("run should succeed");

    // Per date: denylisted title dropped at extraction, duplicate survives
    // until the cross-date dedup. Two dates in the window.
    assert_eq!(report.total_titles, 6);
    assert_eq!(report.unique_titles, 2);
    assert_eq!(report.selected_count, 5);
    assert_eq!(report.saved_count, 5);
    assert!(report.errors.is_empty());
    assert!(!report.logs.is_empty());
    assert_eq!(store.rows().len(), 5);
    assert!(store.rows().iter().all(|r| r.date == report.date));
}

#[tokio::test]
async fn midbatch_insert_failure_still_reports_success() {
    let store = Arc::new(MemoryStore::failing_on(&[2]));
    let ctx = ctx(
        Arc::new(FixtureFeed),
        Arc::new(MockProvider {
            fixed: five_selections(),
        }),
        store.clone(),
    );

    let report = pipeline::run(&ctx).await.expect("run should succeed");
    assert_eq!(report.saved_count, 4);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.selected_count, 5);
}

#[tokio::test]
async fn all_dates_failing_is_a_noop_without_provider_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryStore::new());
    let ctx = ctx(
        Arc::new(FailingFeed),
        Arc::new(CountingProvider {
            calls: calls.clone(),
            fixed: five_selections(),
        }),
        store.clone(),
    );

    let report = pipeline::run(&ctx).await.expect("no-op is not an error");
    assert_eq!(report.unique_titles, 0);
    assert_eq!(report.selected_count, 0);
    assert_eq!(report.saved_count, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no provider request");
    assert!(store.rows().is_empty());
    assert_eq!(report.errors.len(), 2); // one per failed date
}

#[tokio::test]
async fn unparseable_provider_output_aborts_before_persistence() {
    let store = Arc::new(MemoryStore::new());
    let ctx = ctx(
        Arc::new(FixtureFeed),
        Arc::new(MockProvider {
            fixed: "今日は特にニュースがありません。".to_string(),
        }),
        store.clone(),
    );

    let failure = pipeline::run(&ctx).await.expect_err("must fail");
    assert!(matches!(
        failure.error,
        PipelineError::Normalize(NormalizeError::MalformedInput(_))
    ));
    assert!(store.rows().is_empty());
    assert!(!failure.logs.is_empty());
}

#[tokio::test]
async fn empty_selection_array_aborts_the_run() {
    let store = Arc::new(MemoryStore::new());
    let ctx = ctx(
        Arc::new(FixtureFeed),
        Arc::new(MockProvider {
            fixed: r#"{"selections": []}"#.to_string(),
        }),
        store.clone(),
    );

    let failure = pipeline::run(&ctx).await.expect_err("must fail");
    assert!(matches!(
        failure.error,
        PipelineError::Normalize(NormalizeError::EmptySelection)
    ));
    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn provider_transport_failure_aborts_the_run() {
    let store = Arc::new(MemoryStore::new());
    let ctx = ctx(Arc::new(FixtureFeed), Arc::new(FailingProvider), store.clone());

    let failure = pipeline::run(&ctx).await.expect_err("must fail");
    assert!(matches!(failure.error, PipelineError::Provider(_)));
    assert!(store.rows().is_empty(), "nothing persisted after abort");
    assert!(!failure.logs.is_empty());
}

#[tokio::test]
async fn notifier_failure_is_recorded_but_never_fatal() {
    let store = Arc::new(MemoryStore::new());
    let ctx = AppContext {
        feed: Arc::new(FixtureFeed),
        provider: Arc::new(MockProvider {
            fixed: five_selections(),
        }),
        store: store.clone(),
        notifier: Arc::new(FailingNotifier),
        denylist: vec![],
    };

    let report = pipeline::run(&ctx).await.expect("run should still succeed");
    assert_eq!(report.saved_count, 5);
    assert_eq!(report.errors.len(), 1);
    assert!(
        report.errors[0].starts_with("通知失敗"),
        "webhook failure should land in the error list: {:?}",
        report.errors
    );
}

#[tokio::test]
async fn drifted_key_payload_flows_through_to_rows() {
    let store = Arc::new(MemoryStore::new());
    let ctx = ctx(
        Arc::new(FixtureFeed),
        Arc::new(MockProvider {
            fixed: r#"{"news": [{"title": "A", "reason": "R"}]}"#.to_string(),
        }),
        store.clone(),
    );

    let report = pipeline::run(&ctx).await.expect("run should succeed");
    assert_eq!(report.selected_count, 1);
    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "A");
    assert_eq!(rows[0].writing_direction, "未提供建議");
}
