// src/pipeline.rs
// Orchestrator: date window, fetch -> extract -> request -> normalize ->
// persist -> notify, all strictly sequential.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::feed::{self, FeedSource, HttpFeedSource};
use crate::llm::{self, CompletionProvider, OpenAiProvider};
use crate::normalize::{self, SelectionRecord};
use crate::notify::{Notifier, WebhookNotifier};
use crate::store::{self, SelectionStore, SupabaseStore};

/// Runs at or after this JST hour look at [yesterday, today]; earlier runs
/// look at [two days ago, yesterday].
const JST_HOUR_THRESHOLD: u32 = 15;

const JST_OFFSET_SECS: i32 = 9 * 3600;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Completed pipeline runs.");
        describe_counter!("pipeline_noop_runs_total", "Runs ended early with zero headlines.");
        describe_counter!("pipeline_failed_runs_total", "Runs aborted by a fatal stage.");
        describe_counter!("feed_fetch_errors_total", "Per-date feed fetch/parse failures.");
        describe_counter!("feed_titles_total", "Titles kept after extraction filtering.");
        describe_counter!("selections_saved_total", "Rows successfully inserted.");
        describe_counter!("selection_save_errors_total", "Per-row insert failures.");
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
        describe_histogram!("llm_request_ms", "Completion request time in milliseconds.");
        describe_histogram!("pipeline_run_ms", "Whole-run wall time in milliseconds.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts when the pipeline last completed.");
    });
}

/// Process-wide handles, constructed once and passed explicitly. No ambient
/// global state; no teardown (process lifetime is short).
pub struct AppContext {
    pub feed: Arc<dyn FeedSource>,
    pub provider: Arc<dyn CompletionProvider>,
    pub store: Arc<dyn SelectionStore>,
    pub notifier: Arc<dyn Notifier>,
    pub denylist: Vec<String>,
}

impl AppContext {
    pub fn from_config(config: &AppConfig, denylist: Vec<String>) -> Self {
        Self {
            feed: Arc::new(HttpFeedSource::new(config.feed_endpoint.clone())),
            provider: Arc::new(OpenAiProvider::new(
                config.openai_api_key.clone(),
                config.openai_model.as_deref(),
            )),
            store: Arc::new(SupabaseStore::new(
                config.supabase_url.clone(),
                config.supabase_key.clone(),
            )),
            notifier: Arc::new(WebhookNotifier::new(config.webhook_url.clone())),
            denylist,
        }
    }
}

/// Summary of one completed run (including the early no-op outcome).
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunReport {
    pub date: String,
    pub total_titles: usize,
    pub unique_titles: usize,
    pub selected_count: usize,
    pub saved_count: usize,
    pub selected: Vec<SelectionRecord>,
    pub message: String,
    pub logs: Vec<String>,
    pub errors: Vec<String>,
    pub execution_time_seconds: f64,
}

/// A fatal stage failure, carrying whatever was logged before the abort.
#[derive(Debug)]
pub struct RunFailure {
    pub error: PipelineError,
    pub logs: Vec<String>,
    pub execution_time_seconds: f64,
}

pub fn now_jst() -> DateTime<FixedOffset> {
    let jst = FixedOffset::east_opt(JST_OFFSET_SECS).expect("JST offset");
    Utc::now().with_timezone(&jst)
}

/// Compute the YYYYMMDD window for a run at `now` (JST). The last entry is
/// the report date.
pub fn target_dates(now: DateTime<FixedOffset>) -> Vec<String> {
    let fmt = |d: DateTime<FixedOffset>| d.format("%Y%m%d").to_string();
    if now.hour() < JST_HOUR_THRESHOLD {
        vec![fmt(now - Duration::days(2)), fmt(now - Duration::days(1))]
    } else {
        vec![fmt(now - Duration::days(1)), fmt(now)]
    }
}

fn log_line(logs: &mut Vec<String>, msg: String) {
    tracing::info!("{msg}");
    logs.push(msg);
}

fn elapsed_secs(t0: Instant) -> f64 {
    (t0.elapsed().as_secs_f64() * 100.0).round() / 100.0
}

/// Drive one full run. Per-date fetch/parse failures and per-row insert
/// failures are recorded and skipped; provider and normalization failures
/// abort the run. Zero surviving headlines ends the run early with a no-op
/// report and no provider request.
pub async fn run(ctx: &AppContext) -> Result<RunReport, RunFailure> {
    ensure_metrics_described();

    let t0 = Instant::now();
    let mut logs = Vec::new();
    let mut errors = Vec::new();

    let now = now_jst();
    let dates = target_dates(now);
    let report_date = dates.last().cloned().unwrap_or_default();
    log_line(
        &mut logs,
        format!("目標日期：{}（JST {}）", dates.join(", "), now.format("%Y-%m-%d %H:%M")),
    );

    let mut all_titles = Vec::new();
    for date in &dates {
        match fetch_and_extract(ctx, date).await {
            Ok(titles) => {
                log_line(&mut logs, format!("{date}：取得 {} 則標題", titles.len()));
                all_titles.extend(titles);
            }
            Err(e) => {
                tracing::warn!(date = date.as_str(), error = %e, "date skipped");
                counter!("feed_fetch_errors_total").increment(1);
                errors.push(e.to_string());
                logs.push(format!("{date}：抓取失敗，略過"));
            }
        }
    }

    let total_titles = all_titles.len();
    let unique_titles = feed::dedup_titles(all_titles);
    log_line(
        &mut logs,
        format!("共 {total_titles} 則標題，去重後 {} 則", unique_titles.len()),
    );

    if unique_titles.is_empty() {
        // No-op outcome, not an error: no provider request, no persistence.
        counter!("pipeline_noop_runs_total").increment(1);
        log_line(&mut logs, "無新聞標題可分析".to_string());
        return Ok(RunReport {
            date: report_date,
            total_titles,
            unique_titles: 0,
            selected_count: 0,
            saved_count: 0,
            selected: Vec::new(),
            message: "無新聞標題可分析".to_string(),
            logs,
            errors,
            execution_time_seconds: elapsed_secs(t0),
        });
    }

    log_line(&mut logs, "開始模型分析...".to_string());
    let user_prompt = llm::build_user_prompt(&unique_titles);
    let raw = match ctx.provider.complete(llm::SYSTEM_PROMPT, &user_prompt).await {
        Ok(raw) => raw,
        Err(error) => return Err(fail(error, logs, t0)),
    };

    let records = match normalize::normalize_raw(&raw) {
        Ok(records) => records,
        Err(e) => return Err(fail(PipelineError::Normalize(e), logs, t0)),
    };
    log_line(&mut logs, format!("分析完成，選出 {} 則新聞", records.len()));

    log_line(&mut logs, "開始儲存...".to_string());
    let outcome = store::save_selection(ctx.store.as_ref(), &report_date, &records).await;
    log_line(
        &mut logs,
        format!(
            "儲存完成：成功 {} 則，失敗 {} 則",
            outcome.saved,
            outcome.errors.len()
        ),
    );
    errors.extend(outcome.errors);

    let llm_result = serde_json::json!({ "selections": records });
    if let Err(e) = ctx.notifier.send(&report_date, &llm_result).await {
        tracing::warn!(error = ?e, "webhook failed");
        errors.push(format!("通知失敗：{e}"));
    }

    counter!("pipeline_runs_total").increment(1);
    gauge!("pipeline_last_run_ts").set(Utc::now().timestamp() as f64);
    histogram!("pipeline_run_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    Ok(RunReport {
        date: report_date,
        total_titles,
        unique_titles: unique_titles.len(),
        selected_count: records.len(),
        saved_count: outcome.saved,
        message: format!("成功分析並儲存 {} 則新聞", outcome.saved),
        selected: records,
        logs,
        errors,
        execution_time_seconds: elapsed_secs(t0),
    })
}

async fn fetch_and_extract(ctx: &AppContext, date: &str) -> Result<Vec<String>, PipelineError> {
    let xml = ctx.feed.fetch(date).await?;
    feed::extract_titles(&xml, &ctx.denylist, date)
}

fn fail(error: PipelineError, logs: Vec<String>, t0: Instant) -> RunFailure {
    tracing::error!(error = %error, "run aborted");
    counter!("pipeline_failed_runs_total").increment(1);
    RunFailure {
        error,
        logs,
        execution_time_seconds: elapsed_secs(t0),
    }
}
