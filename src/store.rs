// src/store.rs
// Persistence: one row insert per validated selection, failures collected.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use uuid::Uuid;

use crate::normalize::SelectionRecord;

const TABLE: &str = "selected_news";

/// Storage row as inserted. `id` and `created_at` are generated here,
/// independent of anything the model supplied.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PersistedRow {
    pub id: Uuid,
    pub date: String,
    pub title: String,
    pub reason: String,
    pub writing_direction: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait SelectionStore: Send + Sync {
    async fn insert(&self, row: &PersistedRow) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Supabase REST (PostgREST) store: one POST per row to
/// `{base}/rest/v1/selected_news`.
pub struct SupabaseStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SelectionStore for SupabaseStore {
    async fn insert(&self, row: &PersistedRow) -> Result<()> {
        let url = format!("{}/rest/v1/{}", self.base_url, TABLE);
        self.client
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await
            .context("supabase insert")?
            .error_for_status()
            .context("supabase non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}

/// In-memory store for tests: records rows, optionally failing selected
/// insert calls by zero-based call index.
#[derive(Default)]
pub struct MemoryStore {
    rows: std::sync::Mutex<Vec<PersistedRow>>,
    fail_on: Vec<usize>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(indexes: &[usize]) -> Self {
        Self {
            fail_on: indexes.to_vec(),
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<PersistedRow> {
        self.rows.lock().expect("poisoned rows").clone()
    }
}

#[async_trait]
impl SelectionStore for MemoryStore {
    async fn insert(&self, row: &PersistedRow) -> Result<()> {
        let call = self
            .calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_on.contains(&call) {
            anyhow::bail!("injected insert failure at call {call}");
        }
        self.rows.lock().expect("poisoned rows").push(row.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Outcome of persisting one batch: per-record failures never abort the
/// remaining inserts, and there is no rollback.
#[derive(Debug, Clone, Default)]
pub struct SaveOutcome {
    pub saved: usize,
    pub errors: Vec<String>,
}

/// Insert every record of a batch independently, collecting failures.
pub async fn save_selection(
    store: &dyn SelectionStore,
    date: &str,
    records: &[SelectionRecord],
) -> SaveOutcome {
    let mut outcome = SaveOutcome::default();

    for record in records {
        let row = PersistedRow {
            id: Uuid::new_v4(),
            date: date.to_string(),
            title: record.title.clone(),
            reason: record.reason.clone(),
            writing_direction: record.writing_direction.clone(),
            created_at: Utc::now(),
        };
        match store.insert(&row).await {
            Ok(()) => {
                outcome.saved += 1;
                counter!("selections_saved_total").increment(1);
            }
            Err(e) => {
                tracing::warn!(error = ?e, title = %row.title, "insert failed");
                counter!("selection_save_errors_total").increment(1);
                outcome.errors.push(format!(
                    "儲存失敗：{}：{e}",
                    truncate_chars(&row.title, 30)
                ));
            }
        }
    }

    outcome
}

/// Char-safe truncation with an ellipsis suffix; shared with the HTTP
/// response body, which clips annotation text.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    }
}
