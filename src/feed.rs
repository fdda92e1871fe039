// src/feed.rs
// Feed fetching and headline extraction for the date-keyed RSS endpoint.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::error::PipelineError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
}

/// Source of raw feed markup for one target date. The HTTP implementation is
/// the production path; tests drive the orchestrator with fixtures.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, date: &str) -> Result<String, PipelineError>;
    fn name(&self) -> &'static str;
}

/// Fetches `GET {endpoint}?date=YYYYMMDD`. Any non-200 is a fetch failure.
pub struct HttpFeedSource {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { endpoint, client }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, date: &str) -> Result<String, PipelineError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("date", date)])
            .send()
            .await
            .map_err(|e| PipelineError::Fetch {
                date: date.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(PipelineError::Fetch {
                date: date.to_string(),
                reason: format!("status {}", resp.status()),
            });
        }

        resp.text().await.map_err(|e| PipelineError::Fetch {
            date: date.to_string(),
            reason: e.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "HttpFeedSource"
    }
}

/// Normalize one raw title: decode HTML entities, strip tags, collapse
/// whitespace, trim.
pub fn normalize_title(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Parse feed markup into ordered headline strings.
///
/// Items without a title, with empty title text, or whose title contains a
/// denylist substring are skipped silently. Unparsable markup fails the
/// whole extraction for that date.
pub fn extract_titles(
    xml: &str,
    denylist: &[String],
    date: &str,
) -> Result<Vec<String>, PipelineError> {
    let t0 = std::time::Instant::now();

    let rss: Rss = from_str(xml).map_err(|e| PipelineError::Parse {
        date: date.to_string(),
        reason: e.to_string(),
    })?;

    let mut out = Vec::with_capacity(rss.channel.items.len());
    for item in rss.channel.items {
        let Some(raw) = item.title else { continue };
        let title = normalize_title(&raw);
        if title.is_empty() {
            continue;
        }
        if denylist.iter().any(|skip| title.contains(skip.as_str())) {
            continue;
        }
        out.push(title);
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("feed_parse_ms").record(ms);
    counter!("feed_titles_total").increment(out.len() as u64);

    Ok(out)
}

/// Exact-match dedup preserving first-seen order.
pub fn dedup_titles(titles: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(titles.len());
    titles
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
