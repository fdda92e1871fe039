// src/config.rs
// Environment configuration and the title denylist loader.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_FEED_ENDPOINT: &str = "https://japan-news-get.netlify.app/rss";

const ENV_DENYLIST_PATH: &str = "DENYLIST_PATH";

/// Process configuration, sourced from the environment once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub openai_model: Option<String>,
    pub supabase_url: String,
    pub supabase_key: String,
    pub webhook_url: Option<String>,
    pub feed_endpoint: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            openai_api_key: require("OPENAI_API_KEY")?,
            openai_model: std::env::var("OPENAI_MODEL").ok(),
            supabase_url: require("SUPABASE_URL")?,
            supabase_key: require("SUPABASE_KEY")?,
            webhook_url: std::env::var(crate::notify::ENV_WEBHOOK_URL).ok(),
            feed_endpoint: std::env::var("FEED_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_FEED_ENDPOINT.to_string()),
        })
    }
}

fn require(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var {key}"))
}

/// Built-in denylist: editorial boilerplate and disaster-alert headers.
pub fn default_denylist() -> Vec<String> {
    vec!["Yahoo Japan".to_string(), "地震情報".to_string()]
}

/// Load the denylist from an explicit path. Supports TOML or JSON.
pub fn load_denylist_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading denylist from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_denylist(&content, ext.as_str())
}

/// Load the denylist using env var + fallbacks:
/// 1) $DENYLIST_PATH
/// 2) config/denylist.toml
/// 3) config/denylist.json
/// 4) the built-in default
pub fn load_denylist_default() -> Result<Vec<String>> {
    if let Ok(p) = std::env::var(ENV_DENYLIST_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_denylist_from(&pb);
        } else {
            return Err(anyhow!("DENYLIST_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/denylist.toml");
    if toml_p.exists() {
        return load_denylist_from(&toml_p);
    }
    let json_p = PathBuf::from("config/denylist.json");
    if json_p.exists() {
        return load_denylist_from(&json_p);
    }
    Ok(default_denylist())
}

fn parse_denylist(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains("patterns");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported denylist format"))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlDenylist {
        patterns: Vec<String>,
    }
    let v: TomlDenylist = toml::from_str(s)?;
    Ok(clean_list(v.patterns))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out = Vec::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|x| x == t) {
            out.push(t.to_string());
        }
    }
    out
}
