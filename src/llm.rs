// src/llm.rs
// Completion provider abstraction and the OpenAI Chat Completions impl.

use std::time::Duration;

use async_trait::async_trait;
use metrics::histogram;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Headlines beyond this cap are not sent to the model. Truncation follows
/// input order; there is no prioritization.
pub const MAX_PROMPT_TITLES: usize = 50;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Fixed system instruction: the model must pick exactly five headlines and
/// answer in strict JSON.
pub const SYSTEM_PROMPT: &str = "你是專業的新聞編輯。最重要的規則：無論如何都必須選出正好5則新聞。\
請嚴格按照JSON格式回傳結果。";

const SELECTION_PROMPT: &str = r#"
你是台灣的國際新聞編輯，以下是日本新聞標題，請從中選出 5 則新聞，並說明選擇理由與建議撰寫角度。

**重要指示：無論如何都必須選出正好 5 則新聞，即使標題看起來不夠有趣或不完全符合條件，也要從現有標題中選出最相關的 5 則。**

優先條件（盡量符合，但不是必須）：
1. 有助台灣理解日本政治、外交、經濟、文化
2. 能作為對中政策或區域安全參考

如果符合上述條件的新聞不足 5 則，請按以下優先順序補足：
1. 日本政治、經濟、社會重要事件
2. 日本國際關係或外交動態
3. 日本科技、產業發展
4. 任何具有新聞價值的日本相關新聞

請嚴格按照以下格式回傳，務必包含 5 則新聞：
{
  "selections": [
    {
      "title": "新聞標題",
      "reason": "選擇理由",
      "writing_direction": "建議撰寫角度"
    }
  ]
}

**強制要求：陣列中必須有正好 5 個新聞物件，絕對不可以是空陣列或少於 5 個項目。**
"#;

/// Build the user message: instruction template plus the headline list,
/// truncated to [`MAX_PROMPT_TITLES`].
pub fn build_user_prompt(titles: &[String]) -> String {
    let limited = &titles[..titles.len().min(MAX_PROMPT_TITLES)];
    let mut out = String::from(SELECTION_PROMPT);
    out.push_str("\n\n新聞標題：\n");
    for title in limited {
        out.push_str("- ");
        out.push_str(title);
        out.push('\n');
    }
    out
}

/// One synchronous completion per run. Implementations return the raw
/// response text; shape tolerance lives in the normalizer, not here.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, PipelineError>;
    fn name(&self) -> &'static str;
}

/// OpenAI provider (Chat Completions API). Low temperature plus the
/// json_object response format bias the model toward compliant output.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model_override: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("japan-news-curator/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(90))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, system: &str, user: &str) -> Result<String, PipelineError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat<'a> {
            #[serde(rename = "type")]
            kind: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            response_format: ResponseFormat<'a>,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        if self.api_key.is_empty() {
            return Err(PipelineError::Provider("OPENAI_API_KEY is not set".into()));
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.3,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let t0 = std::time::Instant::now();
        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| PipelineError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PipelineError::Provider(format!(
                "status {}",
                resp.status()
            )));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| PipelineError::Provider(e.to_string()))?;
        histogram!("llm_request_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::Provider("response carried no choices".into()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Fixed-response provider for tests and local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, PipelineError> {
        Ok(self.fixed.clone())
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}
