use crate::config::LlmSettings;
use serde::{Deserialize, Serialize};
use webbrief_core::{Error, Result, Summarizer};

/// Most chunks sent per summarization call.
pub const MAX_CHUNKS: usize = 10;
/// Chunks per chat request.
pub const BATCH_SIZE: usize = 5;
/// Characters of joined batch text sent per request.
pub const MAX_BATCH_CHARS: usize = 10_000;

const SYSTEM_PROMPT: &str = "You are an expert information extractor.";
const TEMPERATURE: f64 = 0.2;

fn extraction_prompt(content: &str, task: &str) -> String {
    format!(
        "Extract information from the text content below.\n\n\
         {content}\n\n\
         Instructions:\n\
         1. Output only information that matches this description: {task}\n\
         2. Add no commentary, explanations or extra text.\n\
         3. If nothing relevant is found, output an empty string ('').\n\
         4. Output the requested data only, without greetings or framing."
    )
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatClient {
    /// `endpoint` is the full chat-completions URL.
    pub fn new(
        client: reqwest::Client,
        endpoint: String,
        api_key: Option<String>,
        model: String,
    ) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            model,
        }
    }

    pub fn from_settings(client: reqwest::Client, s: &LlmSettings) -> Self {
        if s.api_key.is_none() {
            tracing::warn!("no LLM API key configured; requests go out unauthenticated");
        }
        Self::new(client, s.endpoint.clone(), s.api_key.clone(), s.model.clone())
    }

    pub async fn chat(
        &self,
        system: &str,
        user: &str,
        timeout_ms: u64,
        temperature: Option<f64>,
    ) -> Result<String> {
        let req = ChatCompletionsRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature,
        };

        let mut rb = self
            .client
            .post(&self.endpoint)
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        let status = resp.status();
        // Only a plain 200 carries a completion.
        if status != reqwest::StatusCode::OK {
            return Err(Error::Llm(format!("chat.completions HTTP {status}")));
        }

        let parsed: ChatCompletionsResponse =
            resp.json().await.map_err(|e| Error::Llm(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Llm("chat.completions response has no choices".to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Batched extraction-style summarizer over an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatSummarizer {
    llm: OpenAiCompatClient,
    timeout_ms: u64,
}

impl ChatSummarizer {
    pub fn new(llm: OpenAiCompatClient, timeout_ms: u64) -> Self {
        Self { llm, timeout_ms }
    }

    pub fn from_settings(client: reqwest::Client, s: &LlmSettings) -> Self {
        Self::new(OpenAiCompatClient::from_settings(client, s), s.timeout_ms)
    }
}

/// Join the non-blank chunks of one batch and cap the result at [`MAX_BATCH_CHARS`].
///
/// `None` when the batch has nothing to send.
pub fn batch_text(batch: &[String]) -> Option<String> {
    let kept: Vec<&str> = batch
        .iter()
        .map(String::as_str)
        .filter(|c| !c.trim().is_empty())
        .collect();
    if kept.is_empty() {
        return None;
    }
    let joined = kept.join("\n\n");
    Some(match joined.char_indices().nth(MAX_BATCH_CHARS) {
        Some((cut, _)) => joined[..cut].to_string(),
        None => joined,
    })
}

#[async_trait::async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, chunks: &[String], task: &str) -> String {
        let chunks = &chunks[..chunks.len().min(MAX_CHUNKS)];
        let total = chunks.len().div_ceil(BATCH_SIZE);
        let mut outputs: Vec<String> = Vec::with_capacity(total);
        for (i, batch) in chunks.chunks(BATCH_SIZE).enumerate() {
            let Some(text) = batch_text(batch) else {
                tracing::debug!(batch = i + 1, "batch has no non-blank chunks; skipping");
                continue;
            };
            let prompt = extraction_prompt(&text, task);
            match self
                .llm
                .chat(SYSTEM_PROMPT, &prompt, self.timeout_ms, Some(TEMPERATURE))
                .await
            {
                Ok(content) => {
                    tracing::debug!(batch = i + 1, total, "summarized batch");
                    outputs.push(content.trim().to_string());
                }
                Err(e) => {
                    tracing::warn!(batch = i + 1, total, error = %e, "summarization batch failed");
                    outputs.push(String::new());
                }
            }
        }
        outputs.join("\n").trim().to_string()
    }
}
