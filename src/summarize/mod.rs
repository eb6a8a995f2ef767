use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{DigestError, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Transcript character budget sent to the chat model; anything longer is
/// truncated so the prompt stays inside the context window
const MAX_TRANSCRIPT_CHARS: usize = 15_000;

const SYSTEM_PROMPT: &str = "You are a professional content analyst who summarizes and \
evaluates video content. Reply in the same language as the transcript.";

/// Structured three-section summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    /// Brief overview plus an assessment of whether the video is worth watching
    pub overview: String,

    /// Point-by-point outline following the video's own structure
    pub outline: String,

    /// Principles, methods or insights the video offers
    pub takeaways: String,
}

/// Trait for the summarization stage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a structured summary of a transcript
    async fn summarize(&self, transcript: &str, title: &str) -> Result<Summary>;
}

/// Summarizer backed by an OpenAI-compatible chat-completions API
pub struct ChatSummarizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: Option<u64>,
}

impl ChatSummarizer {
    pub fn new(api_key: String, base_url: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
        }
    }

    fn build_prompt(transcript: &str, title: &str) -> String {
        let mut excerpt: String = transcript.chars().take(MAX_TRANSCRIPT_CHARS).collect();
        if transcript.chars().count() > MAX_TRANSCRIPT_CHARS {
            excerpt.push_str("\n...[transcript truncated]...");
        }

        format!(
            "Based on the following video transcript, produce a concise, insightful \
structured summary.\n\n\
Video title: {title}\n\n\
Transcript (for your understanding only; do not repeat it verbatim):\n{excerpt}\n\n\
Output exactly the following three sections and nothing else:\n\n\
## Overview\n\
A 2-3 sentence summary, followed by your own assessment: is this video \
genuinely valuable, mere entertainment, or questionable?\n\n\
## Outline\n\
Walk through the video's main thread, one sentence per part.\n\n\
## Key Takeaways\n\
The principles, methods or insights this video offers.\n\n\
---\n\
Start the Markdown output directly. Never quote the transcript verbatim."
        )
    }

    /// Split the model's Markdown reply into the three expected sections.
    /// Falls back to the whole reply as the overview when parsing fails.
    fn parse_sections(text: &str) -> Summary {
        let mut overview = String::new();
        let mut outline = String::new();
        let mut takeaways = String::new();

        for section in text.split("## ") {
            let section = section.trim();
            if section.is_empty() {
                continue;
            }

            let (heading, body) = match section.split_once('\n') {
                Some((h, b)) => (h.trim(), b.trim()),
                None => (section, ""),
            };

            let heading_lower = heading.to_lowercase();
            if heading_lower.contains("overview") {
                overview = body.to_string();
            } else if heading_lower.contains("outline") {
                outline = body.to_string();
            } else if heading_lower.contains("takeaway") {
                takeaways = body.to_string();
            }
        }

        if overview.is_empty() && outline.is_empty() {
            overview = text.trim().to_string();
        }

        Summary {
            overview,
            outline,
            takeaways,
        }
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, transcript: &str, title: &str) -> Result<Summary> {
        if transcript.trim().is_empty() {
            return Err(DigestError::EmptyTranscript.into());
        }

        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::build_prompt(transcript, title) },
            ],
            "temperature": 1.0,
            "max_completion_tokens": 2000,
        });

        // The o1 family rejects the temperature parameter
        if self.model.starts_with("o1") {
            body.as_object_mut().unwrap().remove("temperature");
        }

        tracing::info!("Requesting summary (model: {})", self.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DigestError::SummarizationFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DigestError::InvalidCredential.into());
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DigestError::RateLimited.into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                DigestError::SummarizationFailed(format!("HTTP {}: {}", status, body)).into(),
            );
        }

        let raw = response
            .text()
            .await
            .map_err(|e| DigestError::MalformedResponse(e.to_string()))?;

        let parsed: ChatResponse = serde_json::from_str(&raw)
            .map_err(|e| DigestError::MalformedResponse(format!("{}: {}", e, raw)))?;

        if let Some(usage) = &parsed.usage {
            if let Some(total) = usage.total_tokens {
                tracing::info!("Summary used {} tokens", total);
            }
        }

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| DigestError::MalformedResponse("reply has no content".to_string()))?;

        Ok(Self::parse_sections(content))
    }
}
