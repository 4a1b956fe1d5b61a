use async_trait::async_trait;
use replyflow_core::{CoreError, LlmError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Context handed to the generator alongside the comment text: the
/// cached post content/author and the operator-configured prompt.
#[derive(Debug, Clone, Default)]
pub struct ReplyContext {
    pub post_content: String,
    pub post_author: String,
    pub prompt_template: String,
}

/// Generates reply text for a comment.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(
        &self,
        comment_text: &str,
        context: &ReplyContext,
    ) -> Result<String, CoreError>;
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

pub struct GeminiProvider {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            api_key,
            model: GEMINI_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn generate_content(&self, prompt: String) -> Result<String, CoreError> {
        if self.api_key.is_empty() {
            return Err(CoreError::Llm(LlmError::InvalidApiKey {
                provider: "gemini".to_string(),
            }));
        }

        let url = format!(
            "{}/models/{}:generateContent",
            GEMINI_API_BASE, self.model
        );
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        debug!("Requesting completion from {}", self.model);
        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini request failed: {}", e);
                if e.is_timeout() {
                    CoreError::Llm(LlmError::RequestTimeout {
                        provider: "gemini".to_string(),
                    })
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Gemini request failed with status {}", status);
            return Err(match status.as_u16() {
                401 | 403 => CoreError::Llm(LlmError::InvalidApiKey {
                    provider: "gemini".to_string(),
                }),
                429 => CoreError::Llm(LlmError::RateLimitExceeded {
                    provider: "gemini".to_string(),
                    retry_after: 60,
                }),
                _ => CoreError::Llm(LlmError::ServiceUnavailable {
                    provider: "gemini".to_string(),
                }),
            });
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: "gemini".to_string(),
            })
        })?;

        let candidate = body
            .candidates
            .and_then(|mut c| if c.is_empty() { None } else { Some(c.remove(0)) })
            .ok_or_else(|| {
                CoreError::Llm(LlmError::EmptyCompletion {
                    provider: "gemini".to_string(),
                })
            })?;

        if let Some(reason) = &candidate.finish_reason {
            if reason == "SAFETY" {
                return Err(CoreError::Llm(LlmError::ContentFiltered {
                    reason: reason.clone(),
                }));
            }
        }

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CoreError::Llm(LlmError::EmptyCompletion {
                provider: "gemini".to_string(),
            }));
        }

        info!("Generated {} characters of reply text", text.len());
        Ok(text)
    }
}

#[async_trait]
impl ReplyGenerator for GeminiProvider {
    async fn generate_reply(
        &self,
        comment_text: &str,
        context: &ReplyContext,
    ) -> Result<String, CoreError> {
        let prompt = build_prompt(comment_text, context);
        let raw = self.generate_content(prompt).await?;
        Ok(sanitize_response(&raw))
    }
}

/// Assembles the full prompt: operator template, post context, then the
/// comment to answer.
pub fn build_prompt(comment_text: &str, context: &ReplyContext) -> String {
    let mut prompt = String::new();
    prompt.push_str(&context.prompt_template);
    prompt.push_str("\n\n");

    if !context.post_content.is_empty() || !context.post_author.is_empty() {
        prompt.push_str("POST CONTEXT:\n");
        let author = if context.post_author.is_empty() {
            "Unknown"
        } else {
            &context.post_author
        };
        prompt.push_str(&format!("- Post author: {author}\n"));
        let content = if context.post_content.is_empty() {
            "No post content"
        } else {
            &context.post_content
        };
        prompt.push_str(&format!("- Post content: {content}\n\n"));
    }

    prompt.push_str(&format!("COMMENT TO ANSWER:\n\"{comment_text}\"\n\n"));
    prompt.push_str(
        "Write the reply as a genuine follower would. Do not sound like a bot or an AI.",
    );
    prompt
}

const SCRUBBED_PHRASES: &[&str] = &[
    "as an ai",
    "as a chatbot",
    "as a language model",
    "based on the information",
    "according to the data",
];

// Byte-level scan; the scrubbed phrases are ASCII, so matches always
// fall on UTF-8 character boundaries.
fn remove_case_insensitive(text: &str, phrase: &str) -> String {
    let bytes = text.as_bytes();
    let needle = phrase.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut cursor = 0;

    while cursor < bytes.len() {
        if cursor + needle.len() <= bytes.len()
            && bytes[cursor..cursor + needle.len()].eq_ignore_ascii_case(needle)
        {
            cursor += needle.len();
        } else {
            result.push(bytes[cursor]);
            cursor += 1;
        }
    }
    String::from_utf8(result).unwrap_or_else(|_| text.to_string())
}

/// Scrubs model tells out of a completion: AI-sounding phrases, a
/// leading "AI:"/"Bot:" prefix, and markdown bold markers.
pub fn sanitize_response(raw: &str) -> String {
    let mut text = raw.to_string();
    for phrase in SCRUBBED_PHRASES {
        text = remove_case_insensitive(&text, phrase);
    }

    let trimmed = text.trim_start();
    for prefix in ["ai:", "chatbot:", "bot:"] {
        if let Some(head) = trimmed.get(..prefix.len()) {
            if head.eq_ignore_ascii_case(prefix) {
                text = trimmed[prefix.len()..].to_string();
                break;
            }
        }
    }

    text.replace("**", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_includes_template_and_comment() {
        let context = ReplyContext {
            post_content: "launch day!".to_string(),
            post_author: "maker".to_string(),
            prompt_template: "Reply casually.".to_string(),
        };

        let prompt = build_prompt("congrats, when does it ship?", &context);
        assert!(prompt.starts_with("Reply casually."));
        assert!(prompt.contains("Post author: maker"));
        assert!(prompt.contains("Post content: launch day!"));
        assert!(prompt.contains("\"congrats, when does it ship?\""));
    }

    #[test]
    fn test_build_prompt_without_post_context() {
        let context = ReplyContext {
            prompt_template: "Reply casually.".to_string(),
            ..ReplyContext::default()
        };

        let prompt = build_prompt("hello", &context);
        assert!(!prompt.contains("POST CONTEXT"));
        assert!(prompt.contains("\"hello\""));
    }

    #[test]
    fn test_sanitize_strips_ai_phrases() {
        let raw = "As an AI, I think the launch looks great";
        let cleaned = sanitize_response(raw);
        assert!(!cleaned.to_lowercase().contains("as an ai"));
        assert!(cleaned.contains("launch looks great"));
    }

    #[test]
    fn test_sanitize_strips_markdown_bold_and_trims() {
        assert_eq!(sanitize_response("  **Nice!** see you there  "), "Nice! see you there");
    }

    #[test]
    fn test_sanitize_strips_bot_prefix() {
        assert_eq!(sanitize_response("Bot: sounds fun"), "sounds fun");
    }

    #[test]
    fn test_sanitize_keeps_normal_text() {
        assert_eq!(sanitize_response("see you at the meetup"), "see you at the meetup");
    }

    #[tokio::test]
    async fn test_generate_fails_without_api_key() {
        let provider = GeminiProvider::new(String::new());
        let context = ReplyContext::default();

        let err = provider.generate_reply("hi", &context).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Llm(LlmError::InvalidApiKey { .. })
        ));
    }
}
