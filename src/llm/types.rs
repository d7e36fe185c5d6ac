use crate::schema::TokenUsage;
use serde::{Deserialize, Serialize};

/// Progress notifications emitted while a filing moves through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExtractionEvent {
    Starting { path: String, year: i32 },
    Classified { pages: usize, candidates: usize },
    BatchSent { pages: Vec<usize> },
    BatchParsed { pages: Vec<usize>, statement_type: String, items: usize },
    BatchFailed { pages: Vec<usize>, reason: String },
    BatchSkipped { pages: Vec<usize> },
    Assembled { metrics: usize, total_tokens: u64 },
    Persisted { ticker: String, year: i32, rows: usize },
}

// --- Gemini generateContent wire format ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::Text { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub content: Content,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
}

impl From<UsageMetadata> for TokenUsage {
    fn from(meta: UsageMetadata) -> Self {
        TokenUsage {
            prompt_tokens: meta.prompt_token_count,
            completion_tokens: meta.candidates_token_count,
            total_tokens: meta.total_token_count,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

// --- OpenAI chat completions wire format ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl From<ChatUsage> for TokenUsage {
    fn from(usage: ChatUsage) -> Self {
        TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_response_with_usage() {
        let body = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "{}"}]}}],
            "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 30, "totalTokenCount": 150}
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
        let usage: TokenUsage = parsed.usage_metadata.unwrap().into();
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(parsed.candidates.unwrap().len(), 1);
    }

    #[test]
    fn test_gemini_request_is_camel_case() {
        let request = GenerateContentRequest {
            contents: vec![Content::user("hi")],
            system_instruction: None,
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: None,
                temperature: 0.0,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert!(json["generationConfig"].get("responseSchema").is_none());
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_chat_response_without_usage() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "ok"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "ok");
        assert!(parsed.usage.is_none());
    }
}
