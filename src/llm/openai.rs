use crate::error::{FinancialsError, Result};
use crate::llm::oracle::{ExtractionOracle, OracleReply, OracleRequest};
use crate::llm::types::*;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const MAX_COMPLETION_TOKENS: u32 = 1500;

/// Chat-completions oracle. Structured-output schemas are not forwarded; replies are parsed
/// leniently instead.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
        }
    }

    /// Reads `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            FinancialsError::InvalidConfig("OPENAI_API_KEY is not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<OracleReply> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: 0.0,
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(FinancialsError::OracleFailed(format!(
                "OpenAI API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: ChatCompletionResponse = res.json().await?;
        let usage = body.usage.unwrap_or_default().into();
        let text = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| FinancialsError::OracleFailed("No choices returned".to_string()))?;

        debug!("OpenAI replied with {} chars", text.len());
        Ok(OracleReply { text, usage })
    }
}

#[async_trait]
impl ExtractionOracle for OpenAiClient {
    async fn complete(&self, request: &OracleRequest) -> Result<OracleReply> {
        self.chat(vec![
            ChatMessage {
                role: "system".to_string(),
                content: request.system_role.clone(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: request.user_prompt.clone(),
            },
        ])
        .await
    }
}
