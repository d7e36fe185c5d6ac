use crate::error::{FinancialsError, Result};
use crate::llm::oracle::{ExtractionOracle, OracleReply, OracleRequest};
use crate::llm::types::*;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }

    /// Reads `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            FinancialsError::InvalidConfig("GEMINI_API_KEY is not set".to_string())
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

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) async fn generate_content(
        &self,
        system_prompt: &str,
        messages: Vec<Content>,
        response_schema: Option<serde_json::Value>,
    ) -> Result<OracleReply> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: messages,
            system_instruction: Some(Content::user(system_prompt)),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema,
                temperature: 0.0,
            },
        };

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(FinancialsError::OracleFailed(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await?;
        let usage = body.usage_metadata.unwrap_or_default().into();

        let part = body
            .candidates
            .ok_or_else(|| FinancialsError::OracleFailed("No candidates returned".to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| FinancialsError::OracleFailed("Empty candidates list".to_string()))?
            .content
            .parts
            .into_iter()
            .next()
            .ok_or_else(|| FinancialsError::OracleFailed("No parts in content".to_string()))?;

        let Part::Text { text } = part;
        debug!("Gemini replied with {} chars", text.len());

        Ok(OracleReply { text, usage })
    }
}

#[async_trait]
impl ExtractionOracle for GeminiClient {
    async fn complete(&self, request: &OracleRequest) -> Result<OracleReply> {
        self.generate_content(
            &request.system_role,
            vec![Content::user(request.user_prompt.clone())],
            request.response_schema.clone(),
        )
        .await
    }
}
