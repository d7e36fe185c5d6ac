use crate::error::Result;
use crate::schema::TokenUsage;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub system_role: String,
    pub user_prompt: String,
    /// JSON schema of the expected payload, for oracles that support structured output.
    pub response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleReply {
    /// Free text expected to contain one JSON object.
    pub text: String,
    pub usage: TokenUsage,
}

/// An external text-understanding service that turns page text into line items.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn complete(&self, request: &OracleRequest) -> Result<OracleReply>;
}

#[async_trait]
impl<'a, T: ExtractionOracle + ?Sized> ExtractionOracle for &'a T {
    async fn complete(&self, request: &OracleRequest) -> Result<OracleReply> {
        (**self).complete(request).await
    }
}

#[async_trait]
impl<T: ExtractionOracle + ?Sized> ExtractionOracle for Arc<T> {
    async fn complete(&self, request: &OracleRequest) -> Result<OracleReply> {
        (**self).complete(request).await
    }
}

#[async_trait]
impl<T: ExtractionOracle + ?Sized> ExtractionOracle for Box<T> {
    async fn complete(&self, request: &OracleRequest) -> Result<OracleReply> {
        (**self).complete(request).await
    }
}
