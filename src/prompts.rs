//! Prompt retrieval API client.

use std::sync::Arc;

use reqwest::{header::CACHE_CONTROL, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    client::ClientInner,
    errors::{ApiError, Error, Result, ValidationError},
    template::{compile_template, VariableMap},
};

/// Request to fetch a prompt template by name.
#[derive(Debug, Clone, Default)]
pub struct GetPromptRequest {
    pub name: String,
    /// Pins a specific version; latest when unset.
    pub version: Option<String>,
    /// Compiled into the content when non-empty.
    pub variables: VariableMap,
}

/// A fetched prompt, unwrapped and compiled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptPayload {
    pub content: Value,
    #[serde(rename = "type")]
    pub kind: String,
    /// `None` (serialized as null) when the server omitted it.
    pub prompt_version_id: Option<String>,
}

/// Prompt record as served. `content` is a JSON-encoded string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptData {
    content: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    prompt_version_id: Option<String>,
}

/// Success/error envelope wrapping every prompt and experiment response.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    success: bool,
    error: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwraps the payload or surfaces the server-reported error.
    pub(crate) fn into_data(self) -> Result<T> {
        if !self.success {
            return Err(api_failure(self.error));
        }
        self.data.ok_or_else(|| api_failure(None))
    }
}

/// Application-level failure inside a 2xx response.
pub(crate) fn api_failure(message: Option<String>) -> Error {
    ApiError::new(200, message.unwrap_or_else(|| "API error".to_string())).into()
}

/// Decodes the served `content` string and unwraps text-typed prompts, whose
/// payload is a one-element list wrapping the actual text.
pub(crate) fn unwrap_content(raw: &str, kind: &str) -> Result<Value> {
    let parsed: Value = serde_json::from_str(raw)?;
    if kind != "text" {
        return Ok(parsed);
    }
    parsed
        .get(0)
        .and_then(|entry| entry.get("content"))
        .cloned()
        .ok_or_else(|| ApiError::new(200, "malformed text prompt content").into())
}

/// Client for prompt retrieval.
#[derive(Clone)]
pub struct PromptsClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl PromptsClient {
    /// Fetches the named prompt, always bypassing intermediary caches so the
    /// latest server-side content is served.
    pub async fn get(&self, req: GetPromptRequest) -> Result<PromptPayload> {
        if req.name.trim().is_empty() {
            return Err(ValidationError::new("prompt name is required")
                .with_field("promptName")
                .into());
        }

        let mut url = self
            .inner
            .url(&["api", "v1", "prompts", "by-name", &req.name])?;
        if let Some(version) = req.version.as_deref().filter(|v| !v.is_empty()) {
            url.query_pairs_mut().append_pair("versionNumber", version);
        }

        let builder = self
            .inner
            .request_url(Method::GET, url)
            .header(CACHE_CONTROL, "no-cache");
        let envelope: Envelope<PromptData> = self.inner.execute_json(builder, Method::GET).await?;
        let data = envelope.into_data()?;

        let mut content = unwrap_content(&data.content, &data.kind)?;
        if !req.variables.is_empty() {
            content = compile_template(&content, &req.variables);
        }

        Ok(PromptPayload {
            content,
            kind: data.kind,
            // Some servers send "" instead of omitting the field.
            prompt_version_id: data.prompt_version_id.filter(|id| !id.is_empty()),
        })
    }
}
