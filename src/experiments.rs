//! Experiment evaluation API client.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    client::ClientInner,
    errors::{Result, ValidationError},
    prompts::{unwrap_content, Envelope},
    template::{compile_template, KeyValue, VariableMap},
};

/// Request to resolve the prompt variant an experiment serves to a user or
/// session.
#[derive(Debug, Clone, Default)]
pub struct EvaluateExperimentRequest {
    pub experiment_title: String,
    /// Bucketing identifier; skipped when empty.
    pub user_id: String,
    /// Bucketing identifier; skipped when empty.
    pub session_id: String,
    /// Extra context pairs, merged after the identifiers. Empty keys are
    /// skipped; later keys overwrite earlier ones.
    pub additional_context: Vec<KeyValue>,
    /// Compiled into the content when non-empty.
    pub variables: VariableMap,
}

/// The prompt variant selected for this evaluation, with experiment
/// metadata for later score submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentPromptPayload {
    pub content: Value,
    #[serde(rename = "type")]
    pub kind: String,
    pub experiment_id: String,
    pub bucket_id: String,
    pub prompt_version_id: String,
    pub prompt_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateBody<'a> {
    experiment_title: &'a str,
    context: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationData {
    experiment_id: String,
    bucket_id: String,
    prompt: PromptVariant,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptVariant {
    /// JSON-encoded, same wrapping as the prompts endpoint.
    content: String,
    #[serde(rename = "type")]
    kind: String,
    prompt_version_id: String,
    prompt_id: String,
}

/// Client for experiment evaluation.
#[derive(Clone)]
pub struct ExperimentsClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ExperimentsClient {
    /// Evaluates the experiment for the given identifiers and returns the
    /// selected prompt variant.
    pub async fn evaluate(&self, req: EvaluateExperimentRequest) -> Result<ExperimentPromptPayload> {
        if req.experiment_title.trim().is_empty() {
            return Err(ValidationError::new("experiment title is required")
                .with_field("experimentTitle")
                .into());
        }

        let body = EvaluateBody {
            experiment_title: &req.experiment_title,
            context: build_context(&req),
        };
        let builder = self
            .inner
            .request(Method::POST, &["api", "v3", "experiments", "evaluate"])?
            .json(&body);
        let envelope: Envelope<EvaluationData> =
            self.inner.execute_json(builder, Method::POST).await?;
        let data = envelope.into_data()?;

        let mut content = unwrap_content(&data.prompt.content, &data.prompt.kind)?;
        if !req.variables.is_empty() {
            content = compile_template(&content, &req.variables);
        }

        Ok(ExperimentPromptPayload {
            content,
            kind: data.prompt.kind,
            experiment_id: data.experiment_id,
            bucket_id: data.bucket_id,
            prompt_version_id: data.prompt.prompt_version_id,
            prompt_id: data.prompt.prompt_id,
        })
    }
}

/// Merges `userId`, `sessionId` and the extra pairs, in that insertion
/// order; later keys overwrite earlier ones.
fn build_context(req: &EvaluateExperimentRequest) -> Map<String, Value> {
    let mut context = Map::new();
    if !req.user_id.is_empty() {
        context.insert("userId".to_string(), Value::String(req.user_id.clone()));
    }
    if !req.session_id.is_empty() {
        context.insert(
            "sessionId".to_string(),
            Value::String(req.session_id.clone()),
        );
    }
    for pair in &req.additional_context {
        if pair.key.is_empty() {
            continue;
        }
        context.insert(pair.key.clone(), Value::String(pair.value.clone()));
    }
    context
}
