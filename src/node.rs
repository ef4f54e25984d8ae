//! Host-facing item loop: operation dispatch over a batch of input items.
//!
//! A workflow runtime implements [`NodeContext`] to hand over credentials and
//! per-item parameters; [`execute`] walks the items strictly sequentially,
//! one remote call in flight at a time, and either records failures inline
//! (continue-on-fail) or aborts the run on the first one.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    client::{Client, Credentials},
    errors::{Error, Result},
    experiments::EvaluateExperimentRequest,
    prompts::GetPromptRequest,
    scores::{PushScoresRequest, RawScore},
    template::{KeyValue, VariableMap},
};

/// Operations exposed to the hosting workflow runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetPrompt,
    GetExperimentPrompt,
    PushScores,
}

impl Operation {
    /// Resolves a host-supplied operation name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "getPrompt" => Ok(Operation::GetPrompt),
            "getExperimentPrompt" => Ok(Operation::GetExperimentPrompt),
            "pushScores" => Ok(Operation::PushScores),
            other => Err(Error::UnknownOperation(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetPrompt => "getPrompt",
            Operation::GetExperimentPrompt => "getExperimentPrompt",
            Operation::PushScores => "pushScores",
        }
    }
}

/// Capabilities the hosting runtime provides to the item loop.
///
/// Parameter accessors are per item; missing parameters resolve to their
/// empty form. Credential retrieval is the only suspension point besides the
/// remote calls themselves.
#[async_trait]
pub trait NodeContext: Send + Sync {
    /// API credentials configured for this node.
    async fn credentials(&self) -> Result<Credentials>;

    /// A plain string parameter.
    fn string_parameter(&self, name: &str, item_index: usize) -> String;

    /// A collected key/value list parameter (variables, context pairs).
    fn pair_parameter(&self, name: &str, item_index: usize) -> Vec<KeyValue>;

    /// The collected score entries for push-scores.
    fn score_parameter(&self, name: &str, item_index: usize) -> Vec<RawScore>;

    /// Whether a failed item should be recorded instead of aborting the run.
    fn continue_on_fail(&self) -> bool;
}

/// One output record; paired with its input item index on failure.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionItem {
    pub json: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paired_item: Option<usize>,
}

/// Runs `item_count` input items through the node.
///
/// Output ordering matches input ordering. Under continue-on-fail a failed
/// item is recorded as `{"error": message}` and processing moves on;
/// otherwise the error propagates and remaining items are never attempted.
///
/// Credentials are fetched once, before the first item, so a credentials
/// failure aborts the whole run even under continue-on-fail.
pub async fn execute<C>(ctx: &C, item_count: usize) -> Result<Vec<ExecutionItem>>
where
    C: NodeContext + ?Sized,
{
    let credentials = ctx.credentials().await?;
    // One client for the whole loop; dropped on every exit path.
    let client = Client::from_credentials(&credentials)?;

    let mut output = Vec::with_capacity(item_count);
    for item_index in 0..item_count {
        match run_item(&client, ctx, item_index).await {
            Ok(payload) => output.push(ExecutionItem {
                json: payload,
                paired_item: None,
            }),
            Err(err) => {
                if ctx.continue_on_fail() {
                    tracing::warn!(item_index, error = %err, "item failed; continuing");
                    output.push(ExecutionItem {
                        json: json!({ "error": err.to_string() }),
                        paired_item: Some(item_index),
                    });
                    continue;
                }
                return Err(err);
            }
        }
    }
    Ok(output)
}

async fn run_item<C>(client: &Client, ctx: &C, item_index: usize) -> Result<Value>
where
    C: NodeContext + ?Sized,
{
    let operation = Operation::parse(&ctx.string_parameter("operation", item_index))?;
    tracing::debug!(item_index, operation = operation.as_str(), "dispatching item");

    match operation {
        Operation::GetPrompt => {
            let req = GetPromptRequest {
                name: ctx.string_parameter("promptName", item_index),
                version: Some(ctx.string_parameter("versionId", item_index))
                    .filter(|v| !v.is_empty()),
                variables: VariableMap::from_pairs(ctx.pair_parameter("variables", item_index)),
            };
            let payload = client.prompts().get(req).await?;
            Ok(serde_json::to_value(payload)?)
        }
        Operation::GetExperimentPrompt => {
            let req = EvaluateExperimentRequest {
                experiment_title: ctx.string_parameter("experimentTitle", item_index),
                user_id: ctx.string_parameter("userId", item_index),
                session_id: ctx.string_parameter("sessionId", item_index),
                additional_context: ctx.pair_parameter("additionalContext", item_index),
                variables: VariableMap::from_pairs(
                    ctx.pair_parameter("experimentVariables", item_index),
                ),
            };
            let payload = client.experiments().evaluate(req).await?;
            Ok(serde_json::to_value(payload)?)
        }
        Operation::PushScores => {
            let req = PushScoresRequest {
                experiment_id: ctx.string_parameter("experimentId", item_index),
                bucket_id: ctx.string_parameter("bucketId", item_index),
                prompt_version_id: ctx.string_parameter("promptVersionId", item_index),
                user_id: ctx.string_parameter("pushUserId", item_index),
                session_id: ctx.string_parameter("pushSessionId", item_index),
                scores: ctx.score_parameter("scores", item_index),
            };
            let payload = client.scores().push(req).await?;
            Ok(serde_json::to_value(payload)?)
        }
    }
}
