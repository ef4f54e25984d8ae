//! Minimal Rust SDK for the LaikaTest prompt experimentation API.
//!
//! The crate exposes three remote operations — fetching a prompt by name,
//! resolving the A/B-tested prompt variant for an experiment, and pushing
//! evaluation scores — plus the pure helpers they are built from
//! (`{{placeholder}}` template compilation and score typing).
//!
//! [`node`] layers a host-agnostic item loop on top of the client so a
//! workflow runtime can drive all three operations over a batch of items
//! through a single [`node::NodeContext`] capability seam.

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.laikatest.com";

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Client source tag sent with every score submission.
pub(crate) const CLIENT_SOURCE: &str = "n8n";

/// Client version tag sent with every score submission.
pub(crate) const CLIENT_VERSION: &str = "1.0.0";

mod client;
mod errors;
mod experiments;
pub mod node;
mod prompts;
mod scores;
mod template;

pub use client::{AuthClient, Client, Config, Credentials};
pub use errors::{ApiError, Error, Result, TransportError, TransportErrorKind, ValidationError};
pub use experiments::{EvaluateExperimentRequest, ExperimentPromptPayload, ExperimentsClient};
pub use node::{execute, ExecutionItem, NodeContext, Operation};
pub use prompts::{GetPromptRequest, PromptPayload, PromptsClient};
pub use scores::{
    convert_score, PushScoresRequest, RawScore, Score, ScoreSubmission, ScoreType, ScoreValue,
    ScoresClient,
};
pub use template::{compile_template, KeyValue, VariableMap};
