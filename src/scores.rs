//! Score typing and submission.
//!
//! Scores arrive from host UIs as `(name, type tag, string value)` triples;
//! [`convert_score`] turns them into typed values before anything is sent.

use std::fmt;
use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    client::ClientInner,
    errors::{Error, Result},
    CLIENT_SOURCE, CLIENT_VERSION,
};

/// Declared type of a score metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreType {
    Int,
    Float,
    Bool,
    String,
}

impl ScoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreType::Int => "int",
            ScoreType::Float => "float",
            ScoreType::Bool => "bool",
            ScoreType::String => "string",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "int" => Some(ScoreType::Int),
            "float" => Some(ScoreType::Float),
            "bool" => Some(ScoreType::Bool),
            "string" => Some(ScoreType::String),
            _ => None,
        }
    }
}

impl fmt::Display for ScoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A score entry as collected from the host: everything is still a string.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawScore {
    pub name: String,
    #[serde(rename = "type")]
    pub score_type: String,
    pub value: String,
}

impl RawScore {
    pub fn new(
        name: impl Into<String>,
        score_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            score_type: score_type.into(),
            value: value.into(),
        }
    }
}

/// A typed score value; serializes as the bare JSON scalar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ScoreValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

/// A typed score ready for submission. Invariant: `value`'s variant matches
/// `score_type`; only [`convert_score`] constructs these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Score {
    pub name: String,
    #[serde(rename = "type")]
    pub score_type: ScoreType,
    pub value: ScoreValue,
}

/// Converts a raw string-typed entry into a typed score.
///
/// `int` and `float` parse a leading numeric prefix the way JavaScript's
/// `parseInt`/`parseFloat` do, so `"5abc"` converts to `5`. `bool` accepts
/// only case-insensitive `true`/`false`; `string` always passes through.
pub fn convert_score(raw: &RawScore) -> Result<Score> {
    let score_type = ScoreType::parse(&raw.score_type).ok_or_else(|| Error::UnknownScoreType {
        name: raw.name.clone(),
        type_tag: raw.score_type.clone(),
    })?;

    let value = match score_type {
        ScoreType::Int => {
            ScoreValue::Int(parse_int_prefix(&raw.value).ok_or_else(|| invalid(raw, score_type))?)
        }
        ScoreType::Float => ScoreValue::Float(
            parse_float_prefix(&raw.value).ok_or_else(|| invalid(raw, score_type))?,
        ),
        ScoreType::Bool => match raw.value.to_lowercase().as_str() {
            "true" => ScoreValue::Bool(true),
            "false" => ScoreValue::Bool(false),
            _ => return Err(invalid(raw, score_type)),
        },
        ScoreType::String => ScoreValue::String(raw.value.clone()),
    };

    Ok(Score {
        name: raw.name.clone(),
        score_type,
        value,
    })
}

fn invalid(raw: &RawScore, score_type: ScoreType) -> Error {
    Error::InvalidScoreValue {
        name: raw.name.clone(),
        score_type,
        value: raw.value.clone(),
    }
}

/// Longest leading base-10 integer: leading whitespace and an optional sign
/// are consumed, trailing garbage is ignored. `None` when no digits follow.
fn parse_int_prefix(input: &str) -> Option<i64> {
    let trimmed = input.trim_start();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let run: &str = &digits[..digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len())];
    if run.is_empty() {
        return None;
    }
    let signed = if negative {
        format!("-{run}")
    } else {
        run.to_string()
    };
    // Saturate on digit runs that overflow i64.
    match signed.parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) if negative => Some(i64::MIN),
        Err(_) => Some(i64::MAX),
    }
}

/// Longest leading float, `parseFloat` style. `None` when no prefix parses
/// at all.
///
/// Rust's `f64` grammar is wider than `parseFloat`'s: it also accepts
/// `nan`/`inf`/`infinity` in any case. A NaN result is never a number here,
/// and infinity is only recognized through the full `Infinity` spelling.
fn parse_float_prefix(input: &str) -> Option<f64> {
    let trimmed = input.trim_start();
    let mut best = None;
    for end in 1..=trimmed.len() {
        if !trimmed.is_char_boundary(end) {
            continue;
        }
        let candidate = &trimmed[..end];
        let Ok(value) = candidate.parse::<f64>() else {
            continue;
        };
        if value.is_nan() {
            continue;
        }
        if value.is_infinite() {
            let body = candidate.trim_start_matches(['+', '-']);
            // Overflowed numeric literals (e.g. "1e999") still count.
            if body.starts_with(['i', 'I']) && !body.eq_ignore_ascii_case("infinity") {
                continue;
            }
        }
        best = Some(value);
    }
    best
}

/// Request to submit evaluation scores for an experiment bucket.
///
/// `user_id` / `session_id` are optional individually but at least one must
/// be non-empty.
#[derive(Debug, Clone, Default)]
pub struct PushScoresRequest {
    pub experiment_id: String,
    pub bucket_id: String,
    pub prompt_version_id: String,
    pub user_id: String,
    pub session_id: String,
    pub scores: Vec<RawScore>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoresBody<'a> {
    exp_id: &'a str,
    bucket_id: &'a str,
    prompt_version_id: &'a str,
    scores: &'a [Score],
    source: &'a str,
    client_version: &'a str,
    /// Fresh v4 UUID correlating this submission in server-side logs.
    sdk_event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ScoresResponse {
    success: Option<bool>,
    #[serde(default)]
    data: Option<Value>,
}

/// Outcome of a score submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSubmission {
    /// Treated as `true` when the server's envelope omits the flag.
    pub success: bool,
    pub status_code: u16,
    pub data: Option<Value>,
}

/// Client for score submission.
#[derive(Clone)]
pub struct ScoresClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ScoresClient {
    /// Submits all scores in one call.
    ///
    /// Preconditions run before any remote call: at least one of
    /// `user_id`/`session_id` must be set, the score list must be non-empty,
    /// and every raw score must convert — a single bad value aborts the whole
    /// submission.
    pub async fn push(&self, req: PushScoresRequest) -> Result<ScoreSubmission> {
        if req.user_id.trim().is_empty() && req.session_id.trim().is_empty() {
            return Err(Error::MissingIdentifier);
        }
        if req.scores.is_empty() {
            return Err(Error::MissingScores);
        }

        let scores = req
            .scores
            .iter()
            .map(convert_score)
            .collect::<Result<Vec<_>>>()?;

        let body = ScoresBody {
            exp_id: &req.experiment_id,
            bucket_id: &req.bucket_id,
            prompt_version_id: &req.prompt_version_id,
            scores: &scores,
            source: CLIENT_SOURCE,
            client_version: CLIENT_VERSION,
            sdk_event_id: Uuid::new_v4().to_string(),
            user_id: (!req.user_id.is_empty()).then_some(req.user_id.as_str()),
            session_id: (!req.session_id.is_empty()).then_some(req.session_id.as_str()),
        };

        let builder = self
            .inner
            .request(Method::POST, &["api", "v1", "scores"])?
            .json(&body);
        let resp: ScoresResponse = self.inner.execute_json(builder, Method::POST).await?;

        Ok(ScoreSubmission {
            success: resp.success.unwrap_or(true),
            status_code: 200,
            data: resp.data,
        })
    }
}
