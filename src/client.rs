use std::{sync::Arc, time::Duration};

use reqwest::{header::CONTENT_TYPE, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    errors::{parse_api_error, Error, Result, TransportError, TransportErrorKind},
    experiments::ExperimentsClient,
    prompts::PromptsClient,
    scores::ScoresClient,
    DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};

/// API credentials as supplied by a hosting runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub api_key: String,
    /// Overrides [`DEFAULT_BASE_URL`] when set and non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Supply a prebuilt reqwest client (connection pools, proxies, ...).
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
}

/// Async client for the LaikaTest API.
///
/// Cheap to clone; all sub-clients share one connection pool.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
pub(crate) struct ClientInner {
    base_url: reqwest::Url,
    api_key: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let api_key = cfg
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Config("api key is required".to_string()))?;

        let base = cfg
            .base_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = reqwest::Url::parse(base.trim_end_matches('/'))
            .map_err(|err| Error::Config(format!("invalid base url: {err}")))?;

        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                .build()
                .map_err(|err| TransportError {
                    kind: TransportErrorKind::Connect,
                    message: "failed to build http client".to_string(),
                    source: Some(err),
                })?,
        };

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url,
                api_key,
                http,
                request_timeout: cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            }),
        })
    }

    /// Builds a client from host-supplied credentials with default timeouts.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        Client::new(Config {
            api_key: Some(credentials.api_key.clone()),
            base_url: credentials.base_url.clone(),
            ..Default::default()
        })
    }

    pub fn prompts(&self) -> PromptsClient {
        PromptsClient {
            inner: self.inner.clone(),
        }
    }

    pub fn experiments(&self) -> ExperimentsClient {
        ExperimentsClient {
            inner: self.inner.clone(),
        }
    }

    pub fn scores(&self) -> ScoresClient {
        ScoresClient {
            inner: self.inner.clone(),
        }
    }

    pub fn auth(&self) -> AuthClient {
        AuthClient {
            inner: self.inner.clone(),
        }
    }
}

/// Client for credential checks.
#[derive(Clone)]
pub struct AuthClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl AuthClient {
    /// Verifies the configured API key against the service.
    ///
    /// Backs a hosting runtime's "test credentials" action.
    pub async fn verify(&self) -> Result<()> {
        let builder = self
            .inner
            .request(Method::GET, &["api", "v1", "auth", "verify"])?;
        self.inner.send(builder, Method::GET).await.map(|_| ())
    }
}

impl ClientInner {
    /// Builds a request whose path is appended to the base URL, so a base
    /// override carrying a subpath keeps it.
    pub(crate) fn request(
        &self,
        method: Method,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder> {
        let url = self.url(segments)?;
        Ok(self.http.request(method, url))
    }

    /// Builds a URL from percent-encoded path segments, for paths that embed
    /// caller-supplied names.
    pub(crate) fn url(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| Error::Config("base url cannot carry a path".to_string()))?;
            parts.pop_if_empty();
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }

    pub(crate) fn request_url(&self, method: Method, url: reqwest::Url) -> reqwest::RequestBuilder {
        self.http.request(method, url)
    }

    /// Sends a single request. No retries: a failed call surfaces
    /// immediately, once.
    pub(crate) async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        method: Method,
    ) -> Result<reqwest::Response> {
        let builder = builder
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout);

        let result = builder.send().await;
        match result {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    tracing::debug!(method = %method, status = %status, "request completed");
                    return Ok(resp);
                }
                tracing::warn!(method = %method, status = %status, "request failed");
                let body = resp.text().await.unwrap_or_default();
                Err(parse_api_error(status, body))
            }
            Err(err) => {
                tracing::warn!(method = %method, error = %err, "transport error");
                Err(self.to_transport_error(err))
            }
        }
    }

    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        method: Method,
    ) -> Result<T> {
        let resp = self.send(builder, method).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| self.to_transport_error(err))?;
        serde_json::from_slice(&bytes).map_err(Error::Serialization)
    }

    fn to_transport_error(&self, err: reqwest::Error) -> Error {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };

        TransportError {
            kind,
            message: err.to_string(),
            source: Some(err),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new(Config {
            api_key: Some("lk_test_key".into()),
            ..Default::default()
        })
        .expect("client creation should succeed")
    }

    #[test]
    fn new_requires_api_key() {
        let err = Client::new(Config::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Client::new(Config {
            api_key: Some("   ".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn base_url_defaults_and_trims_trailing_slash() {
        let client = client();
        assert_eq!(client.inner.base_url.as_str(), "https://api.laikatest.com/");

        let client = Client::new(Config {
            api_key: Some("lk_test_key".into()),
            base_url: Some("https://staging.laikatest.com/".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.inner.base_url.as_str(),
            "https://staging.laikatest.com/"
        );
    }

    #[test]
    fn url_percent_encodes_segments() {
        let client = client();
        let url = client
            .inner
            .url(&["api", "v1", "prompts", "by-name", "daily greeting/v2"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.laikatest.com/api/v1/prompts/by-name/daily%20greeting%2Fv2"
        );
    }

    #[test]
    fn url_keeps_base_url_subpaths() {
        let client = Client::new(Config {
            api_key: Some("lk_test_key".into()),
            base_url: Some("https://proxy.example.com/laika".into()),
            ..Default::default()
        })
        .unwrap();
        let url = client.inner.url(&["api", "v1", "scores"]).unwrap();
        assert_eq!(url.as_str(), "https://proxy.example.com/laika/api/v1/scores");
    }

    #[test]
    fn from_credentials_honors_base_url_override() {
        let client = Client::from_credentials(&Credentials {
            api_key: "lk_test_key".into(),
            base_url: Some("http://127.0.0.1:9999".into()),
        })
        .unwrap();
        assert_eq!(client.inner.base_url.as_str(), "http://127.0.0.1:9999/");
    }
}
