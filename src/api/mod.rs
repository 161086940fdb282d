//! REST client substrate shared by the provider API clients.
//!
//! [`ApiClient`] owns the base URL, the authorization header and the retry
//! policy. Provider clients register a typed error decoder with
//! [`ApiClient::with_error`] so that 4xx/5xx bodies come back as structured
//! values instead of raw text.

pub mod monzo;
mod retry;
pub mod starling;

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::error::ErrorKind;

pub use retry::RetryPolicy;

/// Per-request timeout used when the caller does not supply one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A provider's structured error body.
pub trait ProviderError: std::error::Error + Send + Sync + 'static {
    fn http_status(&self) -> StatusCode;

    /// Provider error code, e.g. `unauthorized.bad_access_token`.
    fn code(&self) -> &str;
}

/// Parses a provider error out of a failed response body.
pub trait DecodeProviderError: ProviderError + Sized {
    /// Returns `None` when the body is not in the provider's error shape.
    fn decode(status: StatusCode, body: &[u8]) -> Option<Self>;
}

type ErrorDecoder = fn(StatusCode, &[u8]) -> Option<Box<dyn ProviderError>>;

fn decode_boxed<E: DecodeProviderError>(
    status: StatusCode,
    body: &[u8],
) -> Option<Box<dyn ProviderError>> {
    E::decode(status, body).map(|err| Box::new(err) as Box<dyn ProviderError>)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("start time must be before end time")]
    InvalidTimeRange,

    #[error("execute {method} {url}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{0}")]
    Provider(Box<dyn ProviderError>),

    #[error("HTTP {}: {}", .status.as_u16(), .body)]
    Status { status: StatusCode, body: String },

    #[error("decode {method} {url} response")]
    Decode {
        method: Method,
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::MissingField(_) | ApiError::InvalidTimeRange => ErrorKind::InvalidOptions,
            ApiError::Transport { .. } => ErrorKind::Transport,
            ApiError::Provider(_) | ApiError::Status { .. } => ErrorKind::ProviderApi,
            ApiError::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// HTTP status of a failed response, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Provider(err) => Some(err.http_status()),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The decoded provider error, when a decoder recognized the body.
    pub fn provider(&self) -> Option<&dyn ProviderError> {
        match self {
            ApiError::Provider(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Build the HTTP-layer client that carries the per-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    let timeout = if timeout.is_zero() {
        DEFAULT_TIMEOUT
    } else {
        timeout
    };
    reqwest::Client::builder()
        .user_agent(concat!("fingrab/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<SecretString>,
    retry: RetryPolicy,
    error_decoder: Option<ErrorDecoder>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("has_auth_token", &self.auth_token.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            auth_token: None,
            retry: RetryPolicy::default(),
            error_decoder: None,
        }
    }

    /// Set the full `Authorization` header value, e.g. `Bearer abc`.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Decode failed responses into `E` when the body matches its shape.
    pub fn with_error<E: DecodeProviderError>(mut self) -> Self {
        self.error_decoder = Some(decode_boxed::<E>);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the request URL. Query pairs are appended verbatim; callers pass
    /// values that are already safe to place in a URL.
    fn url(&self, path: &str, query: &[(&str, String)]) -> String {
        let mut url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        for (idx, (key, value)) in query.iter().enumerate() {
            url.push(if idx == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(value);
        }
        url
    }

    /// Send a request, retrying per the policy, and decode the JSON body into `T`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.url(path, query);

        let mut attempt = 0;
        let outcome = loop {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .header(ACCEPT, "application/json");
            if let Some(token) = &self.auth_token {
                request = request.header(AUTHORIZATION, token.expose_secret());
            }

            let started = Instant::now();
            let outcome = request.send().await;
            let duration_ms = started.elapsed().as_millis() as u64;
            match &outcome {
                Ok(response) => tracing::debug!(
                    http.method = %method,
                    http.url = %url,
                    http.status_code = response.status().as_u16(),
                    http.duration_ms = duration_ms,
                    http.attempt = attempt,
                    "http request"
                ),
                Err(err) => tracing::debug!(
                    http.method = %method,
                    http.url = %url,
                    http.duration_ms = duration_ms,
                    http.attempt = attempt,
                    http.err = %err,
                    "http request"
                ),
            }

            if attempt < self.retry.max_retries && self.retry.should_retry(&outcome) {
                tokio::time::sleep(self.retry.backoff(attempt)).await;
                attempt += 1;
                continue;
            }
            break outcome;
        };

        let transport = |source| ApiError::Transport {
            method: method.clone(),
            url: url.clone(),
            source,
        };
        let response = outcome.map_err(transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport)?;

        if status.is_client_error() || status.is_server_error() {
            if let Some(decoded) = self.error_decoder.and_then(|decode| decode(status, &body)) {
                return Err(ApiError::Provider(decoded));
            }
            return Err(ApiError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            method,
            url,
            source,
        })
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.execute(Method::GET, path, query).await
    }
}

/// Trim whitespace and prefix `Bearer ` unless it is already present.
pub fn bearer(token: &str) -> String {
    let token = token.trim();
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {token}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_appended_verbatim() {
        let client = ApiClient::new("https://api.example.com/", reqwest::Client::new());
        let url = client.url(
            "/transactions",
            &[
                ("account_id", "acc_1".to_string()),
                ("expand[]", "merchant".to_string()),
                ("since", "2025-01-01T00:00:00Z".to_string()),
            ],
        );
        assert_eq!(
            url,
            "https://api.example.com/transactions?account_id=acc_1&expand[]=merchant&since=2025-01-01T00:00:00Z"
        );
        assert_eq!(client.url("/accounts", &[]), "https://api.example.com/accounts");
    }

    #[test]
    fn bearer_prefix_is_added_once() {
        assert_eq!(bearer("abc"), "Bearer abc");
        assert_eq!(bearer("  abc \n"), "Bearer abc");
        assert_eq!(bearer("Bearer abc"), "Bearer abc");
        assert_eq!(bearer(" Bearer abc "), "Bearer abc");
    }

    #[test]
    fn status_error_renders_code_and_body() {
        let err = ApiError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: "upstream down".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 502: upstream down");
        assert_eq!(err.kind(), ErrorKind::ProviderApi);
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    }
}
