//! Three-legged OAuth via a loopback redirect.
//!
//! A short-lived axum listener on `localhost:64131` receives the authorization
//! code while the user's browser is pointed at the provider's consent page.
//! The listener and the browser prompt run together and stop together; the
//! code is then exchanged for an access token with a form POST.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Notify};

use crate::export::ExportError;

/// The redirect providers must have registered for the client.
pub const LOOPBACK_ADDR: &str = "localhost:64131";
pub const REDIRECT_URI: &str = "http://localhost:64131/";

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: SecretString,
    pub auth_url: String,
    pub token_url: String,
    /// Block on a line of input after the exchange, for providers that ask the
    /// user to confirm access in a mobile app.
    pub wait_for_approval_in_app: bool,
    pub scopes: Vec<String>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            anyhow::bail!("client id is required");
        }
        if self.client_secret.expose_secret().trim().is_empty() {
            anyhow::bail!("client secret is required");
        }
        if self.auth_url.trim().is_empty() {
            anyhow::bail!("auth url is required");
        }
        if self.token_url.trim().is_empty() {
            anyhow::bail!("token url is required");
        }
        Ok(())
    }

    /// Consent page URL the user is sent to.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<Url> {
        let mut params = vec![
            ("client_id", self.client_id.clone()),
            ("redirect_uri", redirect_uri.to_string()),
            ("response_type", "code".to_string()),
            ("state", state.to_string()),
        ];
        if !self.scopes.is_empty() {
            params.push(("scope", self.scopes.join(" ")));
        }

        Url::parse_with_params(&self.auth_url, &params)
            .with_context(|| format!("Invalid auth url: {}", self.auth_url))
    }
}

/// Run the browser flow and return an access token.
///
/// `input` is read for the in-app approval step; pass stdin. Resolving
/// `shutdown` abandons the flow with [`ExportError::Cancelled`] and closes the
/// redirect listener.
pub async fn exchange<R, S>(cfg: &Config, input: R, shutdown: S) -> Result<SecretString>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    cfg.validate().context("invalid oauth2 config")?;

    let listener = TcpListener::bind(LOOPBACK_ADDR)
        .await
        .with_context(|| format!("Failed to listen on {LOOPBACK_ADDR}"))?;

    exchange_on(cfg, listener, REDIRECT_URI, input, open_browser, shutdown).await
}

pub(crate) async fn exchange_on<R, O, S>(
    cfg: &Config,
    listener: TcpListener,
    redirect_uri: &str,
    input: R,
    open: O,
    shutdown: S,
) -> Result<SecretString>
where
    R: AsyncBufRead + Unpin,
    O: FnOnce(&str) -> std::io::Result<()>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let state = uuid::Uuid::new_v4().to_string();
    let login_url = cfg.authorization_url(redirect_uri, &state)?;

    let (ready_tx, ready_rx) = oneshot::channel();
    let authorize = async {
        tokio::try_join!(
            receive_code(listener, state, login_url.to_string(), ready_tx),
            login_with_browser(ready_rx, open),
        )
    };
    // Dropping `authorize` on shutdown drops the listener with it.
    let authorized = tokio::select! {
        biased;
        () = &mut shutdown => Err(anyhow::Error::new(ExportError::Cancelled)),
        result = authorize => result,
    };
    let (code, ()) = authorized.context("authorization error")?;

    let token = exchange_code(cfg, redirect_uri, &code)
        .await
        .context("could not get oauth token")?;
    tracing::debug!("exchanged oauth token");

    if cfg.wait_for_approval_in_app {
        let approved = tokio::select! {
            biased;
            () = &mut shutdown => Err(anyhow::Error::new(ExportError::Cancelled)),
            result = wait_for_approval_in_app(input) => result,
        };
        approved.context("failed waiting for app approval")?;
    }

    Ok(token)
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

type CallbackResult = std::result::Result<String, String>;

struct Callback {
    state: String,
    result: Mutex<Option<CallbackResult>>,
    done: Notify,
}

impl Callback {
    fn resolve(&self, params: CallbackParams) -> CallbackResult {
        if let Some(error) = params.error {
            return Err(match params.error_description {
                Some(description) => format!("{error}: {description}"),
                None => error,
            });
        }
        if params.state.as_deref() != Some(self.state.as_str()) {
            return Err("state mismatch in redirect".to_string());
        }
        params
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| "missing authorization code in redirect".to_string())
    }
}

async fn callback_handler(
    State(callback): State<Arc<Callback>>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, &'static str) {
    let result = callback.resolve(params);
    let reply = match result {
        Ok(_) => (
            StatusCode::OK,
            "Authorization complete. You can close this window.",
        ),
        Err(_) => (StatusCode::BAD_REQUEST, "Authorization failed."),
    };

    {
        let mut slot = callback
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // First callback wins.
        if slot.is_none() {
            *slot = Some(result);
        }
    }
    callback.done.notify_one();
    reply
}

/// Serve the redirect until a callback arrives, then shut down gracefully so
/// the browser still gets its reply.
async fn receive_code(
    listener: TcpListener,
    state: String,
    login_url: String,
    ready: oneshot::Sender<String>,
) -> Result<String> {
    let callback = Arc::new(Callback {
        state,
        result: Mutex::new(None),
        done: Notify::new(),
    });
    let app = Router::new()
        .route("/", get(callback_handler))
        .with_state(callback.clone());

    if let Ok(addr) = listener.local_addr() {
        tracing::debug!(addr = %addr, "oauth redirect listener ready");
    }
    let _ = ready.send(login_url);

    let shutdown = callback.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.done.notified().await })
        .await
        .context("redirect listener stopped")?;

    let result = callback
        .result
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match result {
        Some(Ok(code)) => Ok(code),
        Some(Err(err)) => anyhow::bail!("authorization denied: {err}"),
        None => anyhow::bail!("redirect listener stopped before a callback arrived"),
    }
}

async fn login_with_browser<O>(ready: oneshot::Receiver<String>, open: O) -> Result<()>
where
    O: FnOnce(&str) -> std::io::Result<()>,
{
    let login_url = ready
        .await
        .context("redirect listener closed before it was ready")?;

    tracing::info!("you will be redirected to your web browser to complete the login process");
    tracing::info!("if the page did not open automatically, open this URL manually: {login_url}");

    if let Err(err) = open(&login_url) {
        tracing::warn!(err = %err, "could not open browser");
    }
    Ok(())
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

async fn exchange_code(cfg: &Config, redirect_uri: &str, code: &str) -> Result<SecretString> {
    let http = crate::api::http_client(std::time::Duration::ZERO)
        .context("Failed to build HTTP client")?;

    let response = http
        .post(&cfg.token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", cfg.client_id.as_str()),
            ("client_secret", cfg.client_secret.expose_secret()),
        ])
        .send()
        .await
        .with_context(|| format!("POST {}", cfg.token_url))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("token endpoint returned HTTP {}: {}", status.as_u16(), body.trim());
    }

    let token: TokenResponse = response
        .json()
        .await
        .context("Failed to decode token response")?;
    Ok(SecretString::from(token.access_token))
}

async fn wait_for_approval_in_app<R>(mut input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    tracing::info!("please open your app and approve this application to access your account");
    tracing::info!("press Enter once you have approved the application...");

    let mut line = String::new();
    input
        .read_line(&mut line)
        .await
        .context("failed to read user input")?;
    Ok(())
}

/// Open `url` with the platform's default handler.
pub fn open_browser(url: &str) -> std::io::Result<()> {
    use std::process::{Command, Stdio};

    #[cfg(target_os = "macos")]
    let mut command = {
        let mut command = Command::new("open");
        command.arg(url);
        command
    };
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", "", url]);
        command
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut command = {
        let mut command = Command::new("xdg-open");
        command.arg(url);
        command
    };

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}
