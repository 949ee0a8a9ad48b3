//! Authenticated request client.
//!
//! Every call reads the session store, attaches `Authorization: Bearer` when an
//! access token exists, and on a 401 refreshes the access token once and
//! replays the original request. Refreshes are single-flight: concurrent 401s
//! queue behind one gate and only the first caller talks to the refresh
//! endpoint; the rest find the token already replaced and simply replay.

pub mod request;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::{AgentAnswer, User};
use crate::session::{Session, SessionStore};

pub use request::{PendingRequest, RequestBody, RequestOptions};

/// Authentication state observed by the view layer. `Expired` is the signal
/// to send the user back to the login screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthState {
    Anonymous,
    Authenticated,
    Expired,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    token_path: String,
    refresh_path: String,
    log_bodies: bool,
    store: Arc<dyn SessionStore>,
    refresh_gate: Mutex<()>,
    state: watch::Sender<AuthState>,
}

/// Cheap to clone; clones share the session, the refresh gate and the state channel
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: &ClientConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        let base_url = Url::parse(&config.api.base_url)
            .map_err(|e| ClientError::config(format!("invalid API URL '{}': {}", config.api.base_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.api.connect_timeout_secs))
            .user_agent(concat!("juris/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::config(format!("failed to build HTTP client: {}", e)))?;

        let initial = match store.get()? {
            Some(_) => AuthState::Authenticated,
            None => AuthState::Anonymous,
        };
        let (state, _) = watch::channel(initial);

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                token_path: config.api.token_path.clone(),
                refresh_path: config.api.refresh_path.clone(),
                log_bodies: config.logging.log_http_bodies,
                store,
                refresh_gate: Mutex::new(()),
                state,
            }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn session(&self) -> Result<Option<Session>> {
        self.inner.store.get()
    }

    pub fn auth_state(&self) -> AuthState {
        *self.inner.state.borrow()
    }

    /// Follow authentication state changes
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Resolve a path against the base URL, keeping any base path prefix
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        let joined = format!("{}/{}", base, path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| ClientError::config(format!("invalid path '{}': {}", path, e)))
    }

    /// Issue a request with transparent session refresh
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
        options: Option<RequestOptions>,
    ) -> Result<Response> {
        let mut pending = PendingRequest::new(method, path).options(options.unwrap_or_default());
        pending.body = body;
        self.execute(pending).await
    }

    /// Run a pending request through the refresh protocol:
    /// PENDING -> DONE, or 401 -> REFRESHING -> PENDING (retried) -> DONE | FAILED
    pub async fn execute(&self, mut pending: PendingRequest) -> Result<Response> {
        loop {
            let sent_token = if pending.options.anonymous {
                None
            } else {
                self.inner.store.get()?.map(|s| s.access_token)
            };

            let url = self.endpoint(&pending.path)?;
            if self.inner.log_bodies {
                tracing::debug!("{} {} body={}", pending.method, url, pending.describe_body());
            }

            let response = pending
                .build(&self.inner.http, url, sent_token.as_deref())?
                .send()
                .await?;
            let status = response.status();
            tracing::debug!(
                "{} {} -> {} (retried: {})",
                pending.method,
                pending.path,
                status,
                pending.is_retried()
            );

            if status.is_success() {
                return Ok(response);
            }

            if status != StatusCode::UNAUTHORIZED {
                return Err(error_from_response(response).await);
            }

            if pending.options.anonymous {
                let body = response.text().await.unwrap_or_default();
                return Err(ClientError::InvalidCredentials(crate::error::extract_detail(&body)));
            }

            if !pending.mark_retried() {
                // A freshly refreshed token was rejected too; the session is unusable
                return Err(self.expire("access token rejected after refresh"));
            }

            self.recover(sent_token.as_deref()).await?;
        }
    }

    /// Make sure the store holds a token newer than `rejected`, refreshing it
    /// if nobody else has.
    async fn recover(&self, rejected: Option<&str>) -> Result<()> {
        let _gate = self.inner.refresh_gate.lock().await;

        let Some(session) = self.inner.store.get()? else {
            self.inner.state.send_replace(AuthState::Expired);
            return Err(ClientError::auth_expired("no session to refresh"));
        };

        if Some(session.access_token.as_str()) != rejected {
            tracing::debug!("Access token already replaced by a concurrent refresh");
            return Ok(());
        }

        let Some(refresh_token) = session.refresh_token.as_deref() else {
            return Err(self.expire("no refresh token available"));
        };

        match self.call_refresh(refresh_token).await {
            Ok(tokens) => {
                if tokens.refresh_token.is_some() {
                    tracing::debug!("Server rotated the refresh token");
                }
                let renewed = session.refreshed(tokens.access_token, tokens.refresh_token);
                self.inner.store.set(&renewed)?;
                self.inner.state.send_replace(AuthState::Authenticated);
                tracing::info!("Access token refreshed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                Err(self.expire(&format!("refresh failed: {}", e)))
            }
        }
    }

    /// Exchange the stored refresh token for a new access token now
    pub async fn refresh_session(&self) -> Result<()> {
        let current = self.inner.store.get()?.map(|s| s.access_token);
        if current.is_none() {
            return Err(ClientError::auth_expired("not logged in"));
        }
        self.recover(current.as_deref()).await
    }

    async fn call_refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let url = self.endpoint(&self.inner.refresh_path)?;
        let response = self
            .inner
            .http
            .post(url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        decode(response).await
    }

    /// Terminal auth failure: drop the session and tell the view to go to login
    fn expire(&self, reason: &str) -> ClientError {
        if let Err(e) = self.inner.store.clear() {
            tracing::error!("Failed to clear session store: {}", e);
        }
        self.inner.state.send_replace(AuthState::Expired);
        tracing::warn!("Session expired: {}", reason);
        ClientError::auth_expired(reason)
    }

    /// Exchange credentials for a session and return the logged-in user
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let form = vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ];
        let pending = PendingRequest::new(Method::POST, self.inner.token_path.clone())
            .body(RequestBody::Form(form))
            .options(RequestOptions::anonymous());

        let response = self.execute(pending).await?;
        let tokens: TokenResponse = decode(response).await?;

        self.inner
            .store
            .set(&Session::new(tokens.access_token, tokens.refresh_token))?;
        self.inner.state.send_replace(AuthState::Authenticated);
        tracing::info!("Logged in as {}", username);

        self.current_user().await
    }

    pub fn logout(&self) -> Result<()> {
        self.inner.store.clear()?;
        self.inner.state.send_replace(AuthState::Anonymous);
        tracing::info!("Logged out");
        Ok(())
    }

    /// Validate a persisted session at startup. Auth and validation failures
    /// drop the session; transport failures leave it in place.
    pub async fn restore(&self) -> Result<Option<User>> {
        if self.inner.store.get()?.is_none() {
            return Ok(None);
        }

        match self.current_user().await {
            Ok(user) => Ok(Some(user)),
            Err(e @ ClientError::Transient { .. }) => Err(e),
            Err(e) => {
                tracing::warn!("Discarding stored session: {}", e);
                self.inner.store.clear()?;
                if !e.requires_login() {
                    self.inner.state.send_replace(AuthState::Anonymous);
                }
                Ok(None)
            }
        }
    }

    pub async fn current_user(&self) -> Result<User> {
        self.get_json("/users/me", RequestOptions::default()).await
    }

    /// Ask the legal agent a question, optionally with earlier turns
    pub async fn ask(&self, question: &str, history: &[String]) -> Result<AgentAnswer> {
        let mut body = json!({ "question": question });
        if !history.is_empty() {
            body["history"] = json!(history);
        }
        self.send_json(Method::POST, "/ask", Some(body)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        let response = self.request(Method::GET, path, None, Some(options)).await?;
        decode(response).await
    }

    pub async fn send_json<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T> {
        let response = self.request(method, path, body.map(RequestBody::Json), None).await?;
        decode(response).await
    }

    /// For endpoints that answer 204 or an ignorable body
    pub async fn send_empty(&self, method: Method, path: &str, body: Option<Value>) -> Result<()> {
        self.request(method, path, body.map(RequestBody::Json), None).await?;
        Ok(())
    }
}

async fn error_from_response(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ClientError::from_status(status, &body)
}

/// Decode a JSON body, keeping a short excerpt of it on failure
pub async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        let excerpt: String = text.chars().take(200).collect();
        ClientError::decode(format!("{} in '{}'", e, excerpt))
    })
}
