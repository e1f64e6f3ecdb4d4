//! Bluesky (AT Protocol) adapters
//!
//! Both adapters talk XRPC over plain HTTP against the account's PDS. A
//! `BlueskySession` logs in lazily with an app password and keeps the access
//! token until the server reports it expired or invalid.

mod read;
mod write;

pub use read::BlueskyPostSource;
pub use write::BlueskyPublisher;

use async_trait::async_trait;
use echopost_domain::{PostSourceError, PublishError, PublishResult, Publisher};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use time::OffsetDateTime;

const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Handle and app password of one account
#[derive(Debug, Clone)]
pub struct BlueskyCredentials {
    pub identifier: String,
    pub password: SecretString,
}

impl BlueskyCredentials {
    pub fn new(identifier: impl Into<String>, password: SecretString) -> Self {
        Self {
            identifier: identifier.into(),
            password,
        }
    }
}

/// Tokens returned by `createSession` and `refreshSession`
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    refresh_jwt: String,
    did: String,
    handle: String,
}

/// Failure of a single XRPC exchange
#[derive(Debug, thiserror::Error)]
enum XrpcError {
    #[error("Authentication failed: {0}")]
    Auth(String),
    /// Access token expired or revoked; a fresh login may succeed
    #[error("Session expired: {0}")]
    SessionExpired(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<Duration>),
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error: {0}")]
    Api(String),
}

#[derive(Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl From<XrpcError> for PostSourceError {
    fn from(error: XrpcError) -> Self {
        match error {
            XrpcError::Auth(msg) | XrpcError::SessionExpired(msg) => PostSourceError::Auth(msg),
            XrpcError::RateLimited(after) => PostSourceError::RateLimited(after),
            XrpcError::Network(msg) => PostSourceError::Network(msg),
            XrpcError::Api(msg) => PostSourceError::Api(msg),
        }
    }
}

impl From<XrpcError> for PublishError {
    fn from(error: XrpcError) -> Self {
        match error {
            XrpcError::Auth(msg) | XrpcError::SessionExpired(msg) => PublishError::Auth(msg),
            XrpcError::RateLimited(_) => PublishError::RateLimited,
            XrpcError::Network(msg) => PublishError::Network(msg),
            XrpcError::Api(msg) => PublishError::Api(msg),
        }
    }
}

/// Authenticated XRPC client for one account
pub struct BlueskySession {
    client: Client,
    host_url: String,
    credentials: BlueskyCredentials,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl BlueskySession {
    pub fn new(host_url: impl Into<String>, credentials: BlueskyCredentials) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            host_url: host_url.into().trim_end_matches('/').to_string(),
            credentials,
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.credentials.identifier
    }

    fn url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.host_url, nsid)
    }

    /// Current session, logging in first if there is none
    async fn session(&self) -> Result<Session, XrpcError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let session = self.login().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn login(&self) -> Result<Session, XrpcError> {
        tracing::debug!(identifier = %self.credentials.identifier, "Logging in to Bluesky");

        let body = serde_json::json!({
            "identifier": self.credentials.identifier,
            "password": self.credentials.password.expose_secret(),
        });

        let response = self
            .client
            .post(self.url("com.atproto.server.createSession"))
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let session: Session = match read_json(response).await {
            Ok(session) => session,
            // Bad credentials come back as 401 AuthenticationRequired or 400
            // AccountNotFound / InvalidRequest
            Err(XrpcError::Api(msg) | XrpcError::SessionExpired(msg))
                if status.is_client_error() =>
            {
                return Err(XrpcError::Auth(msg));
            }
            Err(e) => return Err(e),
        };

        tracing::info!(handle = %session.handle, did = %session.did, "Logged in to Bluesky");
        Ok(session)
    }

    /// Trade the refresh token for new tokens without resending the password
    async fn refresh(&self, stale: &Session) -> Result<Session, XrpcError> {
        let response = self
            .client
            .post(self.url("com.atproto.server.refreshSession"))
            .bearer_auth(&stale.refresh_jwt)
            .send()
            .await
            .map_err(network_error)?;

        let session: Session = read_json(response).await?;
        tracing::info!(handle = %session.handle, "Refreshed Bluesky session");
        Ok(session)
    }

    /// Replace an expired session; a failed refresh falls back to a full login
    async fn renew(&self, stale: &Session) {
        match self.refresh(stale).await {
            Ok(fresh) => *self.session.lock().await = Some(fresh),
            Err(e) => {
                tracing::warn!(error = %e, "Session refresh failed, logging in again");
                self.invalidate().await;
            }
        }
    }

    async fn invalidate(&self) {
        *self.session.lock().await = None;
    }

    /// Send an authorized request, renewing the session once if the token expired
    async fn call<T, F>(&self, build: F) -> Result<T, XrpcError>
    where
        T: DeserializeOwned,
        F: Fn(&Session) -> RequestBuilder + Send + Sync,
    {
        let mut relogged = false;
        loop {
            let session = self.session().await?;
            let response = build(&session)
                .bearer_auth(&session.access_jwt)
                .send()
                .await
                .map_err(network_error)?;

            match read_json(response).await {
                Err(XrpcError::SessionExpired(msg)) => {
                    tracing::warn!(error = %msg, "Bluesky session expired");
                    if relogged {
                        self.invalidate().await;
                        return Err(XrpcError::Auth(msg));
                    }
                    self.renew(&session).await;
                    relogged = true;
                }
                other => return other,
            }
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        nsid: &str,
        query: &[(&str, String)],
    ) -> Result<T, XrpcError> {
        let url = self.url(nsid);
        self.call(|_| self.client.get(&url).query(query)).await
    }

    async fn post<B, T>(&self, nsid: &str, body: B) -> Result<T, XrpcError>
    where
        B: Fn(&Session) -> serde_json::Value + Send + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(nsid);
        self.call(|session| self.client.post(&url).json(&body(session)))
            .await
    }

    /// DID of the logged-in account
    #[cfg(test)]
    async fn did(&self) -> Result<String, XrpcError> {
        Ok(self.session().await?.did)
    }
}

fn network_error(e: reqwest::Error) -> XrpcError {
    if e.is_timeout() {
        XrpcError::Network(format!("timeout: {e}"))
    } else {
        XrpcError::Network(e.to_string())
    }
}

/// Map the response status and XRPC error code, then decode the body
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, XrpcError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| XrpcError::Api(format!("invalid response body: {e}")));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .map(|reset| {
                let now = OffsetDateTime::now_utc().unix_timestamp();
                Duration::from_secs(reset.saturating_sub(now).max(0) as u64)
            });
        return Err(XrpcError::RateLimited(retry_after));
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: Option<XrpcErrorBody> = serde_json::from_str(&body).ok();
    let code = parsed.as_ref().and_then(|b| b.error.clone()).unwrap_or_default();
    let message = parsed
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.clone());
    let detail = format!("{status} {code}: {message}");

    match (status, code.as_str()) {
        (_, "ExpiredToken" | "InvalidToken") => Err(XrpcError::SessionExpired(detail)),
        (StatusCode::UNAUTHORIZED, _) => Err(XrpcError::SessionExpired(detail)),
        (StatusCode::FORBIDDEN, _) => Err(XrpcError::Auth(detail)),
        _ => Err(XrpcError::Api(detail)),
    }
}

/// Publisher standing in for the destination account during dry runs
#[derive(Default)]
pub struct StubPublisher {
    calls: AtomicUsize,
}

impl StubPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Publisher for StubPublisher {
    async fn publish(&self, text: &str) -> Result<PublishResult, PublishError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(chars = text.chars().count(), "Stub publish");

        Ok(PublishResult {
            uri: format!("at://stub/app.bsky.feed.post/{n}"),
            cid: None,
        })
    }
}
