//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{GenerateInput, SourcePost};

/// Error type for post source operations
#[derive(Debug, Error)]
pub enum PostSourceError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<std::time::Duration>),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
}

/// Port for fetching posts from the source account
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetch up to `max_posts` recent posts of `handle`, newest first
    async fn fetch_posts(
        &self,
        handle: &str,
        max_posts: usize,
    ) -> Result<Vec<SourcePost>, PostSourceError>;
}

/// Error type for generation operations
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Model service unreachable: {0}")]
    Unreachable(String),
    #[error("Model API error: {0}")]
    Api(String),
    #[error("Model returned an empty response")]
    Empty,
    #[error("Timeout")]
    Timeout,
}

/// Port for language-model text generation
///
/// Implementations perform exactly one request per call; retrying is the
/// caller's decision.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, input: GenerateInput) -> Result<String, GenerateError>;
}

/// Error type for publisher operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
}

/// Result of a successful publish operation
#[derive(Debug, Clone)]
pub struct PublishResult {
    /// Platform-specific post ID (at-uri on Bluesky)
    pub uri: String,
    /// Content hash/revision identifier, if the platform returns one
    pub cid: Option<String>,
}

/// Port for publishing to the destination account
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str) -> Result<PublishResult, PublishError>;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
