//! Domain models and value objects

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use time::OffsetDateTime;

/// A post fetched from the source account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePost {
    /// Platform-specific post ID (an at-uri on Bluesky)
    pub id: String,
    /// Handle of the account that wrote the post
    pub author_handle: String,
    /// Raw post text
    pub text: String,
    /// When the post was created
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Process-wide bot settings, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSettings {
    /// Account whose posts are used as stylistic input
    pub source_handle: String,
    /// Account that receives generated posts
    pub destination_handle: String,
    /// Maximum characters of a generated post
    pub char_limit: usize,
    /// Language model used for generation
    pub model_name: String,
    /// Generate and validate, but never publish
    pub dry_run: bool,
    /// Social service host (PDS) URL
    pub host_url: String,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            source_handle: String::new(),
            destination_handle: String::new(),
            char_limit: 280,
            model_name: "llama3.2".to_string(),
            dry_run: false,
            host_url: "https://bsky.social".to_string(),
        }
    }
}

/// Input handed to the generation port
#[derive(Debug, Clone)]
pub struct GenerateInput {
    /// Cleaned source texts, newest first
    pub samples: Vec<String>,
    /// Character limit the generated post must respect
    pub char_limit: usize,
    /// Model name to generate with
    pub model: String,
}

/// One charge against the host's points budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub timestamp: OffsetDateTime,
    pub points: u32,
}

/// Answer to "may I publish now"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Zero when allowed
    pub wait: Duration,
}

impl RateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            wait: Duration::ZERO,
        }
    }

    pub fn deny(wait: Duration) -> Self {
        Self {
            allowed: false,
            wait,
        }
    }
}

/// Snapshot of budget usage, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateUsage {
    pub hourly_points: u32,
    pub hourly_limit: u32,
    pub daily_points: u32,
    pub daily_limit: u32,
}

/// Identifier of a violated validation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Empty,
    TooShort,
    TooLong,
    Repetitive,
    Placeholder,
    ExcessivePunctuation,
    AllCaps,
    TooManyUrls,
    BareUrl,
    Spam,
    Harmful,
    ErrorMessage,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooShort => "too_short",
            Self::TooLong => "too_long",
            Self::Repetitive => "repetitive",
            Self::Placeholder => "placeholder",
            Self::ExcessivePunctuation => "excessive_punctuation",
            Self::AllCaps => "all_caps",
            Self::TooManyUrls => "too_many_urls",
            Self::BareUrl => "bare_url",
            Self::Spam => "spam",
            Self::Harmful => "harmful",
            Self::ErrorMessage => "error_message",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one candidate post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub accepted: bool,
    pub reasons: BTreeSet<RejectionReason>,
}

impl Verdict {
    pub fn from_reasons(reasons: BTreeSet<RejectionReason>) -> Self {
        Self {
            accepted: reasons.is_empty(),
            reasons,
        }
    }

    pub fn rejects(&self, reason: RejectionReason) -> bool {
        self.reasons.contains(&reason)
    }
}

/// Stage of a cycle that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Authentication,
    Fetch,
    Generation,
    Publish,
}

impl std::fmt::Display for CycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Authentication => "authentication",
            Self::Fetch => "fetch",
            Self::Generation => "generation",
            Self::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Result of one fetch → generate → validate → publish cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Post was published to the destination account
    Published { uri: String, text: String },
    /// Everything passed but dry-run skipped the publish
    DryRun { text: String },
    /// Validator rejected the candidate
    Rejected {
        text: String,
        reasons: BTreeSet<RejectionReason>,
    },
    /// Budget exhausted; publish deferred
    RateLimited { wait: Duration },
    /// Source account yielded nothing usable
    NoSourceMaterial,
    /// A stage failed; the loop continues next cycle
    Failed { stage: CycleStage, error: String },
}
