//! Bluesky write adapter for publishing posts

use async_trait::async_trait;
use echopost_domain::{PublishError, PublishResult, Publisher};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{BlueskySession, POST_COLLECTION};

/// Publisher creating `app.bsky.feed.post` records in the logged-in account
pub struct BlueskyPublisher {
    session: Arc<BlueskySession>,
}

impl BlueskyPublisher {
    pub fn new(session: Arc<BlueskySession>) -> Self {
        Self { session }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostRecord<'a> {
    #[serde(rename = "$type")]
    record_type: &'static str,
    text: &'a str,
    created_at: String,
    langs: [&'static str; 1],
}

#[derive(Deserialize)]
struct CreateRecordResponse {
    uri: String,
    cid: Option<String>,
}

#[async_trait]
impl Publisher for BlueskyPublisher {
    async fn publish(&self, text: &str) -> Result<PublishResult, PublishError> {
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| PublishError::Api(format!("Failed to format timestamp: {e}")))?;

        let record = serde_json::to_value(PostRecord {
            record_type: POST_COLLECTION,
            text,
            created_at,
            langs: ["en"],
        })
        .map_err(|e| PublishError::Api(e.to_string()))?;

        let response: CreateRecordResponse = self
            .session
            .post("com.atproto.repo.createRecord", |session| {
                serde_json::json!({
                    "repo": session.did,
                    "collection": POST_COLLECTION,
                    "record": record,
                })
            })
            .await?;

        tracing::debug!(
            identifier = %self.session.identifier(),
            uri = %response.uri,
            "Created post record"
        );

        Ok(PublishResult {
            uri: response.uri,
            cid: response.cid,
        })
    }
}
