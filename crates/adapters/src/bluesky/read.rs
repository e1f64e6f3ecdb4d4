//! Bluesky read adapter for fetching an account's posts

use async_trait::async_trait;
use echopost_domain::{PostSource, PostSourceError, SourcePost};
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{BlueskySession, POST_COLLECTION};

/// Largest page `com.atproto.repo.listRecords` serves
const PAGE_LIMIT: usize = 100;

/// Post source reading `app.bsky.feed.post` records from an account's repo
pub struct BlueskyPostSource {
    session: Arc<BlueskySession>,
}

impl BlueskyPostSource {
    pub fn new(session: Arc<BlueskySession>) -> Self {
        Self { session }
    }

    async fn resolve_handle(&self, handle: &str) -> Result<String, PostSourceError> {
        let resolved: ResolveHandleResponse = self
            .session
            .get(
                "com.atproto.identity.resolveHandle",
                &[("handle", handle.to_string())],
            )
            .await?;

        tracing::debug!(handle = %handle, did = %resolved.did, "Resolved handle");
        Ok(resolved.did)
    }

    async fn list_page(
        &self,
        did: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ListRecordsResponse, PostSourceError> {
        let mut query = vec![
            ("repo", did.to_string()),
            ("collection", POST_COLLECTION.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        Ok(self
            .session
            .get("com.atproto.repo.listRecords", &query)
            .await?)
    }
}

#[derive(Deserialize)]
struct ResolveHandleResponse {
    did: String,
}

#[derive(Deserialize)]
struct ListRecordsResponse {
    #[serde(default)]
    records: Vec<Record>,
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct Record {
    uri: String,
    value: PostValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostValue {
    #[serde(default)]
    text: String,
    created_at: Option<String>,
}

#[async_trait]
impl PostSource for BlueskyPostSource {
    async fn fetch_posts(
        &self,
        handle: &str,
        max_posts: usize,
    ) -> Result<Vec<SourcePost>, PostSourceError> {
        tracing::info!(handle = %handle, max_posts, "Fetching posts from Bluesky");

        let did = self.resolve_handle(handle).await?;

        let mut posts = Vec::new();
        let mut cursor: Option<String> = None;

        while posts.len() < max_posts {
            let limit = (max_posts - posts.len()).min(PAGE_LIMIT);
            let page = self.list_page(&did, limit, cursor.as_deref()).await?;

            tracing::debug!(
                records = page.records.len(),
                cursor = ?page.cursor,
                "Fetched page of records"
            );

            if page.records.is_empty() {
                break;
            }

            posts.extend(page.records.into_iter().map(|record| {
                let created_at = record
                    .value
                    .created_at
                    .as_deref()
                    .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
                    .unwrap_or_else(OffsetDateTime::now_utc);

                SourcePost {
                    id: record.uri,
                    author_handle: handle.to_string(),
                    text: record.value.text,
                    created_at,
                }
            }));

            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        posts.truncate(max_posts);

        tracing::info!(handle = %handle, count = posts.len(), "Fetched posts");

        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluesky::tests::{credentials, mount_login};
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_resolve(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/xrpc/com.atproto.identity.resolveHandle"))
            .and(query_param("handle", "source.bsky.social"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "did": "did:plc:source" })),
            )
            .mount(server)
            .await;
    }

    fn record(n: u32) -> serde_json::Value {
        serde_json::json!({
            "uri": format!("at://did:plc:source/app.bsky.feed.post/{n}"),
            "cid": "bafyrei",
            "value": {
                "$type": "app.bsky.feed.post",
                "text": format!("post number {n}"),
                "createdAt": "2024-05-01T09:00:00.000Z"
            }
        })
    }

    fn source(server: &MockServer) -> BlueskyPostSource {
        BlueskyPostSource::new(Arc::new(BlueskySession::new(
            server.uri(),
            credentials("app-pass"),
        )))
    }

    #[tokio::test]
    async fn test_fetch_posts_follows_cursor() {
        let server = MockServer::start().await;
        mount_login(&server, "token").await;
        mount_resolve(&server).await;

        Mock::given(method("GET"))
            .and(path("/xrpc/com.atproto.repo.listRecords"))
            .and(query_param("repo", "did:plc:source"))
            .and(query_param("collection", "app.bsky.feed.post"))
            .and(query_param_is_missing("cursor"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "records": [record(3), record(2)],
                "cursor": "page-2"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/xrpc/com.atproto.repo.listRecords"))
            .and(query_param("cursor", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "records": [record(1)]
            })))
            .mount(&server)
            .await;

        let posts = source(&server)
            .fetch_posts("source.bsky.social", 100)
            .await
            .unwrap();

        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].text, "post number 3");
        assert_eq!(posts[2].id, "at://did:plc:source/app.bsky.feed.post/1");
        assert_eq!(posts[0].author_handle, "source.bsky.social");
        assert_eq!(posts[0].created_at.year(), 2024);
    }

    #[tokio::test]
    async fn test_fetch_posts_stops_at_max() {
        let server = MockServer::start().await;
        mount_login(&server, "token").await;
        mount_resolve(&server).await;

        Mock::given(method("GET"))
            .and(path("/xrpc/com.atproto.repo.listRecords"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "records": [record(9), record(8)],
                "cursor": "more"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let posts = source(&server)
            .fetch_posts("source.bsky.social", 2)
            .await
            .unwrap();

        assert_eq!(posts.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_posts_auth_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "AuthenticationRequired",
                "message": "Invalid identifier or password"
            })))
            .mount(&server)
            .await;

        let result = source(&server).fetch_posts("source.bsky.social", 100).await;

        assert!(matches!(result, Err(PostSourceError::Auth(_))));
    }

    #[tokio::test]
    async fn test_fetch_posts_rate_limited() {
        let server = MockServer::start().await;
        mount_login(&server, "token").await;

        Mock::given(method("GET"))
            .and(path("/xrpc/com.atproto.identity.resolveHandle"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": "RateLimitExceeded",
                "message": "Rate Limit Exceeded"
            })))
            .mount(&server)
            .await;

        let result = source(&server).fetch_posts("source.bsky.social", 100).await;

        assert!(matches!(result, Err(PostSourceError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_unknown_handle_is_api_error() {
        let server = MockServer::start().await;
        mount_login(&server, "token").await;

        Mock::given(method("GET"))
            .and(path("/xrpc/com.atproto.identity.resolveHandle"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "InvalidRequest",
                "message": "Unable to resolve handle"
            })))
            .mount(&server)
            .await;

        let result = source(&server).fetch_posts("nobody.bsky.social", 100).await;

        match result {
            Err(PostSourceError::Api(msg)) => assert!(msg.contains("Unable to resolve handle")),
            other => panic!("expected api error, got {other:?}"),
        }
    }
}
