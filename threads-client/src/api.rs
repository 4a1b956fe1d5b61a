use crate::ReplySender;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use replyflow_core::{Comment, CoreError, SentReply, ThreadsApiError};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const THREADS_API_BASE: &str = "https://graph.threads.net/v1.0";

const COMMENT_FIELDS: &str = "id,text,timestamp,username";
const POST_FIELDS: &str = "id,text,permalink,timestamp,username,media_type";
const PROFILE_FIELDS: &str = "id,username,name";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsListing<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    pub paging: Option<ThreadsPaging>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsPaging {
    pub cursors: Option<ThreadsCursors>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsCursors {
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsCommentData {
    pub id: String,
    pub text: Option<String>,
    pub username: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsPostData {
    pub id: String,
    pub text: Option<String>,
    pub permalink: Option<String>,
    pub timestamp: Option<String>,
    pub username: Option<String>,
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsProfile {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreationResponse {
    id: Option<String>,
}

#[derive(Debug)]
pub struct ThreadsApiClient {
    http_client: Client,
    access_token: String,
}

impl ThreadsApiClient {
    pub fn new(access_token: String) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            access_token,
        }
    }

    async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        query_params: Option<&[(&str, &str)]>,
        body: Option<serde_json::Value>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", THREADS_API_BASE, endpoint);

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(&self.access_token);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }
        if let Some(payload) = body {
            request_builder = request_builder.json(&payload);
        }

        debug!("Making Threads API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::ThreadsApi(ThreadsApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!("Rate limited, retry after {} seconds", retry_after);
                Err(CoreError::ThreadsApi(ThreadsApiError::RateLimitExceeded {
                    retry_after,
                }))
            }
            401 => Err(CoreError::ThreadsApi(ThreadsApiError::InvalidToken)),
            403 => Err(CoreError::ThreadsApi(ThreadsApiError::Forbidden {
                resource: endpoint.to_string(),
            })),
            404 => Err(CoreError::ThreadsApi(ThreadsApiError::InvalidResponse {
                details: "Resource not found".to_string(),
            })),
            code if status.is_server_error() => {
                Err(CoreError::ThreadsApi(ThreadsApiError::ServerError {
                    status_code: code,
                }))
            }
            code => Err(CoreError::ThreadsApi(ThreadsApiError::InvalidResponse {
                details: format!("Unexpected status {code} for {endpoint}"),
            })),
        }
    }

    /// Fetches the top-level replies of a post, oldest first as the
    /// Graph API returns them.
    pub async fn get_post_comments(&self, post_id: &str) -> Result<Vec<Comment>, CoreError> {
        let endpoint = format!("/{post_id}/replies");
        let response = self
            .make_request(Method::GET, &endpoint, Some(&[("fields", COMMENT_FIELDS)]), None)
            .await?;

        let listing: ThreadsListing<ThreadsCommentData> = response.json().await.map_err(|e| {
            error!("Failed to parse comments: {}", e);
            CoreError::ThreadsApi(ThreadsApiError::InvalidResponse {
                details: format!("Failed to parse comments for post {post_id}"),
            })
        })?;

        info!(
            "Retrieved {} comments for post {}",
            listing.data.len(),
            post_id
        );
        Ok(listing.data.into_iter().map(Comment::from).collect())
    }

    pub async fn get_post_details(&self, post_id: &str) -> Result<ThreadsPostData, CoreError> {
        let endpoint = format!("/{post_id}");
        let response = self
            .make_request(Method::GET, &endpoint, Some(&[("fields", POST_FIELDS)]), None)
            .await?;

        let post: ThreadsPostData = response.json().await.map_err(|e| {
            error!("Failed to parse post details: {}", e);
            CoreError::ThreadsApi(ThreadsApiError::InvalidResponse {
                details: format!("Failed to parse details for post {post_id}"),
            })
        })?;

        debug!("Retrieved details for post {}", post_id);
        Ok(post)
    }

    pub async fn get_user_posts(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<ThreadsPostData>, CoreError> {
        let limit_str = limit.unwrap_or(25).to_string();
        let response = self
            .make_request(
                Method::GET,
                "/me/threads",
                Some(&[("fields", POST_FIELDS), ("limit", limit_str.as_str())]),
                None,
            )
            .await?;

        let listing: ThreadsListing<ThreadsPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse user posts: {}", e);
            CoreError::ThreadsApi(ThreadsApiError::InvalidResponse {
                details: "Failed to parse user posts".to_string(),
            })
        })?;

        info!("Retrieved {} user posts", listing.data.len());
        Ok(listing.data)
    }

    /// Scans the user's recent posts for a permalink containing the
    /// given URL slug. Returns `None` when nothing matches.
    pub async fn find_post_id_by_slug(&self, url_slug: &str) -> Result<Option<String>, CoreError> {
        let posts = self.get_user_posts(Some(100)).await?;

        for post in posts {
            if let Some(permalink) = &post.permalink {
                if permalink.contains(url_slug) {
                    return Ok(Some(post.id));
                }
            }
        }
        Ok(None)
    }

    pub async fn get_user_profile(&self) -> Result<ThreadsProfile, CoreError> {
        let response = self
            .make_request(Method::GET, "/me", Some(&[("fields", PROFILE_FIELDS)]), None)
            .await?;

        let profile: ThreadsProfile = response.json().await.map_err(|e| {
            error!("Failed to parse profile: {}", e);
            CoreError::ThreadsApi(ThreadsApiError::InvalidResponse {
                details: "Failed to parse user profile".to_string(),
            })
        })?;

        debug!("Retrieved profile for {}", profile.username);
        Ok(profile)
    }

    /// A token is valid iff the profile endpoint accepts it.
    pub async fn verify_access_token(&self) -> Result<ThreadsProfile, CoreError> {
        self.get_user_profile().await.map_err(|e| {
            warn!("Access token verification failed: {}", e);
            e
        })
    }

    /// Publishing a reply is a two-step flow: create the media
    /// container, then publish it.
    pub async fn publish_reply(&self, parent_id: &str, text: &str) -> Result<SentReply, CoreError> {
        debug!("Creating reply container for comment {}", parent_id);
        let create_body = serde_json::json!({
            "media_type": "TEXT",
            "text": text,
            "reply_to_id": parent_id,
        });
        let response = self
            .make_request(Method::POST, "/me/threads", None, Some(create_body))
            .await?;

        let creation: CreationResponse = response.json().await.map_err(|e| {
            error!("Failed to parse container response: {}", e);
            CoreError::ThreadsApi(ThreadsApiError::InvalidResponse {
                details: "Failed to parse reply container response".to_string(),
            })
        })?;
        let creation_id = creation.id.ok_or_else(|| {
            CoreError::ThreadsApi(ThreadsApiError::PublishFailed {
                details: "No container id returned".to_string(),
            })
        })?;

        debug!("Publishing reply container {}", creation_id);
        let publish_body = serde_json::json!({ "creation_id": creation_id });
        let response = self
            .make_request(Method::POST, "/me/threads_publish", None, Some(publish_body))
            .await?;

        let published: CreationResponse = response.json().await.map_err(|e| {
            error!("Failed to parse publish response: {}", e);
            CoreError::ThreadsApi(ThreadsApiError::InvalidResponse {
                details: "Failed to parse publish response".to_string(),
            })
        })?;
        let remote_id = published.id.ok_or_else(|| {
            CoreError::ThreadsApi(ThreadsApiError::PublishFailed {
                details: format!("Container {creation_id} was not published"),
            })
        })?;

        info!("Reply published to comment {}: {}", parent_id, remote_id);
        Ok(SentReply { remote_id })
    }
}

#[async_trait]
impl crate::CommentSource for ThreadsApiClient {
    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>, CoreError> {
        self.get_post_comments(post_id).await
    }
}

#[async_trait]
impl ReplySender for ThreadsApiClient {
    async fn send_reply(&self, target_comment_id: &str, text: &str) -> Result<SentReply, CoreError> {
        self.publish_reply(target_comment_id, text).await
    }
}

// The Graph API emits timestamps like "2024-06-01T10:00:00+0000",
// which rfc3339 parsing rejects (no colon in the offset).
fn parse_graph_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl From<ThreadsCommentData> for Comment {
    fn from(data: ThreadsCommentData) -> Self {
        Self {
            id: data.id,
            text: data.text.unwrap_or_default(),
            author: data.username.unwrap_or_else(|| "Unknown".to_string()),
            timestamp: data.timestamp.as_deref().and_then(parse_graph_timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_conversion() {
        let data = ThreadsCommentData {
            id: "17900000000000001".to_string(),
            text: Some("great post".to_string()),
            username: Some("alice".to_string()),
            timestamp: Some("2024-06-01T10:00:00+0000".to_string()),
        };

        let comment: Comment = data.into();
        assert_eq!(comment.id, "17900000000000001");
        assert_eq!(comment.text, "great post");
        assert_eq!(comment.author, "alice");
        assert!(comment.timestamp.is_some());
    }

    #[test]
    fn test_comment_conversion_fills_missing_fields() {
        let data = ThreadsCommentData {
            id: "1".to_string(),
            text: None,
            username: None,
            timestamp: None,
        };

        let comment: Comment = data.into();
        assert_eq!(comment.text, "");
        assert_eq!(comment.author, "Unknown");
        assert!(comment.timestamp.is_none());
    }

    #[test]
    fn test_parse_graph_timestamp_formats() {
        assert!(parse_graph_timestamp("2024-06-01T10:00:00+0000").is_some());
        assert!(parse_graph_timestamp("2024-06-01T10:00:00+00:00").is_some());
        assert!(parse_graph_timestamp("not a timestamp").is_none());
    }

    #[test]
    fn test_listing_parses_without_paging() {
        let json = r#"{"data":[{"id":"1","text":"hi"}]}"#;
        let listing: ThreadsListing<ThreadsCommentData> = serde_json::from_str(json).unwrap();
        assert_eq!(listing.data.len(), 1);
        assert!(listing.paging.is_none());
    }

    #[tokio::test]
    async fn test_api_client_creation() {
        let client = ThreadsApiClient::new("test-token".to_string());
        assert_eq!(client.access_token, "test-token");
    }
}
