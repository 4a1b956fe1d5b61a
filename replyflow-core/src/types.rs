use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A Threads post under observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredPost {
    pub post_id: String,
    pub url: String,
    pub author: String,
    pub content: String,
    pub added_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl MonitoredPost {
    pub fn new(post_id: String, url: String, author: String, content: String) -> Self {
        Self {
            post_id,
            url,
            author,
            content,
            added_at: Utc::now(),
            last_checked: None,
        }
    }
}

/// A comment fetched from the comment source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One sent reply. Immutable once appended to a post's reply log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRecord {
    pub comment_id: String,
    pub comment_text: String,
    pub author: String,
    pub response_text: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-post reply bookkeeping.
///
/// Invariant: `reply_count == replies.len() == replied_comment_ids.len()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyState {
    #[serde(rename = "repliedComments")]
    pub replied_comment_ids: BTreeSet<String>,
    pub reply_count: u32,
    pub replies: Vec<ReplyRecord>,
    #[serde(rename = "lastReply")]
    pub last_reply_at: Option<DateTime<Utc>>,
}

/// A monitored post joined with its reply counters, as returned to
/// front-end consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredPostSummary {
    #[serde(flatten)]
    pub post: MonitoredPost,
    pub reply_count: u32,
    pub max_replies: u32,
}

/// One flattened reply-history entry, newest first in listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyHistoryEntry {
    pub post_id: String,
    pub post_url: String,
    pub comment_id: String,
    pub comment_text: String,
    pub author: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// Scheduler/engine status, a pure read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub running: bool,
    pub enabled: bool,
    pub interval_ms: u64,
    pub max_replies_per_post: u32,
    pub monitored_count: usize,
    pub total_replies: u64,
}

/// Identifier returned by the reply sender for a published reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentReply {
    pub remote_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitored_post_serialization_uses_camel_case() {
        let post = MonitoredPost::new(
            "17890123456789".to_string(),
            "https://threads.net/@someone/post/ABC123".to_string(),
            "someone".to_string(),
            "post body".to_string(),
        );

        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["postId"], "17890123456789");
        assert!(json.get("addedAt").is_some());
        assert!(json.get("lastChecked").is_some());
        assert!(json.get("post_id").is_none());
    }

    #[test]
    fn test_reply_state_wire_field_names() {
        let mut state = ReplyState::default();
        state.replied_comment_ids.insert("c1".to_string());
        state.reply_count = 1;
        state.replies.push(ReplyRecord {
            comment_id: "c1".to_string(),
            comment_text: "nice".to_string(),
            author: "alice".to_string(),
            response_text: "thanks!".to_string(),
            timestamp: Utc::now(),
        });
        state.last_reply_at = Some(Utc::now());

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["repliedComments"], serde_json::json!(["c1"]));
        assert_eq!(json["replyCount"], 1);
        assert_eq!(json["replies"][0]["responseText"], "thanks!");
        assert!(json.get("lastReply").is_some());
    }

    #[test]
    fn test_reply_state_round_trip() {
        let mut state = ReplyState::default();
        state.replied_comment_ids.insert("c9".to_string());
        state.reply_count = 1;

        let json = serde_json::to_string(&state).unwrap();
        let back: ReplyState = serde_json::from_str(&json).unwrap();
        assert!(back.replied_comment_ids.contains("c9"));
        assert_eq!(back.reply_count, 1);
    }
}
