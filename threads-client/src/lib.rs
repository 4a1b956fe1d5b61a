pub mod api;
pub mod helpers;

use async_trait::async_trait;
use replyflow_core::{Comment, CoreError, SentReply};

pub use api::{ThreadsApiClient, ThreadsPostData, ThreadsProfile};
pub use helpers::{extract_post_id_from_url, is_threads_url, validate_post_id};

/// Where comments come from. Implementations fail with a Threads API
/// or network error; callers treat a failure as skip-and-continue.
#[async_trait]
pub trait CommentSource: Send + Sync {
    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>, CoreError>;
}

/// Publishes a reply under a target comment.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_reply(&self, target_comment_id: &str, text: &str)
        -> Result<SentReply, CoreError>;
}
