use crate::orchestrator::ReplyOrchestrator;
use crate::registry::MonitorRegistry;
use crate::state::ReplyStateStore;
use async_trait::async_trait;
use llm_interface::{ReplyContext, ReplyGenerator};
use persistence::PersistenceGateway;
use replyflow_core::{
    Comment, CoreError, Credentials, EngineConfig, LlmError, SentReply, ThreadsApiError,
};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use threads_client::{CommentSource, ReplySender};
use tokio::sync::{Mutex, RwLock};

pub(crate) fn temp_data_dir() -> PathBuf {
    std::env::temp_dir().join(format!("test_replyflow_{}", uuid::Uuid::new_v4()))
}

#[derive(Default)]
struct MockCommentsInner {
    comments: HashMap<String, Vec<Comment>>,
    failing: HashSet<String>,
    fetch_count: usize,
}

/// Comment source with per-post canned results and failure injection.
#[derive(Clone, Default)]
pub(crate) struct MockComments {
    inner: Arc<Mutex<MockCommentsInner>>,
}

impl MockComments {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn set_comments(&self, post_id: &str, comments: Vec<Comment>) {
        self.inner
            .lock()
            .await
            .comments
            .insert(post_id.to_string(), comments);
    }

    pub(crate) async fn fail_for(&self, post_id: &str) {
        self.inner.lock().await.failing.insert(post_id.to_string());
    }

    pub(crate) async fn fetch_count(&self) -> usize {
        self.inner.lock().await.fetch_count
    }
}

#[async_trait]
impl CommentSource for MockComments {
    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>, CoreError> {
        let mut inner = self.inner.lock().await;
        inner.fetch_count += 1;
        if inner.failing.contains(post_id) {
            return Err(CoreError::ThreadsApi(ThreadsApiError::RequestTimeout));
        }
        Ok(inner.comments.get(post_id).cloned().unwrap_or_default())
    }
}

/// Generator that echoes the comment, optionally failing for comments
/// containing a marker substring.
#[derive(Clone, Default)]
pub(crate) struct MockGenerator {
    fail_matching: Option<String>,
}

impl MockGenerator {
    pub(crate) fn ok() -> Self {
        Self::default()
    }

    pub(crate) fn failing_for(marker: &str) -> Self {
        Self {
            fail_matching: Some(marker.to_string()),
        }
    }
}

#[async_trait]
impl ReplyGenerator for MockGenerator {
    async fn generate_reply(
        &self,
        comment_text: &str,
        _context: &ReplyContext,
    ) -> Result<String, CoreError> {
        if let Some(marker) = &self.fail_matching {
            if comment_text.contains(marker.as_str()) {
                return Err(CoreError::Llm(LlmError::ServiceUnavailable {
                    provider: "mock".to_string(),
                }));
            }
        }
        Ok(format!("re: {comment_text}"))
    }
}

#[derive(Default)]
struct MockSenderInner {
    sent: Vec<(String, String)>,
    failing: HashSet<String>,
}

/// Sender that records every published reply and can fail per comment.
#[derive(Clone, Default)]
pub(crate) struct MockSender {
    inner: Arc<Mutex<MockSenderInner>>,
}

impl MockSender {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn fail_for(&self, comment_id: &str) {
        self.inner
            .lock()
            .await
            .failing
            .insert(comment_id.to_string());
    }

    pub(crate) async fn clear_failures(&self) {
        self.inner.lock().await.failing.clear();
    }

    pub(crate) async fn sent(&self) -> Vec<(String, String)> {
        self.inner.lock().await.sent.clone()
    }
}

#[async_trait]
impl ReplySender for MockSender {
    async fn send_reply(
        &self,
        target_comment_id: &str,
        text: &str,
    ) -> Result<SentReply, CoreError> {
        let mut inner = self.inner.lock().await;
        if inner.failing.contains(target_comment_id) {
            return Err(CoreError::ThreadsApi(ThreadsApiError::ServerError {
                status_code: 500,
            }));
        }
        inner
            .sent
            .push((target_comment_id.to_string(), text.to_string()));
        Ok(SentReply {
            remote_id: format!("r-{target_comment_id}"),
        })
    }
}

pub(crate) struct Harness {
    pub(crate) registry: Arc<MonitorRegistry>,
    pub(crate) store: Arc<ReplyStateStore>,
    pub(crate) gateway: Arc<PersistenceGateway>,
    pub(crate) config: Arc<RwLock<EngineConfig>>,
    pub(crate) orchestrator: Arc<ReplyOrchestrator>,
}

pub(crate) fn test_config(cap: u32) -> EngineConfig {
    EngineConfig {
        enabled: true,
        max_replies_per_post: cap,
        credentials: Credentials {
            access_token: "test-token".to_string(),
            gemini_api_key: "test-key".to_string(),
        },
        ..EngineConfig::default()
    }
}

pub(crate) async fn harness(
    comments: MockComments,
    generator: MockGenerator,
    sender: MockSender,
    cap: u32,
) -> Harness {
    let registry = Arc::new(MonitorRegistry::new());
    let store = Arc::new(ReplyStateStore::new());
    let gateway = Arc::new(PersistenceGateway::new(temp_data_dir()));
    let config = Arc::new(RwLock::new(test_config(cap)));

    let orchestrator = Arc::new(
        ReplyOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::new(comments),
            Arc::new(generator),
            Arc::new(sender),
            Arc::clone(&config),
        )
        .without_send_delay(),
    );

    Harness {
        registry,
        store,
        gateway,
        config,
        orchestrator,
    }
}
