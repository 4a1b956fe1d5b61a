use crate::orchestrator::ReplyOrchestrator;
use crate::registry::MonitorRegistry;
use crate::scheduler::Scheduler;
use crate::state::ReplyStateStore;
use chrono::Utc;
use llm_interface::{ReplyContext, ReplyGenerator};
use persistence::{ConfigSnapshot, PersistenceGateway, StateSnapshot};
use replyflow_core::{
    config::MIN_INTERVAL_MS, CoreError, EngineConfig, EngineSettings, EngineStatus,
    MonitoredPost, MonitoredPostSummary, ReplyHistoryEntry, ReplyRecord, SentReply,
    SettingsUpdate,
};
use std::sync::Arc;
use threads_client::{CommentSource, ReplySender};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// A manual reply request coming from outside the automatic cycle.
#[derive(Debug, Clone, Default)]
pub struct ManualReply {
    /// Monitored post the comment belongs to, when known. Needed for
    /// the reply to be recorded against that post's bookkeeping.
    pub post_id: Option<String>,
    pub comment_id: String,
    /// Text to send verbatim. When absent, `comment_text` is used to
    /// generate one.
    pub message: Option<String>,
    pub comment_text: Option<String>,
    pub author: Option<String>,
}

/// Facade over the whole engine: owns the configuration, registry,
/// state store, scheduler and persistence wiring, and exposes the
/// operations a front-end consumes.
pub struct ReplyEngine {
    config: Arc<RwLock<EngineConfig>>,
    registry: Arc<MonitorRegistry>,
    store: Arc<ReplyStateStore>,
    gateway: Arc<PersistenceGateway>,
    orchestrator: Arc<ReplyOrchestrator>,
    scheduler: Scheduler,
    generator: Arc<dyn ReplyGenerator>,
    sender: Arc<dyn ReplySender>,
}

impl ReplyEngine {
    /// Builds the engine from the environment configuration plus
    /// whatever earlier runs persisted. Credentials always come from
    /// `config`; persisted snapshots never carry them. A corrupt or
    /// missing snapshot falls back to defaults.
    pub async fn bootstrap(
        mut config: EngineConfig,
        gateway: PersistenceGateway,
        comments: Arc<dyn CommentSource>,
        generator: Arc<dyn ReplyGenerator>,
        sender: Arc<dyn ReplySender>,
    ) -> Self {
        let mut monitored = Vec::new();
        match gateway.load_config().await {
            Ok(Some(saved)) => {
                config.enabled = saved.enabled;
                if saved.interval >= MIN_INTERVAL_MS {
                    config.interval_ms = saved.interval;
                }
                if saved.max_replies_per_post >= 1 {
                    config.max_replies_per_post = saved.max_replies_per_post;
                }
                if !saved.custom_prompt.is_empty() {
                    config.custom_prompt = saved.custom_prompt;
                }
                monitored = saved.monitored_posts;
                info!("Restored {} monitored posts", monitored.len());
            }
            Ok(None) => {}
            Err(e) => warn!("Saved settings unreadable, using defaults: {}", e),
        }

        let states = persistence::load_state_or_default(&gateway).await;

        let config = Arc::new(RwLock::new(config));
        let registry = Arc::new(MonitorRegistry::from_posts(monitored));
        let store = Arc::new(ReplyStateStore::from_states(states));
        let gateway = Arc::new(gateway);

        let orchestrator = Arc::new(ReplyOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&gateway),
            comments,
            Arc::clone(&generator),
            Arc::clone(&sender),
            Arc::clone(&config),
        ));

        Self {
            config,
            registry,
            store,
            gateway,
            orchestrator,
            scheduler: Scheduler::new(),
            generator,
            sender,
        }
    }

    /// Starts the recurring monitoring job. Fails with a `ConfigError`
    /// when credentials are missing; idempotent when already running.
    pub async fn start(&self) -> Result<(), CoreError> {
        let config = self.config.read().await.clone();
        config.validate_for_start()?;
        self.scheduler
            .start(Arc::clone(&self.orchestrator), config.interval())
            .await;
        Ok(())
    }

    /// Stops future ticks without interrupting an in-flight cycle.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    pub async fn status(&self) -> EngineStatus {
        let config = self.config.read().await;
        EngineStatus {
            running: self.scheduler.is_running(),
            enabled: config.enabled,
            interval_ms: config.interval_ms,
            max_replies_per_post: config.max_replies_per_post,
            monitored_count: self.registry.len().await,
            total_replies: self.store.total_replies().await,
        }
    }

    /// Adds a post to monitoring. Additions are rare and must survive a
    /// crash, so the save is immediate rather than debounced.
    pub async fn add_post(&self, post: MonitoredPost) -> Result<(), CoreError> {
        self.registry.add(post).await?;
        self.save_config_now().await;
        Ok(())
    }

    /// Removes a post and the reply state it owns.
    pub async fn remove_post(&self, post_id: &str) -> Result<MonitoredPost, CoreError> {
        let removed = self.registry.remove(post_id).await?;
        self.store.remove(post_id).await;
        self.save_config_now().await;
        self.save_state_now().await;
        Ok(removed)
    }

    /// Monitored posts joined with their reply counters.
    pub async fn monitored_posts(&self) -> Vec<MonitoredPostSummary> {
        let cap = self.config.read().await.max_replies_per_post;
        let mut summaries = Vec::new();
        for post in self.registry.posts().await {
            let reply_count = self.store.reply_count(&post.post_id).await;
            summaries.push(MonitoredPostSummary {
                post,
                reply_count,
                max_replies: cap,
            });
        }
        summaries
    }

    /// The full reply log flattened to one entry per sent reply,
    /// newest first.
    pub async fn reply_history(&self) -> Vec<ReplyHistoryEntry> {
        let states = self.store.snapshot().await;
        let posts = self.registry.posts().await;

        let mut history = Vec::new();
        for (post_id, state) in states {
            let post_url = posts
                .iter()
                .find(|p| p.post_id == post_id)
                .map(|p| p.url.clone())
                .unwrap_or_default();
            for record in state.replies {
                history.push(ReplyHistoryEntry {
                    post_id: post_id.clone(),
                    post_url: post_url.clone(),
                    comment_id: record.comment_id,
                    comment_text: record.comment_text,
                    author: record.author,
                    response: record.response_text,
                    timestamp: record.timestamp,
                });
            }
        }
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        history
    }

    pub async fn clear_reply_history(&self) {
        self.store.clear_all().await;
        self.save_state_debounced().await;
        info!("Reply history cleared");
    }

    pub async fn clear_post_history(&self, post_id: &str) {
        self.store.clear(post_id).await;
        self.save_state_debounced().await;
    }

    pub async fn settings(&self) -> EngineSettings {
        self.config.read().await.settings()
    }

    /// Applies a validated settings update and persists it. When the
    /// interval changes while the job is running, the scheduler is
    /// restarted so the new period takes effect.
    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<EngineSettings, CoreError> {
        let (settings, interval_changed) = {
            let mut config = self.config.write().await;
            let before = config.interval_ms;
            config.apply_update(update)?;
            (config.settings(), config.interval_ms != before)
        };

        self.save_config_debounced().await;

        if interval_changed && self.scheduler.is_running() {
            self.stop().await;
            self.start().await?;
        }
        Ok(settings)
    }

    /// Sends one reply outside the automatic cycle. When the comment
    /// belongs to a monitored post the reply is recorded there, sharing
    /// the store's write path with the cycle so the two cannot
    /// interleave their bookkeeping.
    pub async fn send_manual_reply(&self, request: ManualReply) -> Result<SentReply, CoreError> {
        let text = match request.message.clone() {
            Some(message) if !message.is_empty() => message,
            _ => {
                let comment_text =
                    request
                        .comment_text
                        .clone()
                        .ok_or_else(|| CoreError::InvalidInput {
                            message: "Comment text is required for AI generation".to_string(),
                        })?;
                let config = self.config.read().await.clone();
                let post = match &request.post_id {
                    Some(post_id) => self.registry.get(post_id).await,
                    None => None,
                };
                let context = ReplyContext {
                    post_content: post.as_ref().map(|p| p.content.clone()).unwrap_or_default(),
                    post_author: post.as_ref().map(|p| p.author.clone()).unwrap_or_default(),
                    prompt_template: config.custom_prompt,
                };
                self.generator
                    .generate_reply(&comment_text, &context)
                    .await?
            }
        };

        let sent = self.sender.send_reply(&request.comment_id, &text).await?;

        if let Some(post_id) = &request.post_id {
            if self.registry.get(post_id).await.is_some() {
                let cap = self.config.read().await.max_replies_per_post;
                let record = ReplyRecord {
                    comment_id: request.comment_id.clone(),
                    comment_text: request.comment_text.clone().unwrap_or_default(),
                    author: request.author.clone().unwrap_or_else(|| "Unknown".to_string()),
                    response_text: text,
                    timestamp: Utc::now(),
                };
                if let Err(e) = self.store.record_reply(post_id, record, cap).await {
                    warn!("Manual reply to {} not recorded: {}", request.comment_id, e);
                } else {
                    self.save_state_debounced().await;
                }
            }
        }

        Ok(sent)
    }

    /// Stops the scheduler and flushes pending debounced writes. Call
    /// before process exit so nothing is lost.
    pub async fn shutdown(&self) {
        self.stop().await;
        self.gateway.flush().await;
        info!("Engine shut down, persistence flushed");
    }

    async fn config_snapshot(&self) -> ConfigSnapshot {
        let config = self.config.read().await.clone();
        ConfigSnapshot::new(&config, self.registry.posts().await)
    }

    async fn save_config_now(&self) {
        let snapshot = self.config_snapshot().await;
        if let Err(e) = self.gateway.save_config(&snapshot).await {
            // In-memory state stays authoritative; the next save retries.
            warn!("Failed to save settings: {}", e);
        }
    }

    async fn save_config_debounced(&self) {
        let snapshot = self.config_snapshot().await;
        self.gateway.schedule_config_save(snapshot).await;
    }

    async fn save_state_now(&self) {
        let snapshot = StateSnapshot::new(self.store.snapshot().await);
        if let Err(e) = self.gateway.save_state(&snapshot).await {
            warn!("Failed to save reply history: {}", e);
        }
    }

    async fn save_state_debounced(&self) {
        let snapshot = StateSnapshot::new(self.store.snapshot().await);
        self.gateway.schedule_state_save(snapshot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{temp_data_dir, test_config, MockComments, MockGenerator, MockSender};
    use replyflow_core::{Comment, ConfigError};
    use std::path::PathBuf;

    fn post(post_id: &str) -> MonitoredPost {
        MonitoredPost::new(
            post_id.to_string(),
            format!("https://threads.net/@a/post/{post_id}"),
            "a".to_string(),
            "post content".to_string(),
        )
    }

    async fn engine_at(
        dir: PathBuf,
        comments: MockComments,
        sender: MockSender,
        cap: u32,
    ) -> ReplyEngine {
        ReplyEngine::bootstrap(
            test_config(cap),
            PersistenceGateway::new(dir),
            Arc::new(comments),
            Arc::new(MockGenerator::ok()),
            Arc::new(sender),
        )
        .await
    }

    #[tokio::test]
    async fn test_start_requires_credentials() {
        let dir = temp_data_dir();
        let mut config = test_config(3);
        config.credentials.access_token.clear();
        let engine = ReplyEngine::bootstrap(
            config,
            PersistenceGateway::new(dir),
            Arc::new(MockComments::new()),
            Arc::new(MockGenerator::ok()),
            Arc::new(MockSender::new()),
        )
        .await;

        let err = engine.start().await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Config(ConfigError::MissingCredential { .. })
        ));
        assert!(!engine.status().await.running);
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let engine = engine_at(temp_data_dir(), MockComments::new(), MockSender::new(), 3).await;

        engine.start().await.unwrap();
        engine.start().await.unwrap();
        assert!(engine.status().await.running);

        engine.stop().await;
        engine.stop().await;
        assert!(!engine.status().await.running);
    }

    #[tokio::test]
    async fn test_add_remove_and_list_posts() {
        let engine = engine_at(temp_data_dir(), MockComments::new(), MockSender::new(), 3).await;

        engine.add_post(post("p1")).await.unwrap();
        engine.add_post(post("p2")).await.unwrap();
        assert!(engine.add_post(post("p1")).await.is_err());

        let summaries = engine.monitored_posts().await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].post.post_id, "p1");
        assert_eq!(summaries[0].reply_count, 0);
        assert_eq!(summaries[0].max_replies, 3);

        engine.remove_post("p1").await.unwrap();
        assert!(engine.remove_post("p1").await.is_err());
        assert_eq!(engine.monitored_posts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_restart_reproduces_posts_and_counts() {
        let dir = temp_data_dir();
        let comments = MockComments::new();
        comments
            .set_comments(
                "p1",
                vec![Comment {
                    id: "c1".to_string(),
                    text: "hi".to_string(),
                    author: "bob".to_string(),
                    timestamp: None,
                }],
            )
            .await;

        {
            let engine = engine_at(dir.clone(), comments.clone(), MockSender::new(), 3).await;
            engine.add_post(post("p1")).await.unwrap();
            engine.add_post(post("p2")).await.unwrap();
            engine.orchestrator.run_cycle().await;
            engine.shutdown().await;
        }

        let engine = engine_at(dir, MockComments::new(), MockSender::new(), 3).await;
        let summaries = engine.monitored_posts().await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].post.post_id, "p1");
        assert_eq!(summaries[0].reply_count, 1);
        assert_eq!(summaries[1].reply_count, 0);
        assert_eq!(engine.status().await.total_replies, 1);

        // Dedup survives the restart: the same comment is not re-replied.
        assert!(engine.store.has_replied("p1", "c1").await);
    }

    #[tokio::test]
    async fn test_update_settings_validates_and_persists() {
        let dir = temp_data_dir();
        {
            let engine =
                engine_at(dir.clone(), MockComments::new(), MockSender::new(), 3).await;

            let err = engine
                .update_settings(SettingsUpdate {
                    interval_ms: Some(10),
                    ..SettingsUpdate::default()
                })
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::Config(_)));

            engine
                .update_settings(SettingsUpdate {
                    max_replies_per_post: Some(7),
                    custom_prompt: Some("shorter".to_string()),
                    ..SettingsUpdate::default()
                })
                .await
                .unwrap();
            engine.shutdown().await;
        }

        let engine = engine_at(dir, MockComments::new(), MockSender::new(), 3).await;
        let settings = engine.settings().await;
        assert_eq!(settings.max_replies_per_post, 7);
        assert_eq!(settings.custom_prompt, "shorter");
    }

    #[tokio::test]
    async fn test_reply_history_is_flattened_and_newest_first() {
        let comments = MockComments::new();
        comments
            .set_comments(
                "p1",
                vec![
                    Comment {
                        id: "c1".to_string(),
                        text: "first".to_string(),
                        author: "bob".to_string(),
                        timestamp: None,
                    },
                    Comment {
                        id: "c2".to_string(),
                        text: "second".to_string(),
                        author: "eve".to_string(),
                        timestamp: None,
                    },
                ],
            )
            .await;
        let engine = engine_at(temp_data_dir(), comments, MockSender::new(), 5).await;
        engine.add_post(post("p1")).await.unwrap();
        engine.orchestrator.run_cycle().await;

        let history = engine.reply_history().await;
        assert_eq!(history.len(), 2);
        assert!(history[0].timestamp >= history[1].timestamp);
        assert_eq!(history[1].comment_id, "c1");
        assert_eq!(history[1].post_url, "https://threads.net/@a/post/p1");
        assert_eq!(history[1].response, "re: first");

        engine.clear_reply_history().await;
        assert!(engine.reply_history().await.is_empty());
        assert_eq!(engine.status().await.total_replies, 0);
    }

    #[tokio::test]
    async fn test_manual_reply_with_message_is_recorded_and_deduped() {
        let comments = MockComments::new();
        comments
            .set_comments(
                "p1",
                vec![Comment {
                    id: "c1".to_string(),
                    text: "hi".to_string(),
                    author: "bob".to_string(),
                    timestamp: None,
                }],
            )
            .await;
        let sender = MockSender::new();
        let engine = engine_at(temp_data_dir(), comments, sender.clone(), 3).await;
        engine.add_post(post("p1")).await.unwrap();

        let sent = engine
            .send_manual_reply(ManualReply {
                post_id: Some("p1".to_string()),
                comment_id: "c1".to_string(),
                message: Some("hand-written".to_string()),
                comment_text: Some("hi".to_string()),
                author: Some("bob".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(sent.remote_id, "r-c1");
        assert_eq!(engine.store.reply_count("p1").await, 1);

        // The automatic cycle now sees c1 as already handled.
        engine.orchestrator.run_cycle().await;
        assert_eq!(sender.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_manual_reply_generates_when_no_message_given() {
        let engine = engine_at(temp_data_dir(), MockComments::new(), MockSender::new(), 3).await;

        let err = engine
            .send_manual_reply(ManualReply {
                comment_id: "c1".to_string(),
                ..ManualReply::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { .. }));

        let sent = engine
            .send_manual_reply(ManualReply {
                comment_id: "c1".to_string(),
                comment_text: Some("what time?".to_string()),
                ..ManualReply::default()
            })
            .await
            .unwrap();
        assert_eq!(sent.remote_id, "r-c1");
        // Unmonitored target: nothing recorded.
        assert_eq!(engine.status().await.total_replies, 0);
    }
}
