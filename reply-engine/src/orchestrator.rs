use crate::registry::MonitorRegistry;
use crate::state::ReplyStateStore;
use chrono::Utc;
use llm_interface::{ReplyContext, ReplyGenerator};
use persistence::{PersistenceGateway, StateSnapshot};
use replyflow_core::{CoreError, EngineConfig, MonitoredPost, ReplyRecord};
use std::sync::Arc;
use std::time::Duration;
use threads_client::{CommentSource, ReplySender};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Base pause between successive sends on the same post.
const SEND_DELAY: Duration = Duration::from_secs(2);
/// Fraction of the base delay used as jitter.
const SEND_DELAY_JITTER: f64 = 0.2;

/// What one monitoring pass did, for logging and telemetry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub posts_processed: usize,
    pub posts_failed: usize,
    pub replies_sent: usize,
    pub comments_skipped: usize,
}

/// Drives one monitor-and-reply pass over all monitored posts.
///
/// All failure handling is per-item: a failing post never aborts the
/// cycle for the others, and a failing comment never aborts its post.
pub struct ReplyOrchestrator {
    registry: Arc<MonitorRegistry>,
    store: Arc<ReplyStateStore>,
    gateway: Arc<PersistenceGateway>,
    comments: Arc<dyn CommentSource>,
    generator: Arc<dyn ReplyGenerator>,
    sender: Arc<dyn ReplySender>,
    config: Arc<RwLock<EngineConfig>>,
    send_delay: Duration,
    cycle_gate: Mutex<()>,
}

impl ReplyOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<MonitorRegistry>,
        store: Arc<ReplyStateStore>,
        gateway: Arc<PersistenceGateway>,
        comments: Arc<dyn CommentSource>,
        generator: Arc<dyn ReplyGenerator>,
        sender: Arc<dyn ReplySender>,
        config: Arc<RwLock<EngineConfig>>,
    ) -> Self {
        Self {
            registry,
            store,
            gateway,
            comments,
            generator,
            sender,
            config,
            send_delay: SEND_DELAY,
            cycle_gate: Mutex::new(()),
        }
    }

    /// Removes the inter-send pause; test-only wiring.
    pub fn without_send_delay(mut self) -> Self {
        self.send_delay = Duration::ZERO;
        self
    }

    /// Runs a cycle unless one is already in flight. Returns `None`
    /// when the previous cycle is still running; the caller logs the
    /// skipped tick.
    pub async fn try_run_cycle(&self) -> Option<CycleReport> {
        let guard = self.cycle_gate.try_lock().ok()?;
        let report = self.run_cycle_locked().await;
        drop(guard);
        Some(report)
    }

    /// Runs a cycle, waiting for any in-flight cycle to finish first.
    pub async fn run_cycle(&self) -> CycleReport {
        let _guard = self.cycle_gate.lock().await;
        self.run_cycle_locked().await
    }

    async fn run_cycle_locked(&self) -> CycleReport {
        let config = self.config.read().await.clone();
        let mut report = CycleReport::default();

        if !config.enabled || config.credentials.access_token.is_empty() {
            debug!("Auto-reply disabled or token missing, skipping cycle");
            return report;
        }

        let posts = self.registry.posts().await;
        info!("Processing {} monitored posts", posts.len());

        for post in &posts {
            match self.process_post(post, &config, &mut report).await {
                Ok(()) => report.posts_processed += 1,
                Err(e) => {
                    warn!("Error processing post {}: {}", post.post_id, e);
                    report.posts_failed += 1;
                }
            }
        }

        info!(
            "Cycle complete: {} posts processed, {} failed, {} replies sent, {} comments skipped",
            report.posts_processed, report.posts_failed, report.replies_sent, report.comments_skipped
        );
        report
    }

    async fn process_post(
        &self,
        post: &MonitoredPost,
        config: &EngineConfig,
        report: &mut CycleReport,
    ) -> Result<(), CoreError> {
        let post_id = post.post_id.as_str();
        let cap = config.max_replies_per_post;

        if self.store.reply_count(post_id).await >= cap {
            debug!("Post {} has reached max replies ({}), skipping", post_id, cap);
            return Ok(());
        }

        let comments = self.comments.fetch_comments(post_id).await?;
        self.registry.touch(post_id, Utc::now()).await;

        let context = ReplyContext {
            post_content: post.content.clone(),
            post_author: post.author.clone(),
            prompt_template: config.custom_prompt.clone(),
        };

        for comment in comments {
            if self.store.has_replied(post_id, &comment.id).await {
                continue;
            }
            if self.store.reply_count(post_id).await >= cap {
                debug!("Reply cap reached mid-cycle for post {}", post_id);
                break;
            }

            let response = match self.generator.generate_reply(&comment.text, &context).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        "Failed to generate reply for comment {} on post {}: {}",
                        comment.id, post_id, e
                    );
                    report.comments_skipped += 1;
                    continue;
                }
            };

            match self.sender.send_reply(&comment.id, &response).await {
                Ok(sent) => {
                    let record = ReplyRecord {
                        comment_id: comment.id.clone(),
                        comment_text: comment.text.clone(),
                        author: comment.author.clone(),
                        response_text: response,
                        timestamp: Utc::now(),
                    };
                    if let Err(e) = self.store.record_reply(post_id, record, cap).await {
                        warn!("Reply to {} not recorded: {}", comment.id, e);
                    } else {
                        info!(
                            "Replied to comment {} on post {} ({})",
                            comment.id, post_id, sent.remote_id
                        );
                        report.replies_sent += 1;
                        self.schedule_state_save().await;
                    }
                    self.pause_between_sends().await;
                }
                Err(e) => {
                    // Deliberately unrecorded: the comment stays
                    // eligible for a retry on the next cycle.
                    warn!(
                        "Failed to send reply to comment {} on post {}: {}",
                        comment.id, post_id, e
                    );
                    report.comments_skipped += 1;
                }
            }
        }

        Ok(())
    }

    async fn schedule_state_save(&self) {
        let snapshot = StateSnapshot::new(self.store.snapshot().await);
        self.gateway.schedule_state_save(snapshot).await;
    }

    async fn pause_between_sends(&self) {
        if self.send_delay.is_zero() {
            return;
        }
        tokio::time::sleep(jittered(self.send_delay, SEND_DELAY_JITTER)).await;
    }
}

/// Spreads a base delay by +/- `factor` to avoid hammering the API on
/// a fixed beat.
fn jittered(base: Duration, factor: f64) -> Duration {
    let spread = base.as_secs_f64() * factor;
    let offset = fastrand::f64() * 2.0 * spread - spread;
    Duration::from_secs_f64((base.as_secs_f64() + offset).max(0.0))
}
