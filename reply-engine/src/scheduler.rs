use crate::orchestrator::ReplyOrchestrator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Owns the recurring timer that drives the orchestrator. One cycle at
/// a time: a tick that fires while the previous cycle is still running
/// is skipped, never queued.
#[derive(Default)]
pub struct Scheduler {
    running: AtomicBool,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Begins ticking at `interval`. Idempotent: a second call while
    /// running is a no-op. Credential validation happens at the engine
    /// boundary before this is reached.
    pub async fn start(&self, orchestrator: Arc<ReplyOrchestrator>, interval: Duration) {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("Scheduler already running");
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        *self.stop_tx.lock().await = Some(tx);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the first cycle
            // should happen one full interval after start.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = rx.changed() => break,
                    _ = ticker.tick() => {
                        if orchestrator.try_run_cycle().await.is_none() {
                            warn!("Previous cycle still running, tick skipped");
                        }
                    }
                }
            }
            debug!("Scheduler loop stopped");
        });

        info!("Scheduler started with {:?} interval", interval);
    }

    /// Prevents future ticks. An in-flight cycle is left to finish;
    /// this never blocks on it. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.stop_tx.lock().await.take() {
            let _ = tx.send(true);
        }
        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{harness, MockComments, MockGenerator, MockSender};
    use replyflow_core::MonitoredPost;

    async fn ticking_setup() -> (Scheduler, Arc<ReplyOrchestrator>, MockComments) {
        let comments = MockComments::new();
        comments.set_comments("p1", vec![]).await;
        let h = harness(comments.clone(), MockGenerator::ok(), MockSender::new(), 3).await;
        h.registry
            .add(MonitoredPost::new(
                "p1".to_string(),
                "https://threads.net/@a/post/p1".to_string(),
                "a".to_string(),
                "content".to_string(),
            ))
            .await
            .unwrap();
        (Scheduler::new(), h.orchestrator, comments)
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (scheduler, orchestrator, _comments) = ticking_setup().await;

        scheduler
            .start(Arc::clone(&orchestrator), Duration::from_secs(60))
            .await;
        scheduler.start(orchestrator, Duration::from_secs(60)).await;
        assert!(scheduler.is_running());

        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_stop_without_start_is_a_no_op() {
        let scheduler = Scheduler::new();
        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_ticks_drive_cycles() {
        let (scheduler, orchestrator, comments) = ticking_setup().await;

        scheduler
            .start(orchestrator, Duration::from_millis(30))
            .await;
        tokio::time::sleep(Duration::from_millis(110)).await;
        scheduler.stop().await;

        assert!(comments.fetch_count().await >= 2);
    }

    #[tokio::test]
    async fn test_no_ticks_after_stop() {
        let (scheduler, orchestrator, comments) = ticking_setup().await;

        scheduler
            .start(orchestrator, Duration::from_millis(30))
            .await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.stop().await;

        // Give any in-flight tick time to settle, then verify silence.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let count_after_stop = comments.fetch_count().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(comments.fetch_count().await, count_after_stop);
    }
}
