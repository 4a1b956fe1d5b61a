use replyflow_core::{CoreError, EngineError, ReplyRecord, ReplyState};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Owns all per-post reply bookkeeping behind a single lock, so the
/// set/count/log triple is always observed as one unit and concurrent
/// writers (automatic cycle, manual reply) cannot interleave a
/// read-check-write sequence.
#[derive(Debug, Default)]
pub struct ReplyStateStore {
    states: RwLock<BTreeMap<String, ReplyState>>,
}

impl ReplyStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the store from a loaded snapshot.
    pub fn from_states(states: BTreeMap<String, ReplyState>) -> Self {
        Self {
            states: RwLock::new(states),
        }
    }

    pub async fn has_replied(&self, post_id: &str, comment_id: &str) -> bool {
        self.states
            .read()
            .await
            .get(post_id)
            .map(|s| s.replied_comment_ids.contains(comment_id))
            .unwrap_or(false)
    }

    pub async fn reply_count(&self, post_id: &str) -> u32 {
        self.states
            .read()
            .await
            .get(post_id)
            .map(|s| s.reply_count)
            .unwrap_or(0)
    }

    pub async fn total_replies(&self) -> u64 {
        self.states
            .read()
            .await
            .values()
            .map(|s| u64::from(s.reply_count))
            .sum()
    }

    /// Records one sent reply. The set insert, count increment and log
    /// append happen under one write guard. `CapExceeded` here is a
    /// last-resort guard; callers check the cap before sending.
    pub async fn record_reply(
        &self,
        post_id: &str,
        record: ReplyRecord,
        cap: u32,
    ) -> Result<(), CoreError> {
        let mut states = self.states.write().await;
        let state = states.entry(post_id.to_string()).or_default();

        if state.reply_count >= cap {
            return Err(CoreError::Engine(EngineError::ReplyCapReached {
                post_id: post_id.to_string(),
                cap,
            }));
        }

        if !state.replied_comment_ids.insert(record.comment_id.clone()) {
            warn!(
                "Duplicate reply record for comment {} on post {} ignored",
                record.comment_id, post_id
            );
            return Ok(());
        }

        state.reply_count += 1;
        state.last_reply_at = Some(record.timestamp);
        state.replies.push(record);
        debug!(
            "Recorded reply {}/{} for post {}",
            state.reply_count, cap, post_id
        );
        Ok(())
    }

    /// Resets bookkeeping for one post.
    pub async fn clear(&self, post_id: &str) {
        self.states.write().await.remove(post_id);
        debug!("Reply state cleared for post {}", post_id);
    }

    pub async fn clear_all(&self) {
        self.states.write().await.clear();
        debug!("All reply state cleared");
    }

    /// Drops the state owned by a removed monitored post.
    pub async fn remove(&self, post_id: &str) {
        self.states.write().await.remove(post_id);
    }

    pub async fn state_for(&self, post_id: &str) -> Option<ReplyState> {
        self.states.read().await.get(post_id).cloned()
    }

    /// Deep copy for the persistence gateway; callers never see the
    /// live internal structures.
    pub async fn snapshot(&self) -> BTreeMap<String, ReplyState> {
        self.states.read().await.clone()
    }
}
