use chrono::{DateTime, Utc};
use replyflow_core::{CoreError, EngineError, MonitoredPost};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// The list of posts under observation. Insertion order is iteration
/// order; at most one entry per post id.
#[derive(Debug, Default)]
pub struct MonitorRegistry {
    posts: RwLock<Vec<MonitoredPost>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_posts(posts: Vec<MonitoredPost>) -> Self {
        Self {
            posts: RwLock::new(posts),
        }
    }

    pub async fn add(&self, post: MonitoredPost) -> Result<(), CoreError> {
        let mut posts = self.posts.write().await;
        if posts.iter().any(|p| p.post_id == post.post_id) {
            return Err(CoreError::Engine(EngineError::AlreadyMonitored {
                post_id: post.post_id,
            }));
        }
        info!("Added post {} to monitoring", post.post_id);
        posts.push(post);
        Ok(())
    }

    pub async fn remove(&self, post_id: &str) -> Result<MonitoredPost, CoreError> {
        let mut posts = self.posts.write().await;
        let index = posts
            .iter()
            .position(|p| p.post_id == post_id)
            .ok_or_else(|| {
                CoreError::Engine(EngineError::NotMonitored {
                    post_id: post_id.to_string(),
                })
            })?;
        info!("Removed post {} from monitoring", post_id);
        Ok(posts.remove(index))
    }

    /// Snapshot of the monitored posts in insertion order. Re-calling
    /// restarts the sequence; no side effects.
    pub async fn posts(&self) -> Vec<MonitoredPost> {
        self.posts.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.posts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.posts.read().await.is_empty()
    }

    pub async fn get(&self, post_id: &str) -> Option<MonitoredPost> {
        self.posts
            .read()
            .await
            .iter()
            .find(|p| p.post_id == post_id)
            .cloned()
    }

    /// Stamps a post as checked after a successful comment fetch.
    pub async fn touch(&self, post_id: &str, when: DateTime<Utc>) {
        let mut posts = self.posts.write().await;
        if let Some(post) = posts.iter_mut().find(|p| p.post_id == post_id) {
            post.last_checked = Some(when);
            debug!("Post {} checked at {}", post_id, when);
        }
    }
}
