mod debounce;

use chrono::{DateTime, Utc};
use debounce::Debouncer;
use replyflow_core::{EngineConfig, MonitoredPost, PersistenceError, ReplyState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const SETTINGS_FILE: &str = "auto-reply-settings.json";
const HISTORY_FILE: &str = "reply-history.json";

/// Trailing debounce window for configuration saves.
pub const CONFIG_DEBOUNCE: Duration = Duration::from_secs(2);
/// Trailing debounce window for reply-state saves; history churns more
/// so it gets the longer window.
pub const STATE_DEBOUNCE: Duration = Duration::from_secs(5);

/// Durable form of the engine configuration. Credentials are excluded:
/// they only ever come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub enabled: bool,
    /// Polling interval in milliseconds.
    pub interval: u64,
    pub max_replies_per_post: u32,
    pub custom_prompt: String,
    pub monitored_posts: Vec<MonitoredPost>,
    pub last_saved: DateTime<Utc>,
}

impl ConfigSnapshot {
    pub fn new(config: &EngineConfig, monitored_posts: Vec<MonitoredPost>) -> Self {
        Self {
            enabled: config.enabled,
            interval: config.interval_ms,
            max_replies_per_post: config.max_replies_per_post,
            custom_prompt: config.custom_prompt.clone(),
            monitored_posts,
            last_saved: Utc::now(),
        }
    }
}

/// Durable form of the per-post reply bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub entries: Vec<(String, ReplyState)>,
    pub last_saved: DateTime<Utc>,
    pub total_entries: usize,
}

impl StateSnapshot {
    pub fn new(states: BTreeMap<String, ReplyState>) -> Self {
        let total_entries = states.len();
        Self {
            entries: states.into_iter().collect(),
            last_saved: Utc::now(),
            total_entries,
        }
    }

    pub fn into_map(self) -> BTreeMap<String, ReplyState> {
        self.entries.into_iter().collect()
    }
}

pub(crate) async fn write_json_file<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| PersistenceError::DirectoryCreation {
                path: parent.display().to_string(),
                source,
            })?;
    }

    let json = serde_json::to_string_pretty(value).map_err(|e| {
        PersistenceError::CorruptSnapshot {
            path: path.display().to_string(),
            details: format!("serialization failed: {e}"),
        }
    })?;

    tokio::fs::write(path, json)
        .await
        .map_err(|source| PersistenceError::WriteFailed {
            path: path.display().to_string(),
            source,
        })
}

async fn read_json_file<T: for<'de> Deserialize<'de>>(
    path: &Path,
) -> Result<Option<T>, PersistenceError> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::ReadFailed {
                path: path.display().to_string(),
                source,
            })
        }
    };

    let value = serde_json::from_str(&data).map_err(|e| PersistenceError::CorruptSnapshot {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;
    Ok(Some(value))
}

/// Serializes engine state to JSON files under a data directory.
/// Immediate saves are used for rare, must-survive mutations (adding or
/// removing a monitored post); everything else goes through the
/// debounced path. The gateway never owns domain data.
pub struct PersistenceGateway {
    settings_path: PathBuf,
    history_path: PathBuf,
    config_debounce: Debouncer<ConfigSnapshot>,
    state_debounce: Debouncer<StateSnapshot>,
}

impl PersistenceGateway {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_debounce_windows(data_dir, CONFIG_DEBOUNCE, STATE_DEBOUNCE)
    }

    pub fn with_debounce_windows(
        data_dir: impl Into<PathBuf>,
        config_window: Duration,
        state_window: Duration,
    ) -> Self {
        let data_dir = data_dir.into();
        let settings_path = data_dir.join(SETTINGS_FILE);
        let history_path = data_dir.join(HISTORY_FILE);
        Self {
            config_debounce: Debouncer::new(settings_path.clone(), config_window),
            state_debounce: Debouncer::new(history_path.clone(), state_window),
            settings_path,
            history_path,
        }
    }

    /// Writes the configuration snapshot immediately.
    pub async fn save_config(&self, snapshot: &ConfigSnapshot) -> Result<(), PersistenceError> {
        write_json_file(&self.settings_path, snapshot).await?;
        info!(
            "Settings saved: {} monitored posts",
            snapshot.monitored_posts.len()
        );
        Ok(())
    }

    /// Missing file is not an error; the caller starts from defaults.
    pub async fn load_config(&self) -> Result<Option<ConfigSnapshot>, PersistenceError> {
        match read_json_file::<ConfigSnapshot>(&self.settings_path).await? {
            Some(snapshot) => {
                info!(
                    "Settings loaded: {} monitored posts",
                    snapshot.monitored_posts.len()
                );
                Ok(Some(snapshot))
            }
            None => {
                info!("No existing settings file, using defaults");
                Ok(None)
            }
        }
    }

    /// Writes the reply-state snapshot immediately.
    pub async fn save_state(&self, snapshot: &StateSnapshot) -> Result<(), PersistenceError> {
        write_json_file(&self.history_path, snapshot).await?;
        info!("Reply history saved: {} entries", snapshot.total_entries);
        Ok(())
    }

    pub async fn load_state(&self) -> Result<Option<StateSnapshot>, PersistenceError> {
        match read_json_file::<StateSnapshot>(&self.history_path).await? {
            Some(snapshot) => {
                info!("Reply history loaded: {} entries", snapshot.total_entries);
                Ok(Some(snapshot))
            }
            None => {
                info!("No existing reply history, starting fresh");
                Ok(None)
            }
        }
    }

    /// Coalesces bursts of configuration changes into one write.
    pub async fn schedule_config_save(&self, snapshot: ConfigSnapshot) {
        self.config_debounce.schedule(snapshot).await;
    }

    /// Coalesces bursts of reply-state changes into one write.
    pub async fn schedule_state_save(&self, snapshot: StateSnapshot) {
        self.state_debounce.schedule(snapshot).await;
    }

    /// Writes any pending debounced snapshots now. Must be awaited on
    /// graceful shutdown so nothing is lost on exit.
    pub async fn flush(&self) {
        self.config_debounce.flush().await;
        self.state_debounce.flush().await;
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }
}

/// Best-effort load for engine startup: a corrupt file is logged and
/// treated as empty so a bad snapshot never prevents the engine from
/// coming up.
pub async fn load_state_or_default(gateway: &PersistenceGateway) -> BTreeMap<String, ReplyState> {
    match gateway.load_state().await {
        Ok(Some(snapshot)) => snapshot.into_map(),
        Ok(None) => BTreeMap::new(),
        Err(e) => {
            warn!("Reply history unreadable, starting empty: {}", e);
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replyflow_core::ReplyRecord;
    use std::env;

    fn temp_data_dir() -> PathBuf {
        env::temp_dir().join(format!("test_replyflow_{}", uuid::Uuid::new_v4()))
    }

    fn sample_config_snapshot() -> ConfigSnapshot {
        let config = EngineConfig {
            enabled: true,
            interval_ms: 45_000,
            max_replies_per_post: 5,
            ..EngineConfig::default()
        };
        let posts = vec![MonitoredPost::new(
            "17890123456789012".to_string(),
            "https://threads.net/@a/post/X".to_string(),
            "a".to_string(),
            "hello".to_string(),
        )];
        ConfigSnapshot::new(&config, posts)
    }

    fn sample_state() -> BTreeMap<String, ReplyState> {
        let mut state = ReplyState::default();
        state.replied_comment_ids.insert("c1".to_string());
        state.reply_count = 1;
        state.replies.push(ReplyRecord {
            comment_id: "c1".to_string(),
            comment_text: "hi".to_string(),
            author: "bob".to_string(),
            response_text: "hey".to_string(),
            timestamp: Utc::now(),
        });
        state.last_reply_at = Some(Utc::now());

        let mut map = BTreeMap::new();
        map.insert("17890123456789012".to_string(), state);
        map
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let gateway = PersistenceGateway::new(temp_data_dir());
        let snapshot = sample_config_snapshot();

        gateway.save_config(&snapshot).await.unwrap();
        let loaded = gateway.load_config().await.unwrap().unwrap();

        assert!(loaded.enabled);
        assert_eq!(loaded.interval, 45_000);
        assert_eq!(loaded.max_replies_per_post, 5);
        assert_eq!(loaded.monitored_posts.len(), 1);
        assert_eq!(loaded.monitored_posts[0].post_id, "17890123456789012");
    }

    #[tokio::test]
    async fn test_state_round_trip_preserves_counts() {
        let gateway = PersistenceGateway::new(temp_data_dir());
        let snapshot = StateSnapshot::new(sample_state());

        gateway.save_state(&snapshot).await.unwrap();
        let loaded = gateway.load_state().await.unwrap().unwrap();

        assert_eq!(loaded.total_entries, 1);
        let map = loaded.into_map();
        let state = map.get("17890123456789012").unwrap();
        assert_eq!(state.reply_count, 1);
        assert!(state.replied_comment_ids.contains("c1"));
        assert_eq!(state.replies.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_files_is_not_an_error() {
        let gateway = PersistenceGateway::new(temp_data_dir());
        assert!(gateway.load_config().await.unwrap().is_none());
        assert!(gateway.load_state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_state_file_surfaces_error() {
        let dir = temp_data_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join(HISTORY_FILE), "{not json")
            .await
            .unwrap();

        let gateway = PersistenceGateway::new(&dir);
        let err = gateway.load_state().await.unwrap_err();
        assert!(matches!(err, PersistenceError::CorruptSnapshot { .. }));

        // Best-effort loader falls back to empty instead of failing.
        assert!(load_state_or_default(&gateway).await.is_empty());
    }

    #[tokio::test]
    async fn test_state_snapshot_wire_format() {
        let snapshot = StateSnapshot::new(sample_state());
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["totalEntries"], 1);
        assert!(json.get("lastSaved").is_some());
        let entry = &json["entries"][0];
        assert_eq!(entry[0], "17890123456789012");
        assert_eq!(entry[1]["replyCount"], 1);
        assert_eq!(entry[1]["repliedComments"], serde_json::json!(["c1"]));
    }

    #[tokio::test]
    async fn test_debounced_saves_coalesce_into_latest_write() {
        let dir = temp_data_dir();
        let gateway = PersistenceGateway::with_debounce_windows(
            &dir,
            Duration::from_millis(50),
            Duration::from_millis(50),
        );

        let mut first = sample_state();
        first.get_mut("17890123456789012").unwrap().reply_count = 1;
        let mut second = sample_state();
        second.get_mut("17890123456789012").unwrap().reply_count = 2;

        gateway.schedule_state_save(StateSnapshot::new(first)).await;
        gateway.schedule_state_save(StateSnapshot::new(second)).await;

        // Nothing on disk until the window elapses.
        assert!(gateway.load_state().await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let loaded = gateway.load_state().await.unwrap().unwrap();
        let map = loaded.into_map();
        assert_eq!(map.get("17890123456789012").unwrap().reply_count, 2);
    }

    #[tokio::test]
    async fn test_flush_writes_pending_snapshot_immediately() {
        let dir = temp_data_dir();
        let gateway = PersistenceGateway::with_debounce_windows(
            &dir,
            Duration::from_secs(60),
            Duration::from_secs(60),
        );

        gateway
            .schedule_state_save(StateSnapshot::new(sample_state()))
            .await;
        gateway
            .schedule_config_save(sample_config_snapshot())
            .await;
        gateway.flush().await;

        assert!(gateway.load_state().await.unwrap().is_some());
        assert!(gateway.load_config().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_flush_with_nothing_pending_is_a_no_op() {
        let gateway = PersistenceGateway::new(temp_data_dir());
        gateway.flush().await;
        assert!(gateway.load_config().await.unwrap().is_none());
    }
}
