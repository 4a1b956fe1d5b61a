use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::write_json_file;

struct DebounceInner<T> {
    pending: Option<T>,
    task: Option<JoinHandle<()>>,
}

/// Trailing-edge debouncer: each `schedule` replaces the pending
/// snapshot and restarts the window, so a burst of saves becomes one
/// write carrying the latest state. `flush` writes the pending snapshot
/// immediately; used on graceful shutdown.
pub(crate) struct Debouncer<T> {
    path: PathBuf,
    window: Duration,
    inner: Arc<Mutex<DebounceInner<T>>>,
}

impl<T> Debouncer<T>
where
    T: Serialize + Send + Sync + 'static,
{
    pub(crate) fn new(path: PathBuf, window: Duration) -> Self {
        Self {
            path,
            window,
            inner: Arc::new(Mutex::new(DebounceInner {
                pending: None,
                task: None,
            })),
        }
    }

    pub(crate) async fn schedule(&self, snapshot: T) {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.pending = Some(snapshot);

        let inner_arc = Arc::clone(&self.inner);
        let path = self.path.clone();
        let window = self.window;
        inner.task = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let pending = inner_arc.lock().await.pending.take();
            if let Some(snapshot) = pending {
                if let Err(e) = write_json_file(&path, &snapshot).await {
                    error!("Debounced save to {} failed: {}", path.display(), e);
                } else {
                    debug!("Debounced save to {} complete", path.display());
                }
            }
        }));
    }

    pub(crate) async fn flush(&self) {
        let (pending, task) = {
            let mut inner = self.inner.lock().await;
            (inner.pending.take(), inner.task.take())
        };
        if let Some(task) = task {
            task.abort();
        }
        if let Some(snapshot) = pending {
            if let Err(e) = write_json_file(&self.path, &snapshot).await {
                error!("Flush to {} failed: {}", self.path.display(), e);
            } else {
                debug!("Flushed pending save to {}", self.path.display());
            }
        }
    }
}
