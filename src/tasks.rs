//! Callbacks and threading helpers for long-running operations
//!
//! Downloads, extraction and installs block on network and disk I/O. Callers
//! run them through [`run_in_background`] and receive updates through a
//! [`TaskContext`], whose callbacks fire on the worker thread.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::versions::DownloadProgress;

/// Context for background tasks
#[derive(Clone)]
pub struct TaskContext {
    pub status_callback: Arc<dyn Fn(String) + Send + Sync>,
    pub progress_callback: Arc<dyn Fn(DownloadProgress) + Send + Sync>,
}

impl TaskContext {
    pub fn new(
        status: impl Fn(String) + Send + Sync + 'static,
        progress: impl Fn(DownloadProgress) + Send + Sync + 'static,
    ) -> Self {
        Self {
            status_callback: Arc::new(status),
            progress_callback: Arc::new(progress),
        }
    }

    /// A context that drops every update
    pub fn silent() -> Self {
        Self::new(|_| {}, |_| {})
    }

    pub fn set_status(&self, msg: String) {
        (self.status_callback)(msg);
    }

    pub fn set_progress(&self, p: DownloadProgress) {
        (self.progress_callback)(p);
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::silent()
    }
}

/// Run `job` on a named worker thread.
pub fn run_in_background<T, F>(name: &str, job: F) -> std::io::Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    std::thread::Builder::new()
        .name(format!("optinstaller-{}", name))
        .spawn(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_callbacks_cross_threads() {
        let (tx, rx) = mpsc::channel();
        let status_tx = tx.clone();
        let ctx = TaskContext::new(
            move |msg| {
                let _ = status_tx.send(format!("status:{}", msg));
            },
            move |p| {
                let _ = tx.send(format!("progress:{:?}", p));
            },
        );

        let handle = run_in_background("test", move || {
            ctx.set_status("Downloading".to_string());
            ctx.set_progress(DownloadProgress::Percent(50.0));
            42
        })
        .unwrap();

        assert_eq!(handle.join().unwrap(), 42);
        let received: Vec<String> = rx.try_iter().collect();
        assert_eq!(received[0], "status:Downloading");
        assert_eq!(received[1], "progress:Percent(50.0)");
    }
}
