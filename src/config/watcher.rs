//! Configuration file watcher for hot reload.
//!
//! Watches the config path for writes and creations, debounces editor
//! event bursts, re-loads and re-validates the file, and hands the new
//! config to an `on_change` callback. Any failure along the way is logged
//! and the previous configuration stays in effect.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::loader::load_config;
use crate::config::schema::Config;

/// Editors often emit several events per save; collapse them.
const DEBOUNCE: Duration = Duration::from_millis(200);

/// Callback invoked with each successfully loaded configuration.
///
/// Returning an error keeps the previous configuration in effect.
pub type OnChange =
    dyn Fn(Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync;

/// Watches the configuration file and applies reloads.
///
/// Reloads are serialized by the single consumer task, so two `on_change`
/// invocations never overlap.
pub struct ConfigWatcher {
    watcher: Mutex<Option<RecommendedWatcher>>,
    stopped: Arc<AtomicBool>,
}

impl ConfigWatcher {
    /// Start watching `path`. Must be called from within a tokio runtime.
    pub fn spawn(path: PathBuf, on_change: Box<OnChange>) -> Result<Self, notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "config watch error"),
            }
        })?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        let stopped = Arc::new(AtomicBool::new(false));
        let task_stopped = stopped.clone();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                tokio::time::sleep(DEBOUNCE).await;
                while rx.try_recv().is_ok() {}

                if task_stopped.load(Ordering::SeqCst) {
                    break;
                }
                info!(path = %path.display(), "config file changed, reloading");
                reload(&path, on_change.as_ref());
            }
        });

        info!("config watcher started");
        Ok(Self {
            watcher: Mutex::new(Some(watcher)),
            stopped,
        })
    }

    /// Stop watching. Idempotent; after the first call no further
    /// callbacks fire.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.watcher.lock().expect("watcher state poisoned").take();
        info!("config watcher stopped");
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reload(path: &std::path::Path, on_change: &OnChange) {
    let config = match load_config(path) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to reload config, keeping previous configuration");
            return;
        }
    };

    if let Err(err) = on_change(config) {
        error!(error = %err, "failed to apply new config, keeping previous configuration");
        return;
    }

    info!("configuration reloaded");
}
