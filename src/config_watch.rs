// Config hot reload
//
// The watcher thread parses edits to config.toml and parks the result in a
// pending slot; the event loop picks it up at the start of its next frame.
// Invalid edits are logged and dropped, the running config stays.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;

type PendingSlot = Arc<Mutex<Option<Config>>>;

pub struct ConfigWatcher {
    pending: PendingSlot,
    // Dropping the watcher stops the thread
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = std::path::absolute(path.as_ref())
            .with_context(|| format!("Failed to resolve config path: {:?}", path.as_ref()))?;
        let pending: PendingSlot = Arc::new(Mutex::new(None));

        let slot = pending.clone();
        let target = path.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => handle_event(&event, &target, &slot),
            Err(e) => log::warn!("Config watcher error: {}", e),
        })
        .context("Failed to create config watcher")?;

        // Editors often replace the file instead of writing it, so watch the directory
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {:?}", dir))?;

        log::info!("Watching {:?} for changes", path);

        Ok(Self {
            pending,
            _watcher: watcher,
        })
    }

    /// Most recent valid edit since the last call, if any
    pub fn take_pending(&self) -> Option<Config> {
        self.pending.lock().take()
    }
}

fn handle_event(event: &Event, target: &Path, slot: &PendingSlot) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }
    if !event.paths.iter().any(|p| p == target) {
        return;
    }

    match Config::load_from_path(target) {
        Ok(config) => {
            log::info!("Config reloaded from {:?}", target);
            *slot.lock() = Some(config);
        }
        Err(e) => log::warn!("Ignoring config change: {:#}", e),
    }
}
