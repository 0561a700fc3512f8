//! Hot reload of the config file via filesystem events.
//!
//! The parent directory is watched rather than the file itself: atomic saves
//! replace the file by rename, and a directory watch keeps delivering events
//! for the basename across such replacements.

use crate::config;
use crate::config_store::ConfigStore;
use crate::error::{ResolverError, ResolverResult};
use crate::logging;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Start watching the config file. The returned watcher must be kept alive
/// for the lifetime of the server; dropping it stops the reloads.
pub fn watch_config_file(
    path: &Path,
    store: Arc<ConfigStore>,
) -> ResolverResult<RecommendedWatcher> {
    let watched: PathBuf = path.to_path_buf();
    let dir = watched
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let callback_path = watched.clone();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        match res {
            Ok(event) => handle_event(&event, &callback_path, &store),
            Err(e) => tracing::warn!(error = %e, "config watcher error"),
        }
    })
    .map_err(|e| ResolverError::Internal(format!("config watcher: {e}")))?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| ResolverError::Internal(format!("config watcher: {e}")))?;

    Ok(watcher)
}

fn handle_event(event: &Event, path: &Path, store: &ConfigStore) {
    if !matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) {
        return;
    }
    let base_name = path.file_name();
    let affected = event
        .paths
        .iter()
        .any(|p| p == path || p.file_name() == base_name);
    if !affected {
        return;
    }
    reload(path, store);
}

fn reload(path: &Path, store: &ConfigStore) {
    let cfg = match config::load_config(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config reload failed");
            return;
        }
    };
    if let Err(e) = cfg.validate() {
        tracing::warn!(path = %path.display(), error = %e, "config reload rejected");
        return;
    }
    if let Err(e) = store.set(cfg.clone()) {
        tracing::error!(path = %path.display(), error = %e, "config apply failed");
        return;
    }

    logging::apply_level(&cfg.logging.level);
    for domain in &cfg.domains {
        tracing::info!(
            domain = %domain.domain,
            name = %format!("_cryptalias.{}", domain.domain),
            value = %domain.dns_txt_value(),
            "dns txt record"
        );
    }
    tracing::info!(path = %path.display(), "config reloaded from disk");
}
