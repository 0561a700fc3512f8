//! Thread-safe holder for the current config with atomic persistence.

use crate::config::{self, Config};
use crate::error::ResolverResult;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Owns the current config and its on-disk path, so saves and updates do not
/// need paths passed around. Readers always get a coherent deep clone.
pub struct ConfigStore {
    path: PathBuf,
    cfg: RwLock<Config>,
}

impl ConfigStore {
    pub fn new(path: &Path, cfg: Config) -> Self {
        Self {
            path: path.to_path_buf(),
            cfg: RwLock::new(cfg),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a defensive clone so callers cannot observe concurrent
    /// mutation.
    pub fn get(&self) -> Config {
        self.cfg
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Normalize, validate and apply a config in memory only. The one
    /// exception to "no disk write" is freshly generated domain keys, which
    /// are persisted so reloads stay deterministic.
    pub fn set(&self, mut next: Config) -> ResolverResult<()> {
        let generated = next.normalize();
        next.validate()?;
        if generated {
            config::save_config(&self.path, &mut next)?;
        }
        let mut guard = self
            .cfg
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = next;
        tracing::debug!(path = %self.path.display(), "config applied in memory");
        Ok(())
    }

    /// Normalize, validate, write to disk atomically, then apply in memory.
    pub fn save(&self, mut next: Config) -> ResolverResult<()> {
        next.normalize();
        next.validate()?;
        let mut guard = self
            .cfg
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        config::save_config(&self.path, &mut next)?;
        *guard = next;
        tracing::info!(path = %self.path.display(), "config saved");
        Ok(())
    }

    /// Persist the already-applied config.
    pub fn save_current(&self) -> ResolverResult<()> {
        let mut guard = self
            .cfg
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.validate()?;
        let mut current = guard.clone();
        config::save_config(&self.path, &mut current)?;
        *guard = current;
        tracing::info!(path = %self.path.display(), "config saved");
        Ok(())
    }

    /// Preferred mutation entry point: clone, apply `mutate`, normalize,
    /// validate, persist atomically, and only then swap the in-memory config.
    pub fn update<F>(&self, mutate: F) -> ResolverResult<()>
    where
        F: FnOnce(&mut Config) -> ResolverResult<()>,
    {
        let mut guard = self
            .cfg
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Work on a clone so a failed mutation never touches shared state.
        let mut next = guard.clone();
        mutate(&mut next)?;
        next.normalize();
        next.validate()?;
        config::save_config(&self.path, &mut next)?;
        *guard = next;
        tracing::info!(path = %self.path.display(), "config updated");
        Ok(())
    }
}
