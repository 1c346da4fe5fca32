//! Active configuration holder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::watch::Config;
use crate::error::ConfigError;

/// Owns the active [`Config`] and the file it is read from.
///
/// Readers get an `Arc` to an immutable snapshot; a replacement is a single
/// pointer swap, so no reader ever sees a half-applied configuration.
#[derive(Debug)]
pub struct ConfigStore {
    source: PathBuf,
    active: RwLock<Arc<Config>>,
}

impl ConfigStore {
    /// Load `source` and make it the active configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial configuration is invalid.
    pub fn open(source: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let source = source.into();
        let config = Config::load(&source)?;

        tracing::info!(
            source = %source.display(),
            roots = config.directories.len(),
            "Configuration loaded"
        );

        Ok(Self {
            source,
            active: RwLock::new(Arc::new(config)),
        })
    }

    /// Path of the backing configuration file.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Re-read the backing file without activating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or invalid.
    pub fn load(&self) -> Result<Config, ConfigError> {
        Config::load(&self.source)
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn active(&self) -> Arc<Config> {
        Arc::clone(&*self.active.read())
    }

    /// Atomically activate `config`, returning the previous one.
    pub fn replace(&self, config: Arc<Config>) -> Arc<Config> {
        std::mem::replace(&mut *self.active.write(), config)
    }
}
