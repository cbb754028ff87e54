//! Shared generator settings.
//!
//! The [`SettingsManager`] gives the control surface and the runtime thread
//! synchronized access to one [`GeneratorConfig`]. Setters validate and write
//! under the lock; the runtime thread reads a fresh value on every tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::GeneratorConfig;
use crate::error::Result;

/// Thread-safe handle to the live configuration plus the mute flag.
#[derive(Clone, Debug)]
pub struct SettingsManager {
    config: Arc<RwLock<GeneratorConfig>>,
    muted: Arc<AtomicBool>,
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}

impl SettingsManager {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            muted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Read the configuration with a closure.
    pub fn with_read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&GeneratorConfig) -> R,
    {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        f(&config)
    }

    /// Write to the configuration with a closure.
    pub fn with_write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut GeneratorConfig) -> R,
    {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut config)
    }

    /// Apply a fallible update. A rejected update leaves the value unchanged.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut GeneratorConfig) -> Result<()>,
    {
        self.with_write(f)
    }

    /// Get a clone of the current configuration.
    pub fn snapshot(&self) -> GeneratorConfig {
        self.with_read(|c| c.clone())
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Muted explicitly, or the configured volume is zero.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed) || self.with_read(|c| c.volume <= 0.0)
    }

    /// Volume sounds should play at right now: 0 while muted.
    pub fn effective_volume(&self) -> f64 {
        if self.muted.load(Ordering::Relaxed) {
            0.0
        } else {
            self.with_read(|c| c.volume)
        }
    }
}
