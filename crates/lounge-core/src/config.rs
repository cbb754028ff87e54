//! Generator configuration.
//!
//! Configuration is read from TOML at:
//! - Linux: `~/.config/lounge/config.toml`
//! - macOS: `~/Library/Application Support/lounge/config.toml`
//! - Windows: `%APPDATA%\lounge\config.toml`
//!
//! Every user-adjustable field has a validating setter. A rejected value
//! leaves the previous one in place and returns [`Error::Config`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::timeline::DEFAULT_LOOP_DURATION_SECS;

/// Shortest accepted auto-play interval.
pub const MIN_AUTO_PLAY_INTERVAL_MS: u64 = 50;

/// Largest accepted transpose in either direction.
pub const MAX_TRANSPOSE: i32 = 24;

/// Where the note selector runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeMode {
    /// On the generator's runtime thread.
    #[default]
    Inline,
    /// On a dedicated worker thread reached over a channel.
    Offloaded,
}

/// User-adjustable generator settings plus the fixed asset locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Instrument name, or several separated by commas.
    pub instrument: String,
    /// Output volume (0.0-1.0)
    pub volume: f64,
    /// Whether the auto-play loop requests notes on its own
    pub auto_play: bool,
    /// Probability (0.0-1.0) that an auto-play tick requests a note
    pub auto_play_chance: f64,
    /// Milliseconds between auto-play ticks
    pub auto_play_interval_ms: u64,
    /// Transpose in semitones
    pub transpose: i32,
    /// Root of the sample directory tree
    pub base_url: String,
    /// Backing track file, relative to `base_url`
    pub backing_loop_url: String,
    /// Length of the backing track in seconds; the progression is scaled to fit
    pub loop_duration_secs: f64,
    /// Instruments with a sample set under `base_url`
    pub available_instruments: Vec<String>,
    /// Where notes are computed
    pub compute_mode: ComputeMode,
    /// How long an offloaded request may stay unanswered before the worker
    /// is restarted
    pub worker_timeout_ms: u64,
    /// Fade-out length of each note
    pub note_fade_ms: u64,
    /// Fixed random seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            instrument: "piano".to_string(),
            volume: 1.0,
            auto_play: true,
            auto_play_chance: 0.2,
            auto_play_interval_ms: 300,
            transpose: -5,
            base_url: "web/sounds".to_string(),
            backing_loop_url: "jazz_loop.ogg".to_string(),
            loop_duration_secs: DEFAULT_LOOP_DURATION_SECS,
            available_instruments: vec!["piano".to_string()],
            compute_mode: ComputeMode::Inline,
            worker_timeout_ms: 2000,
            note_fade_ms: 1000,
            seed: None,
        }
    }
}

/// Split a comma separated instrument list, trimming blanks.
pub fn parse_instruments(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn reject(message: String) -> Error {
    log::warn!("[CONFIG] {}", message);
    Error::Config(message)
}

impl GeneratorConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: GeneratorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, or fall back to defaults.
    pub fn load_or_default() -> Self {
        match Self::config_path() {
            Ok(path) if path.exists() => Self::load(&path).unwrap_or_else(|e| {
                log::warn!("[CONFIG] ignoring {}: {}", path.display(), e);
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "lounge") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Check every field against the same rules the setters enforce.
    pub fn validate(&self) -> Result<()> {
        if self.available_instruments.is_empty() {
            return Err(reject("available_instruments is empty".to_string()));
        }
        self.check_instrument(&self.instrument)?;
        check_unit("volume", self.volume)?;
        check_unit("auto_play_chance", self.auto_play_chance)?;
        check_interval(self.auto_play_interval_ms)?;
        check_transpose(self.transpose)?;
        if !(self.loop_duration_secs > 0.0 && self.loop_duration_secs.is_finite()) {
            return Err(reject(format!(
                "loop_duration_secs must be positive, got {}",
                self.loop_duration_secs
            )));
        }
        if self.worker_timeout_ms == 0 {
            return Err(reject("worker_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Selected instruments, in order.
    pub fn instruments(&self) -> Vec<String> {
        parse_instruments(&self.instrument)
    }

    pub fn set_volume(&mut self, volume: f64) -> Result<()> {
        check_unit("volume", volume)?;
        self.volume = volume;
        Ok(())
    }

    /// Select one instrument or a comma separated list.
    pub fn set_instrument(&mut self, csv: &str) -> Result<()> {
        let normalized = self.check_instrument(csv)?;
        self.instrument = normalized;
        Ok(())
    }

    pub fn set_transpose(&mut self, semitones: i32) -> Result<()> {
        check_transpose(semitones)?;
        self.transpose = semitones;
        Ok(())
    }

    pub fn set_auto_play(&mut self, enabled: bool) {
        self.auto_play = enabled;
    }

    pub fn set_auto_play_chance(&mut self, chance: f64) -> Result<()> {
        check_unit("auto_play_chance", chance)?;
        self.auto_play_chance = chance;
        Ok(())
    }

    pub fn set_auto_play_interval(&mut self, ms: u64) -> Result<()> {
        check_interval(ms)?;
        self.auto_play_interval_ms = ms;
        Ok(())
    }

    pub fn auto_play_interval(&self) -> Duration {
        Duration::from_millis(self.auto_play_interval_ms)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    pub fn note_fade(&self) -> Duration {
        Duration::from_millis(self.note_fade_ms)
    }

    /// URL of the backing track.
    pub fn backing_loop_path(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.backing_loop_url
        )
    }

    /// Validate an instrument list and return it normalized (`a,b`).
    fn check_instrument(&self, csv: &str) -> Result<String> {
        let names = parse_instruments(csv);
        if names.is_empty() {
            return Err(reject("no instrument selected".to_string()));
        }
        if let Some(unknown) = names
            .iter()
            .find(|n| !self.available_instruments.iter().any(|a| a == *n))
        {
            return Err(reject(format!(
                "unknown instrument '{}' (available: {})",
                unknown,
                self.available_instruments.join(", ")
            )));
        }
        Ok(names.join(","))
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(reject(format!("{} must be within 0..=1, got {}", name, value)))
    }
}

fn check_interval(ms: u64) -> Result<()> {
    if ms >= MIN_AUTO_PLAY_INTERVAL_MS {
        Ok(())
    } else {
        Err(reject(format!(
            "auto-play interval must be at least {} ms, got {}",
            MIN_AUTO_PLAY_INTERVAL_MS, ms
        )))
    }
}

fn check_transpose(semitones: i32) -> Result<()> {
    if semitones.abs() <= MAX_TRANSPOSE {
        Ok(())
    } else {
        Err(reject(format!(
            "transpose must be within ±{} semitones, got {}",
            MAX_TRANSPOSE, semitones
        )))
    }
}
