//! # Sound Manager Configuration
//!
//! Tuning knobs for the channel table, the per-channel buffer pool and the
//! background refill thread.

use super::{Config, ConfigError};
use crate::audio::SoundType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default gain for every sound type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeGainConfig {
    /// Background music
    pub music: f32,
    /// Sound effects
    pub sfx: f32,
    /// Voice lines
    pub voice: f32,
    /// Movie soundtracks
    pub video: f32,
}

impl TypeGainConfig {
    /// Configured gain for a sound type
    pub fn gain(&self, sound_type: SoundType) -> f32 {
        match sound_type {
            SoundType::Music => self.music,
            SoundType::Sfx => self.sfx,
            SoundType::Voice => self.voice,
            SoundType::Video => self.video,
        }
    }
}

impl Default for TypeGainConfig {
    fn default() -> Self {
        Self {
            music: 1.0,
            sfx: 1.0,
            voice: 1.0,
            video: 1.0,
        }
    }
}

/// Sound manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    /// Number of channel slots, including the reserved slot 0
    pub channel_count: u16,
    /// Hardware buffers per channel
    ///
    /// 5 is a safe number; in practice rarely more than 2 are in flight.
    pub buffer_count: usize,
    /// Bytes per hardware buffer
    ///
    /// High enough to prevent stuttering, low enough to avoid noticeable lag.
    pub buffer_size: usize,
    /// Period of the background scan in milliseconds
    pub update_interval_ms: u64,
    /// How long `deinit` waits for the background thread in milliseconds
    pub shutdown_timeout_ms: u64,
    /// Run the refill scan on a background thread
    ///
    /// When false the owner is expected to call `SoundManager::update` itself,
    /// typically once per frame.
    pub threaded: bool,
    /// Listener gain applied on `init`
    pub listener_gain: f32,
    /// Type gains applied on `init`
    pub type_gains: TypeGainConfig,
}

impl SoundConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self {
            channel_count: 256,
            buffer_count: 5,
            buffer_size: 32768,
            update_interval_ms: 100,
            shutdown_timeout_ms: 1000,
            threaded: true,
            listener_gain: 1.0,
            type_gains: TypeGainConfig::default(),
        }
    }

    /// Set the number of channel slots
    #[must_use]
    pub fn with_channel_count(mut self, count: u16) -> Self {
        self.channel_count = count;
        self
    }

    /// Set the buffer pool shape
    #[must_use]
    pub fn with_buffers(mut self, count: usize, size: usize) -> Self {
        self.buffer_count = count;
        self.buffer_size = size;
        self
    }

    /// Enable or disable the background refill thread
    #[must_use]
    pub fn with_threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }

    /// Set the background scan period
    #[must_use]
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Background scan period
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Thread shutdown timeout
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Samples (interleaved, 16 bit) that fit into one hardware buffer
    pub fn samples_per_buffer(&self) -> usize {
        self.buffer_size / 2
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_count < 2 {
            return Err(ConfigError::Invalid(
                "channel_count must leave at least one usable slot".to_string(),
            ));
        }

        if self.buffer_count == 0 {
            return Err(ConfigError::Invalid("buffer_count must be at least 1".to_string()));
        }

        // One stereo frame of 16 bit samples
        if self.buffer_size < 4 {
            return Err(ConfigError::Invalid("buffer_size must be at least 4 bytes".to_string()));
        }

        if self.update_interval_ms == 0 {
            return Err(ConfigError::Invalid("update_interval_ms must be positive".to_string()));
        }

        let gains = [
            self.listener_gain,
            self.type_gains.music,
            self.type_gains.sfx,
            self.type_gains.voice,
            self.type_gains.video,
        ];
        if gains.iter().any(|gain| !gain.is_finite() || *gain < 0.0) {
            return Err(ConfigError::Invalid("gains must be finite and non-negative".to_string()));
        }

        Ok(())
    }
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for SoundConfig {}
