//! Sound type mixer
//!
//! Every channel belongs to one sound type. Each type carries a gain that is
//! applied to the hardware voices of all its live channels, which gives the
//! game independent volume sliders for music, effects, speech and movies.

use crate::config::TypeGainConfig;
use std::fmt;
use std::str::FromStr;

/// Sound categories with independent gain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundType {
    /// Background music
    Music,
    /// Sound effects
    Sfx,
    /// Voice lines
    Voice,
    /// Movie soundtracks
    Video,
}

impl SoundType {
    /// Every sound type
    pub const ALL: [Self; 4] = [Self::Music, Self::Sfx, Self::Voice, Self::Video];

    /// Number of sound types
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index of the type
    pub const fn index(self) -> usize {
        match self {
            Self::Music => 0,
            Self::Sfx => 1,
            Self::Voice => 2,
            Self::Video => 3,
        }
    }

    /// Lowercase name, as accepted by [`FromStr`]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Sfx => "sfx",
            Self::Voice => "voice",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for SoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SoundType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown sound type '{s}' (expected music, sfx, voice or video)"))
    }
}

/// Gain and live channel slots of one sound type
#[derive(Debug, Clone)]
struct TypeGroup {
    gain: f32,
    channels: Vec<u16>,
}

/// Per-type gains and channel membership
#[derive(Debug, Clone)]
pub struct TypeMixer {
    groups: [TypeGroup; SoundType::COUNT],
}

impl TypeMixer {
    /// Create a mixer with every gain at 1.0
    pub fn new() -> Self {
        Self::from_config(&TypeGainConfig::default())
    }

    /// Create a mixer with configured gains
    pub fn from_config(config: &TypeGainConfig) -> Self {
        Self {
            groups: SoundType::ALL.map(|t| TypeGroup {
                gain: config.gain(t),
                channels: Vec::new(),
            }),
        }
    }

    /// Gain of a sound type
    pub fn gain(&self, sound_type: SoundType) -> f32 {
        self.groups[sound_type.index()].gain
    }

    /// Store a new gain for a sound type
    pub fn set_gain(&mut self, sound_type: SoundType, gain: f32) {
        self.groups[sound_type.index()].gain = gain;
    }

    /// Add a channel slot to a type's group
    pub fn register(&mut self, sound_type: SoundType, slot: u16) {
        let channels = &mut self.groups[sound_type.index()].channels;
        if !channels.contains(&slot) {
            channels.push(slot);
        }
    }

    /// Remove a channel slot from a type's group
    pub fn unregister(&mut self, sound_type: SoundType, slot: u16) {
        self.groups[sound_type.index()].channels.retain(|&s| s != slot);
    }

    /// Live channel slots of a type
    pub fn channels(&self, sound_type: SoundType) -> &[u16] {
        &self.groups[sound_type.index()].channels
    }
}

impl Default for TypeMixer {
    fn default() -> Self {
        Self::new()
    }
}
