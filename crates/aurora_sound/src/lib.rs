//! # Aurora Sound
//!
//! Streaming sound runtime for the Aurora engine.
//!
//! ## Features
//!
//! - **Channel Pool**: A fixed table of hardware channels addressed by generation-checked handles
//! - **Background Refill**: A worker thread keeps every playing channel's buffer queue fed
//! - **Format Sniffing**: WAVE, modified WAVE, MP3 and Ogg Vorbis picked from the first bytes
//! - **Looping**: Any rewindable stream can loop a fixed number of times or forever
//! - **Sound Types**: Music, effects, voice and video each get their own gain
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aurora_sound::prelude::*;
//! use std::io::Cursor;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = SoundManager::new(create_backend(), SoundConfig::default())?;
//!     manager.init()?;
//!
//!     let bytes = std::fs::read("sfx/laser.wav")?;
//!     let handle = manager.play_sound_file(Box::new(Cursor::new(bytes)), SoundType::Sfx, false)?;
//!     manager.start_channel(&handle)?;
//!
//!     while manager.is_playing(&handle)? {
//!         std::thread::sleep(std::time::Duration::from_millis(100));
//!     }
//!     manager.deinit();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod audio;
pub mod config;
pub mod foundation;

/// Common imports for sound manager users
pub mod prelude {
    pub use crate::{
        audio::{
            backend::create_backend, AudioBackend, AudioError, AudioStream, ChannelHandle,
            ChannelStream, DecoderRegistry, LoopingAudioStream, RewindableAudioStream,
            SharedAudioStream, SoundManager, SoundType,
        },
        config::{Config, SoundConfig},
        foundation::math::Vec3,
    };
}
