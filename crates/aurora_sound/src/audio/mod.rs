//! Audio system
//!
//! Streams decoded audio into a fixed pool of hardware playback channels.
//!
//! The pieces, leaf to root:
//! - [`stream`]: the sample producer contract every decoder implements
//! - [`pcm`] and [`decoders`]: format sniffing and the concrete streams
//! - [`looping`]: a decorator that rewinds a stream forever (or N times)
//! - [`backend`]: the hardware layer (voices with queued buffers)
//! - [`channel`] and [`mixer`]: per-channel runtime state and sound type gains
//! - [`sound_manager`]: the service that owns all of the above plus the
//!   background refill thread

pub mod backend;
pub mod channel;
pub mod decoders;
pub mod looping;
pub mod mixer;
pub mod pcm;
pub mod sound_manager;
pub mod stream;
pub mod sub_stream;

#[cfg(test)]
mod tests;

pub use backend::{AudioBackend, BufferId, SampleLayout, VoiceId, VoiceState};
pub use channel::{ChannelHandle, ChannelState, ChannelStream, SharedAudioStream};
pub use decoders::{CodecKind, DecodedStream, DecoderRegistry, SoundFormat};
pub use looping::LoopingAudioStream;
pub use mixer::{SoundType, TypeMixer};
pub use pcm::WavStream;
pub use sound_manager::SoundManager;
pub use stream::{AudioStream, RewindableAudioStream};
pub use sub_stream::{SeekableStream, SubReadStream};

/// Errors raised by the audio system
#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    /// The sound manager has not been initialized
    #[error("Sound manager not ready")]
    NotReady,

    /// The byte stream does not start with a known sound tag
    #[error("Unknown sound format (tag {tag:#010x})")]
    UnknownFormat {
        /// Big-endian tag found at the start of the stream
        tag: u32,
    },

    /// A known container with a broken inner structure
    #[error("Corrupt sound data: {0}")]
    CorruptFormat(String),

    /// No decoder is registered for a recognised codec
    #[error("No decoder registered for {0:?}")]
    NoDecoder(CodecKind),

    /// Every channel slot is in use
    #[error("All sound channels occupied")]
    AllChannelsOccupied,

    /// The handle does not name a live channel
    #[error("Invalid channel")]
    InvalidChannel,

    /// Device or driver failure
    #[error("Audio hardware error: {0}")]
    HardwareError(String),

    /// Positional audio requested on a stereo source
    #[error("Operation not supported on a stereo sound")]
    UnsupportedOnStereo,

    /// Decoding or rewinding a stream failed
    #[error("Audio stream error: {0}")]
    StreamError(String),

    /// The sound configuration was rejected
    #[error("Invalid sound configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// IO error from the underlying byte stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audio operations
pub type Result<T> = std::result::Result<T, AudioError>;
