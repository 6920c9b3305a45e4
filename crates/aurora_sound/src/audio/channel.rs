//! Playback channels
//!
//! A channel binds one audio stream to one hardware voice and a small pool of
//! hardware buffers. Channels live in the sound manager's slot table and are
//! addressed by a [`ChannelHandle`]: the slot number plus the generation id
//! the channel was created with, so a handle to a reclaimed channel never
//! reaches whatever reuses the slot.

use super::backend::{BufferId, VoiceId};
use super::mixer::SoundType;
use super::stream::AudioStream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// A stream the caller keeps a reference to
///
/// The sound manager locks the stream while holding its own lock. Do not
/// hold this lock across a call into the manager: the background scan skips
/// a channel whose stream is locked, but every other manager call that reads
/// stream state waits for it.
pub type SharedAudioStream = Arc<Mutex<dyn AudioStream>>;

/// Refers to a channel of a sound manager
///
/// The default handle (`channel == 0`, `id == 0`) never refers to a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    channel: u16,
    id: u16,
}

impl ChannelHandle {
    pub(crate) const fn new(channel: u16, id: u16) -> Self {
        Self { channel, id }
    }

    /// Slot number of the channel
    pub const fn channel(&self) -> u16 {
        self.channel
    }

    /// Generation id of the channel
    pub const fn id(&self) -> u16 {
        self.id
    }

    /// Whether the handle has been cleared
    pub const fn is_cleared(&self) -> bool {
        self.channel == 0 && self.id == 0
    }

    /// Reset to the default, invalid handle
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Desired playback state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Should be audible
    Playing,
    /// Held by the game
    Paused,
}

/// The stream a channel reads from
pub enum ChannelStream {
    /// Destroyed together with the channel
    Owned(Box<dyn AudioStream>),
    /// Left alive for the caller when the channel goes away
    Shared(SharedAudioStream),
}

impl ChannelStream {
    /// Wrap a stream the channel should own
    pub fn owned<S: AudioStream + 'static>(stream: S) -> Self {
        Self::Owned(Box::new(stream))
    }

    /// Run `f` with exclusive access to the stream
    pub fn with<R>(&mut self, f: impl FnOnce(&mut dyn AudioStream) -> R) -> R {
        match self {
            Self::Owned(stream) => f(stream.as_mut()),
            Self::Shared(stream) => f(&mut *stream.lock()),
        }
    }

    /// Whether someone else currently holds a shared stream's lock
    pub fn is_locked(&self) -> bool {
        match self {
            Self::Owned(_) => false,
            Self::Shared(stream) => stream.is_locked(),
        }
    }

    /// Whether the stream is stereo
    pub fn is_stereo(&self) -> bool {
        match self {
            Self::Owned(stream) => stream.is_stereo(),
            Self::Shared(stream) => stream.lock().is_stereo(),
        }
    }

    /// Whether the stream is completely finished
    pub fn end_of_stream(&self) -> bool {
        match self {
            Self::Owned(stream) => stream.end_of_stream(),
            Self::Shared(stream) => stream.lock().end_of_stream(),
        }
    }

    /// Whether every sample has been read
    pub fn end_of_data(&self) -> bool {
        match self {
            Self::Owned(stream) => stream.end_of_data(),
            Self::Shared(stream) => stream.lock().end_of_data(),
        }
    }
}

impl From<Box<dyn AudioStream>> for ChannelStream {
    fn from(stream: Box<dyn AudioStream>) -> Self {
        Self::Owned(stream)
    }
}

impl From<SharedAudioStream> for ChannelStream {
    fn from(stream: SharedAudioStream) -> Self {
        Self::Shared(stream)
    }
}

impl fmt::Debug for ChannelStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned(_) => f.write_str("ChannelStream::Owned"),
            Self::Shared(_) => f.write_str("ChannelStream::Shared"),
        }
    }
}

/// Runtime state of one live channel
#[derive(Debug)]
pub(crate) struct Channel {
    pub id: u16,
    pub state: ChannelState,
    pub sound_type: SoundType,
    pub stream: ChannelStream,
    /// Created lazily during setup; `None` only while setup is incomplete
    pub voice: Option<VoiceId>,
    /// Every buffer owned by the channel, queued or free
    pub buffers: Vec<BufferId>,
    /// Buffers not currently queued on the voice
    pub free_buffers: VecDeque<BufferId>,
    /// Registered in the sound type's group
    pub registered: bool,
}

impl Channel {
    pub fn new(id: u16, stream: ChannelStream, sound_type: SoundType) -> Self {
        Self {
            id,
            state: ChannelState::Paused,
            sound_type,
            stream,
            voice: None,
            buffers: Vec::new(),
            free_buffers: VecDeque::new(),
            registered: false,
        }
    }
}
