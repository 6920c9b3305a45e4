//! Audio backend implementations
//!
//! Platform-independent abstraction over the audio device. The contract is
//! shaped after streaming hardware APIs: a *voice* plays a queue of
//! *buffers*, buffers the voice has finished with count as *processed* and
//! can be unqueued, refilled and queued again.

#[cfg(feature = "rodio-backend")]
pub mod rodio_backend;
pub mod simulated;

use super::Result;
use crate::foundation::math::Vec3;

#[cfg(feature = "rodio-backend")]
pub use rodio_backend::RodioBackend;
pub use simulated::{BackendStats, SimulatedBackend};

/// Identifies a voice within one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u32);

/// Identifies a buffer within one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Sample layout of buffer data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// One 16 bit channel
    Mono16,
    /// Interleaved left/right 16 bit channels
    Stereo16,
}

impl SampleLayout {
    /// Layout for a mono or stereo stream
    pub fn for_stereo(stereo: bool) -> Self {
        if stereo {
            Self::Stereo16
        } else {
            Self::Mono16
        }
    }

    /// Number of interleaved channels
    pub fn channels(self) -> u16 {
        match self {
            Self::Mono16 => 1,
            Self::Stereo16 => 2,
        }
    }
}

/// Playback state of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Created, never started
    Initial,
    /// Consuming its buffer queue
    Playing,
    /// Paused by request
    Paused,
    /// Ran out of queued buffers
    Stopped,
}

/// Audio backend trait for platform abstraction
///
/// All failures are reported as [`AudioError::HardwareError`](super::AudioError::HardwareError).
/// Backends are driven from behind the sound manager's lock, so they only
/// need to be `Send`.
pub trait AudioBackend: Send {
    /// Open the output device
    fn open(&mut self) -> Result<()>;

    /// Close the output device, dropping every voice and buffer
    fn close(&mut self);

    /// Check if the device is open
    fn is_open(&self) -> bool;

    /// Set the master gain applied on top of every voice
    fn set_listener_gain(&mut self, gain: f32) -> Result<()>;

    /// Create a voice in the [`VoiceState::Initial`] state
    fn create_voice(&mut self) -> Result<VoiceId>;

    /// Destroy a voice; its queued buffers become unattached
    fn destroy_voice(&mut self, voice: VoiceId) -> Result<()>;

    /// Create an empty buffer
    fn create_buffer(&mut self) -> Result<BufferId>;

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferId) -> Result<()>;

    /// Replace the contents of a buffer
    fn buffer_data(
        &mut self,
        buffer: BufferId,
        layout: SampleLayout,
        samples: &[i16],
        rate: u32,
    ) -> Result<()>;

    /// Append a buffer to the voice's queue
    fn queue_buffer(&mut self, voice: VoiceId, buffer: BufferId) -> Result<()>;

    /// Remove the oldest processed buffer from the voice's queue
    fn unqueue_buffer(&mut self, voice: VoiceId) -> Result<BufferId>;

    /// Number of buffers in the voice's queue, processed ones included
    fn buffers_queued(&self, voice: VoiceId) -> Result<usize>;

    /// Number of queued buffers the voice has finished playing
    fn buffers_processed(&self, voice: VoiceId) -> Result<usize>;

    /// Current playback state of a voice
    fn voice_state(&self, voice: VoiceId) -> Result<VoiceState>;

    /// Start or resume playback
    fn play(&mut self, voice: VoiceId) -> Result<()>;

    /// Pause playback
    fn pause(&mut self, voice: VoiceId) -> Result<()>;

    /// Set the gain of a voice
    fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<()>;

    /// Get the gain of a voice
    fn gain(&self, voice: VoiceId) -> Result<f32>;

    /// Set the position of a (mono) voice in world space
    fn set_position(&mut self, voice: VoiceId, position: Vec3) -> Result<()>;

    /// Get the position of a voice
    fn position(&self, voice: VoiceId) -> Result<Vec3>;
}

impl<B: AudioBackend + ?Sized> AudioBackend for Box<B> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn set_listener_gain(&mut self, gain: f32) -> Result<()> {
        (**self).set_listener_gain(gain)
    }

    fn create_voice(&mut self) -> Result<VoiceId> {
        (**self).create_voice()
    }

    fn destroy_voice(&mut self, voice: VoiceId) -> Result<()> {
        (**self).destroy_voice(voice)
    }

    fn create_buffer(&mut self) -> Result<BufferId> {
        (**self).create_buffer()
    }

    fn destroy_buffer(&mut self, buffer: BufferId) -> Result<()> {
        (**self).destroy_buffer(buffer)
    }

    fn buffer_data(
        &mut self,
        buffer: BufferId,
        layout: SampleLayout,
        samples: &[i16],
        rate: u32,
    ) -> Result<()> {
        (**self).buffer_data(buffer, layout, samples, rate)
    }

    fn queue_buffer(&mut self, voice: VoiceId, buffer: BufferId) -> Result<()> {
        (**self).queue_buffer(voice, buffer)
    }

    fn unqueue_buffer(&mut self, voice: VoiceId) -> Result<BufferId> {
        (**self).unqueue_buffer(voice)
    }

    fn buffers_queued(&self, voice: VoiceId) -> Result<usize> {
        (**self).buffers_queued(voice)
    }

    fn buffers_processed(&self, voice: VoiceId) -> Result<usize> {
        (**self).buffers_processed(voice)
    }

    fn voice_state(&self, voice: VoiceId) -> Result<VoiceState> {
        (**self).voice_state(voice)
    }

    fn play(&mut self, voice: VoiceId) -> Result<()> {
        (**self).play(voice)
    }

    fn pause(&mut self, voice: VoiceId) -> Result<()> {
        (**self).pause(voice)
    }

    fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<()> {
        (**self).set_gain(voice, gain)
    }

    fn gain(&self, voice: VoiceId) -> Result<f32> {
        (**self).gain(voice)
    }

    fn set_position(&mut self, voice: VoiceId, position: Vec3) -> Result<()> {
        (**self).set_position(voice, position)
    }

    fn position(&self, voice: VoiceId) -> Result<Vec3> {
        (**self).position(voice)
    }
}

/// Create the default audio backend for the platform
#[cfg(feature = "rodio-backend")]
pub fn create_backend() -> Box<dyn AudioBackend> {
    Box::new(RodioBackend::new())
}

/// Create the default audio backend for the platform
#[cfg(not(feature = "rodio-backend"))]
pub fn create_backend() -> Box<dyn AudioBackend> {
    log::warn!("Built without an audio output backend, using the simulated device");
    Box::new(SimulatedBackend::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_channels() {
        assert_eq!(SampleLayout::for_stereo(false), SampleLayout::Mono16);
        assert_eq!(SampleLayout::for_stereo(true).channels(), 2);
        assert_eq!(SampleLayout::Mono16.channels(), 1);
    }
}
