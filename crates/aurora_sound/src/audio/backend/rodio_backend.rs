//! Rodio audio backend implementation
//!
//! Maps the voice/buffer contract onto rodio: every voice is a [`Sink`] and
//! every queued buffer is appended to it as a [`SamplesBuffer`]. The sink's
//! own queue length tells how many buffers are still pending.
//!
//! The [`OutputStream`] is not `Send` on every platform, so it lives on a
//! small device thread for as long as the backend is open; only its
//! `Send` handle is kept here.
//!
//! Positions are stored but not spatialised.

use super::{AudioBackend, BufferId, SampleLayout, VoiceId, VoiceState};
use crate::audio::{AudioError, Result};
use crate::foundation::math::{origin, Vec3};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

/// Keeps the output stream alive on its own thread
struct Device {
    handle: OutputStreamHandle,
    /// Dropping the sender releases the device thread
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Device {
    fn open() -> Result<Self> {
        let (handle_tx, handle_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("aurora-audio-device".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    if handle_tx.send(Ok(handle)).is_ok() {
                        // Blocks until the backend closes
                        let _ = shutdown_rx.recv();
                    }
                    drop(stream);
                }
                Err(e) => {
                    let _ = handle_tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| AudioError::HardwareError(format!("Failed to spawn device thread: {e}")))?;

        let handle = handle_rx
            .recv()
            .map_err(|_| AudioError::HardwareError("Audio device thread exited".to_string()))?
            .map_err(|e| AudioError::HardwareError(format!("Failed to create audio output: {e}")))?;

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    fn close(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Audio device thread panicked");
            }
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
    }
}

/// PCM kept for queueing
struct PcmBuffer {
    channels: u16,
    rate: u32,
    samples: Vec<i16>,
}

struct RodioVoice {
    sink: Sink,
    /// `play` or `pause` has been called at least once
    started: bool,
    /// Buffers appended to the sink, oldest first
    queued: VecDeque<BufferId>,
    gain: f32,
    position: Vec3,
}

impl RodioVoice {
    fn processed(&self) -> usize {
        self.queued.len().saturating_sub(self.sink.len())
    }
}

/// Rodio-based audio backend
pub struct RodioBackend {
    device: Option<Device>,
    voices: HashMap<VoiceId, RodioVoice>,
    buffers: HashMap<BufferId, PcmBuffer>,
    next_id: u32,
    listener_gain: f32,
}

impl RodioBackend {
    /// Create a closed backend; the device is opened by [`AudioBackend::open`]
    pub fn new() -> Self {
        Self {
            device: None,
            voices: HashMap::new(),
            buffers: HashMap::new(),
            next_id: 1,
            listener_gain: 1.0,
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    fn voice(&self, voice: VoiceId) -> Result<&RodioVoice> {
        self.voices
            .get(&voice)
            .ok_or_else(|| AudioError::HardwareError(format!("Invalid voice {}", voice.0)))
    }

    fn voice_mut(&mut self, voice: VoiceId) -> Result<&mut RodioVoice> {
        self.voices
            .get_mut(&voice)
            .ok_or_else(|| AudioError::HardwareError(format!("Invalid voice {}", voice.0)))
    }

    fn apply_volume(&self, voice: &RodioVoice) {
        voice.sink.set_volume(voice.gain * self.listener_gain);
    }
}

impl AudioBackend for RodioBackend {
    fn open(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Ok(());
        }

        self.device = Some(Device::open()?);
        log::info!("Rodio audio backend initialized");
        Ok(())
    }

    fn close(&mut self) {
        let Some(mut device) = self.device.take() else {
            return;
        };

        for (_voice, voice) in self.voices.drain() {
            voice.sink.stop();
        }
        self.buffers.clear();
        device.close();

        log::info!("Rodio audio backend shutdown");
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn set_listener_gain(&mut self, gain: f32) -> Result<()> {
        self.listener_gain = gain;
        for voice in self.voices.values() {
            self.apply_volume(voice);
        }
        Ok(())
    }

    fn create_voice(&mut self) -> Result<VoiceId> {
        let device = self.device.as_ref().ok_or_else(|| {
            AudioError::HardwareError("Audio backend not initialized".to_string())
        })?;

        let sink = Sink::try_new(&device.handle)
            .map_err(|e| AudioError::HardwareError(format!("Failed to create sink: {e}")))?;
        // Hold queued audio until the voice is started
        sink.pause();

        let voice = RodioVoice {
            sink,
            started: false,
            queued: VecDeque::new(),
            gain: 1.0,
            position: origin(),
        };
        self.apply_volume(&voice);

        let id = VoiceId(self.next_id());
        self.voices.insert(id, voice);
        Ok(id)
    }

    fn destroy_voice(&mut self, voice: VoiceId) -> Result<()> {
        let removed = self
            .voices
            .remove(&voice)
            .ok_or_else(|| AudioError::HardwareError(format!("Invalid voice {}", voice.0)))?;
        removed.sink.stop();
        Ok(())
    }

    fn create_buffer(&mut self) -> Result<BufferId> {
        if self.device.is_none() {
            return Err(AudioError::HardwareError("Audio backend not initialized".to_string()));
        }

        let id = BufferId(self.next_id());
        self.buffers.insert(
            id,
            PcmBuffer {
                channels: 1,
                rate: 0,
                samples: Vec::new(),
            },
        );
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) -> Result<()> {
        self.buffers
            .remove(&buffer)
            .map(|_| ())
            .ok_or_else(|| AudioError::HardwareError(format!("Invalid buffer {}", buffer.0)))
    }

    fn buffer_data(
        &mut self,
        buffer: BufferId,
        layout: SampleLayout,
        samples: &[i16],
        rate: u32,
    ) -> Result<()> {
        let data = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| AudioError::HardwareError(format!("Invalid buffer {}", buffer.0)))?;
        data.channels = layout.channels();
        data.rate = rate;
        data.samples.clear();
        data.samples.extend_from_slice(samples);
        Ok(())
    }

    fn queue_buffer(&mut self, voice: VoiceId, buffer: BufferId) -> Result<()> {
        let data = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| AudioError::HardwareError(format!("Invalid buffer {}", buffer.0)))?;
        if data.rate == 0 {
            return Err(AudioError::HardwareError(format!("Buffer {} has no data", buffer.0)));
        }
        let source = SamplesBuffer::new(data.channels, data.rate, data.samples.clone());

        let target = self.voice_mut(voice)?;
        target.sink.append(source);
        target.queued.push_back(buffer);
        Ok(())
    }

    fn unqueue_buffer(&mut self, voice: VoiceId) -> Result<BufferId> {
        let target = self.voice_mut(voice)?;
        if target.processed() == 0 {
            return Err(AudioError::HardwareError(format!(
                "Voice {} has no processed buffers",
                voice.0
            )));
        }
        target
            .queued
            .pop_front()
            .ok_or_else(|| AudioError::HardwareError("Voice queue is empty".to_string()))
    }

    fn buffers_queued(&self, voice: VoiceId) -> Result<usize> {
        Ok(self.voice(voice)?.queued.len())
    }

    fn buffers_processed(&self, voice: VoiceId) -> Result<usize> {
        Ok(self.voice(voice)?.processed())
    }

    fn voice_state(&self, voice: VoiceId) -> Result<VoiceState> {
        let voice = self.voice(voice)?;
        Ok(if !voice.started {
            VoiceState::Initial
        } else if voice.sink.is_paused() {
            VoiceState::Paused
        } else if voice.sink.empty() {
            VoiceState::Stopped
        } else {
            VoiceState::Playing
        })
    }

    fn play(&mut self, voice: VoiceId) -> Result<()> {
        let target = self.voice_mut(voice)?;
        target.started = true;
        target.sink.play();
        Ok(())
    }

    fn pause(&mut self, voice: VoiceId) -> Result<()> {
        let target = self.voice_mut(voice)?;
        target.started = true;
        target.sink.pause();
        Ok(())
    }

    fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<()> {
        self.voice_mut(voice)?.gain = gain;
        let target = self.voice(voice)?;
        self.apply_volume(target);
        Ok(())
    }

    fn gain(&self, voice: VoiceId) -> Result<f32> {
        Ok(self.voice(voice)?.gain)
    }

    fn set_position(&mut self, voice: VoiceId, position: Vec3) -> Result<()> {
        self.voice_mut(voice)?.position = position;
        Ok(())
    }

    fn position(&self, voice: VoiceId) -> Result<Vec3> {
        Ok(self.voice(voice)?.position)
    }
}

impl Default for RodioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        self.close();
    }
}
