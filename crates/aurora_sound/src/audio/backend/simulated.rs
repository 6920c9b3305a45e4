//! Software audio device
//!
//! A headless [`AudioBackend`] with the same voice/buffer state machine as
//! streaming hardware, but where time only moves when the owner calls
//! [`SimulatedBackend::advance`] or [`SimulatedBackend::drain`]. Every
//! clone shares one device, so a test can keep a clone to inspect counters
//! while the sound manager owns another.

use super::{AudioBackend, BufferId, SampleLayout, VoiceId, VoiceState};
use crate::audio::{AudioError, Result};
use crate::foundation::math::{origin, Vec3};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Object counters of a simulated device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Voices created since the device was built
    pub voices_created: usize,
    /// Voices destroyed since the device was built
    pub voices_destroyed: usize,
    /// Buffers created since the device was built
    pub buffers_created: usize,
    /// Buffers destroyed since the device was built
    pub buffers_destroyed: usize,
    /// Voices still alive when the device was closed
    pub voices_released_on_close: usize,
    /// Buffers still alive when the device was closed
    pub buffers_released_on_close: usize,
    /// Successful `queue_buffer` calls
    pub buffers_queued: usize,
    /// `play` calls
    pub play_calls: usize,
}

impl BackendStats {
    /// Voices never destroyed explicitly
    ///
    /// Closing the device does not count, so a leak stays visible after it.
    pub fn live_voices(&self) -> usize {
        self.voices_created - self.voices_destroyed
    }

    /// Buffers never destroyed explicitly
    pub fn live_buffers(&self) -> usize {
        self.buffers_created - self.buffers_destroyed
    }
}

#[derive(Debug, Default)]
struct SimBuffer {
    layout: Option<SampleLayout>,
    samples: Vec<i16>,
    rate: u32,
    queued_on: Option<VoiceId>,
}

#[derive(Debug)]
struct SimVoice {
    state: VoiceState,
    queue: VecDeque<BufferId>,
    /// Leading queue entries that finished playing
    processed: usize,
    /// Samples of the current buffer already played
    offset: usize,
    gain: f32,
    position: Vec3,
}

impl SimVoice {
    fn new() -> Self {
        Self {
            state: VoiceState::Initial,
            queue: VecDeque::new(),
            processed: 0,
            offset: 0,
            gain: 1.0,
            position: origin(),
        }
    }

    fn has_pending(&self) -> bool {
        self.processed < self.queue.len()
    }
}

#[derive(Debug)]
struct SimDevice {
    open: bool,
    fail_open: bool,
    /// Buffer creations left before creation starts failing
    buffer_budget: Option<usize>,
    listener_gain: f32,
    voices: HashMap<VoiceId, SimVoice>,
    buffers: HashMap<BufferId, SimBuffer>,
    next_id: u32,
    stats: BackendStats,
    /// Every sample played so far, in playback order
    played: Vec<i16>,
    /// Sample rate of the buffer played last
    last_rate: Option<u32>,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self {
            open: false,
            fail_open: false,
            buffer_budget: None,
            listener_gain: 1.0,
            voices: HashMap::new(),
            buffers: HashMap::new(),
            next_id: 1,
            stats: BackendStats::default(),
            played: Vec::new(),
            last_rate: None,
        }
    }
}

impl SimDevice {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(AudioError::HardwareError("device not open".to_string()))
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    fn voice(&self, voice: VoiceId) -> Result<&SimVoice> {
        self.voices
            .get(&voice)
            .ok_or_else(|| AudioError::HardwareError(format!("invalid voice {}", voice.0)))
    }

    fn voice_mut(&mut self, voice: VoiceId) -> Result<&mut SimVoice> {
        self.voices
            .get_mut(&voice)
            .ok_or_else(|| AudioError::HardwareError(format!("invalid voice {}", voice.0)))
    }

    /// Play up to `samples` samples on one voice
    fn advance_voice(&mut self, id: VoiceId, mut samples: usize) {
        let Some(voice) = self.voices.get_mut(&id) else {
            return;
        };
        if voice.state != VoiceState::Playing {
            return;
        }

        while samples > 0 && voice.has_pending() {
            let buffer_id = voice.queue[voice.processed];
            let buffer = self.buffers.get(&buffer_id);
            let data = buffer.map_or(&[][..], |b| &b.samples[..]);
            if let Some(buffer) = buffer {
                self.last_rate = Some(buffer.rate);
            }
            let left = data.len().saturating_sub(voice.offset);
            let step = left.min(samples);

            self.played.extend_from_slice(&data[voice.offset..voice.offset + step]);
            voice.offset += step;
            samples -= step;

            if voice.offset >= data.len() {
                voice.processed += 1;
                voice.offset = 0;
            }
        }

        if !voice.has_pending() {
            voice.state = VoiceState::Stopped;
        }
    }
}

/// A shared handle to a software audio device
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    device: Arc<Mutex<SimDevice>>,
}

impl SimulatedBackend {
    /// Create a closed device
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the object counters
    pub fn stats(&self) -> BackendStats {
        self.device.lock().stats
    }

    /// Make every later `open` fail
    pub fn fail_open(&self, fail: bool) {
        self.device.lock().fail_open = fail;
    }

    /// Let `count` more buffers be created, then fail every creation
    pub fn fail_buffer_creation_after(&self, count: usize) {
        self.device.lock().buffer_budget = Some(count);
    }

    /// Lift buffer creation limits
    pub fn clear_faults(&self) {
        let mut device = self.device.lock();
        device.fail_open = false;
        device.buffer_budget = None;
    }

    /// Play `samples` samples on every playing voice
    pub fn advance(&self, samples: usize) {
        let mut device = self.device.lock();
        let mut ids: Vec<VoiceId> = device.voices.keys().copied().collect();
        ids.sort_unstable_by_key(|id| id.0);
        for id in ids {
            device.advance_voice(id, samples);
        }
    }

    /// Play every queued buffer of every playing voice to the end
    pub fn drain(&self) {
        self.advance(usize::MAX);
    }

    /// All samples played so far, in playback order
    pub fn played_samples(&self) -> Vec<i16> {
        self.device.lock().played.clone()
    }

    /// Sample rate of the buffer played last
    pub fn last_played_rate(&self) -> Option<u32> {
        self.device.lock().last_rate
    }

    /// Listener gain last set on the device
    pub fn listener_gain(&self) -> f32 {
        self.device.lock().listener_gain
    }

    /// Gains of all live voices, ordered by creation
    pub fn voice_gains(&self) -> Vec<f32> {
        let device = self.device.lock();
        let mut voices: Vec<_> = device.voices.iter().collect();
        voices.sort_unstable_by_key(|(id, _)| id.0);
        voices.into_iter().map(|(_, voice)| voice.gain).collect()
    }

    /// Live voices, ordered by creation
    pub fn voices(&self) -> Vec<VoiceId> {
        let mut ids: Vec<VoiceId> = self.device.lock().voices.keys().copied().collect();
        ids.sort_unstable_by_key(|id| id.0);
        ids
    }

    /// Number of live voices in `state`
    pub fn voices_in_state(&self, state: VoiceState) -> usize {
        self.device
            .lock()
            .voices
            .values()
            .filter(|voice| voice.state == state)
            .count()
    }
}

impl AudioBackend for SimulatedBackend {
    fn open(&mut self) -> Result<()> {
        let mut device = self.device.lock();
        if device.fail_open {
            return Err(AudioError::HardwareError("no audio device available".to_string()));
        }
        device.open = true;
        log::info!("Simulated audio device opened");
        Ok(())
    }

    fn close(&mut self) {
        let mut device = self.device.lock();
        if !device.open {
            return;
        }

        let voices = device.voices.len();
        let buffers = device.buffers.len();
        device.stats.voices_released_on_close += voices;
        device.stats.buffers_released_on_close += buffers;
        if voices + buffers > 0 {
            log::debug!("Releasing {} voices and {} buffers left on the device", voices, buffers);
        }
        device.voices.clear();
        device.buffers.clear();
        device.open = false;
        log::info!("Simulated audio device closed");
    }

    fn is_open(&self) -> bool {
        self.device.lock().open
    }

    fn set_listener_gain(&mut self, gain: f32) -> Result<()> {
        let mut device = self.device.lock();
        device.ensure_open()?;
        device.listener_gain = gain;
        Ok(())
    }

    fn create_voice(&mut self) -> Result<VoiceId> {
        let mut device = self.device.lock();
        device.ensure_open()?;
        let id = VoiceId(device.next_id());
        device.voices.insert(id, SimVoice::new());
        device.stats.voices_created += 1;
        Ok(id)
    }

    fn destroy_voice(&mut self, voice: VoiceId) -> Result<()> {
        let mut device = self.device.lock();
        let removed = device
            .voices
            .remove(&voice)
            .ok_or_else(|| AudioError::HardwareError(format!("invalid voice {}", voice.0)))?;
        for buffer in removed.queue {
            if let Some(buffer) = device.buffers.get_mut(&buffer) {
                buffer.queued_on = None;
            }
        }
        device.stats.voices_destroyed += 1;
        Ok(())
    }

    fn create_buffer(&mut self) -> Result<BufferId> {
        let mut device = self.device.lock();
        device.ensure_open()?;
        if let Some(budget) = device.buffer_budget.as_mut() {
            if *budget == 0 {
                return Err(AudioError::HardwareError("out of buffer memory".to_string()));
            }
            *budget -= 1;
        }

        let id = BufferId(device.next_id());
        device.buffers.insert(id, SimBuffer::default());
        device.stats.buffers_created += 1;
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) -> Result<()> {
        let mut device = self.device.lock();
        match device.buffers.get(&buffer) {
            None => return Err(AudioError::HardwareError(format!("invalid buffer {}", buffer.0))),
            Some(data) if data.queued_on.is_some() => {
                return Err(AudioError::HardwareError(format!("buffer {} is queued", buffer.0)));
            }
            Some(_) => {}
        }
        device.buffers.remove(&buffer);
        device.stats.buffers_destroyed += 1;
        Ok(())
    }

    fn buffer_data(
        &mut self,
        buffer: BufferId,
        layout: SampleLayout,
        samples: &[i16],
        rate: u32,
    ) -> Result<()> {
        let mut device = self.device.lock();
        let data = device
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| AudioError::HardwareError(format!("invalid buffer {}", buffer.0)))?;
        if data.queued_on.is_some() {
            return Err(AudioError::HardwareError(format!("buffer {} is queued", buffer.0)));
        }
        data.layout = Some(layout);
        data.samples.clear();
        data.samples.extend_from_slice(samples);
        data.rate = rate;
        Ok(())
    }

    fn queue_buffer(&mut self, voice: VoiceId, buffer: BufferId) -> Result<()> {
        let mut device = self.device.lock();
        device.voice(voice)?;
        let data = device
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| AudioError::HardwareError(format!("invalid buffer {}", buffer.0)))?;
        if data.queued_on.is_some() {
            return Err(AudioError::HardwareError(format!("buffer {} already queued", buffer.0)));
        }
        if data.layout.is_none() {
            return Err(AudioError::HardwareError(format!("buffer {} has no data", buffer.0)));
        }
        data.queued_on = Some(voice);

        device.voice_mut(voice)?.queue.push_back(buffer);
        device.stats.buffers_queued += 1;
        Ok(())
    }

    fn unqueue_buffer(&mut self, voice: VoiceId) -> Result<BufferId> {
        let mut device = self.device.lock();
        let sim = device.voice_mut(voice)?;
        if sim.processed == 0 {
            return Err(AudioError::HardwareError(format!(
                "voice {} has no processed buffers",
                voice.0
            )));
        }
        let buffer = sim
            .queue
            .pop_front()
            .ok_or_else(|| AudioError::HardwareError("queue bookkeeping broken".to_string()))?;
        sim.processed -= 1;

        if let Some(data) = device.buffers.get_mut(&buffer) {
            data.queued_on = None;
        }
        Ok(buffer)
    }

    fn buffers_queued(&self, voice: VoiceId) -> Result<usize> {
        Ok(self.device.lock().voice(voice)?.queue.len())
    }

    fn buffers_processed(&self, voice: VoiceId) -> Result<usize> {
        Ok(self.device.lock().voice(voice)?.processed)
    }

    fn voice_state(&self, voice: VoiceId) -> Result<VoiceState> {
        Ok(self.device.lock().voice(voice)?.state)
    }

    fn play(&mut self, voice: VoiceId) -> Result<()> {
        let mut device = self.device.lock();
        device.stats.play_calls += 1;
        let sim = device.voice_mut(voice)?;
        sim.state = if sim.has_pending() {
            VoiceState::Playing
        } else {
            // Nothing to play: starts and stops at once
            VoiceState::Stopped
        };
        Ok(())
    }

    fn pause(&mut self, voice: VoiceId) -> Result<()> {
        let mut device = self.device.lock();
        let sim = device.voice_mut(voice)?;
        if sim.state != VoiceState::Stopped {
            sim.state = VoiceState::Paused;
        }
        Ok(())
    }

    fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<()> {
        self.device.lock().voice_mut(voice)?.gain = gain;
        Ok(())
    }

    fn gain(&self, voice: VoiceId) -> Result<f32> {
        Ok(self.device.lock().voice(voice)?.gain)
    }

    fn set_position(&mut self, voice: VoiceId, position: Vec3) -> Result<()> {
        self.device.lock().voice_mut(voice)?.position = position;
        Ok(())
    }

    fn position(&self, voice: VoiceId) -> Result<Vec3> {
        Ok(self.device.lock().voice(voice)?.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened() -> SimulatedBackend {
        let mut backend = SimulatedBackend::new();
        backend.open().unwrap();
        backend
    }

    fn filled_buffer(backend: &mut SimulatedBackend, samples: &[i16]) -> BufferId {
        let buffer = backend.create_buffer().unwrap();
        backend
            .buffer_data(buffer, SampleLayout::Mono16, samples, 22050)
            .unwrap();
        buffer
    }

    #[test]
    fn test_closed_device_rejects_objects() {
        let mut backend = SimulatedBackend::new();
        assert!(!backend.is_open());
        assert!(matches!(backend.create_voice(), Err(AudioError::HardwareError(_))));

        backend.fail_open(true);
        assert!(backend.open().is_err());
    }

    #[test]
    fn test_queue_plays_in_order() {
        let mut backend = opened();
        let voice = backend.create_voice().unwrap();
        let first = filled_buffer(&mut backend, &[1, 2, 3]);
        let second = filled_buffer(&mut backend, &[4, 5]);
        backend.queue_buffer(voice, first).unwrap();
        backend.queue_buffer(voice, second).unwrap();
        assert_eq!(backend.voice_state(voice).unwrap(), VoiceState::Initial);

        backend.play(voice).unwrap();
        backend.advance(4);
        assert_eq!(backend.buffers_processed(voice).unwrap(), 1);
        assert_eq!(backend.voice_state(voice).unwrap(), VoiceState::Playing);

        backend.drain();
        assert_eq!(backend.buffers_processed(voice).unwrap(), 2);
        assert_eq!(backend.buffers_queued(voice).unwrap(), 2);
        assert_eq!(backend.voice_state(voice).unwrap(), VoiceState::Stopped);
        assert_eq!(backend.played_samples(), vec![1, 2, 3, 4, 5]);
        assert_eq!(backend.last_played_rate(), Some(22050));
    }

    #[test]
    fn test_unqueue_only_processed() {
        let mut backend = opened();
        let voice = backend.create_voice().unwrap();
        let buffer = filled_buffer(&mut backend, &[1]);
        backend.queue_buffer(voice, buffer).unwrap();
        assert!(backend.unqueue_buffer(voice).is_err());

        backend.play(voice).unwrap();
        backend.drain();
        assert_eq!(backend.unqueue_buffer(voice).unwrap(), buffer);
        assert_eq!(backend.buffers_queued(voice).unwrap(), 0);
    }

    #[test]
    fn test_paused_voice_does_not_advance() {
        let mut backend = opened();
        let voice = backend.create_voice().unwrap();
        let buffer = filled_buffer(&mut backend, &[1, 2]);
        backend.queue_buffer(voice, buffer).unwrap();
        backend.play(voice).unwrap();
        backend.pause(voice).unwrap();

        backend.drain();
        assert_eq!(backend.voice_state(voice).unwrap(), VoiceState::Paused);
        assert_eq!(backend.buffers_processed(voice).unwrap(), 0);
    }

    #[test]
    fn test_queued_buffer_cannot_be_destroyed() {
        let mut backend = opened();
        let voice = backend.create_voice().unwrap();
        let buffer = filled_buffer(&mut backend, &[1]);
        backend.queue_buffer(voice, buffer).unwrap();
        assert!(backend.destroy_buffer(buffer).is_err());

        backend.destroy_voice(voice).unwrap();
        backend.destroy_buffer(buffer).unwrap();
        let stats = backend.stats();
        assert_eq!(stats.live_voices(), 0);
        assert_eq!(stats.live_buffers(), 0);
    }

    #[test]
    fn test_buffer_budget() {
        let mut backend = opened();
        backend.fail_buffer_creation_after(2);
        assert!(backend.create_buffer().is_ok());
        assert!(backend.create_buffer().is_ok());
        assert!(backend.create_buffer().is_err());

        backend.clear_faults();
        assert!(backend.create_buffer().is_ok());
    }

    #[test]
    fn test_clones_share_device() {
        let mut backend = opened();
        let observer = backend.clone();
        backend.create_voice().unwrap();
        assert_eq!(observer.stats().voices_created, 1);

        backend.close();
        assert!(!observer.is_open());
        assert!(observer.voices().is_empty());
    }

    #[test]
    fn test_close_keeps_leaks_visible() {
        let mut backend = opened();
        let kept = backend.create_voice().unwrap();
        backend.create_voice().unwrap();
        backend.create_buffer().unwrap();
        backend.destroy_voice(kept).unwrap();

        backend.close();
        let stats = backend.stats();
        assert_eq!(stats.voices_destroyed, 1);
        assert_eq!(stats.voices_released_on_close, 1);
        assert_eq!(stats.buffers_released_on_close, 1);
        assert_eq!(stats.live_voices(), 1);
        assert_eq!(stats.live_buffers(), 1);
    }
}
