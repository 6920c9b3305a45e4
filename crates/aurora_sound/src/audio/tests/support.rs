//! Test streams and manager fixtures

use crate::audio::backend::SimulatedBackend;
use crate::audio::stream::{AudioStream, RewindableAudioStream};
use crate::audio::{ChannelStream, Result, SoundManager};
use crate::config::SoundConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Read and rewind counters shared with the test body
#[derive(Debug, Default)]
pub struct Counters {
    pub reads: AtomicUsize,
    pub samples: AtomicUsize,
    pub rewinds: AtomicUsize,
}

impl Counters {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    pub fn rewinds(&self) -> usize {
        self.rewinds.load(Ordering::SeqCst)
    }
}

/// In-memory PCM that counts how it is consumed
pub struct PcmStream {
    samples: Vec<i16>,
    pos: usize,
    stereo: bool,
    rate: u32,
    counters: Arc<Counters>,
}

impl PcmStream {
    pub fn mono(samples: Vec<i16>) -> Self {
        Self {
            samples,
            pos: 0,
            stereo: false,
            rate: 22050,
            counters: Arc::default(),
        }
    }

    pub fn stereo(samples: Vec<i16>) -> Self {
        Self {
            stereo: true,
            rate: 44100,
            ..Self::mono(samples)
        }
    }

    /// Mono ramp of `len` samples
    pub fn ramp(len: usize) -> Self {
        Self::mono((0..len).map(|i| (i % 30000) as i16).collect())
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

impl AudioStream for PcmStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> Result<usize> {
        let count = buffer.len().min(self.samples.len() - self.pos);
        buffer[..count].copy_from_slice(&self.samples[self.pos..self.pos + count]);
        self.pos += count;

        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        self.counters.samples.fetch_add(count, Ordering::SeqCst);
        Ok(count)
    }

    fn is_stereo(&self) -> bool {
        self.stereo
    }

    fn rate(&self) -> u32 {
        self.rate
    }

    fn end_of_data(&self) -> bool {
        self.pos >= self.samples.len()
    }
}

impl RewindableAudioStream for PcmStream {
    fn rewind(&mut self) -> bool {
        self.pos = 0;
        self.counters.rewinds.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Small buffers and no background thread, so tests drive every scan
pub fn manual_config() -> SoundConfig {
    SoundConfig::new()
        .with_channel_count(16)
        .with_buffers(3, 64)
        .with_threaded(false)
}

/// An initialized manager plus an observer of its device
pub fn fixture(config: SoundConfig) -> (SoundManager, SimulatedBackend) {
    let backend = SimulatedBackend::new();
    let manager = SoundManager::new(backend.clone(), config).unwrap();
    manager.init().unwrap();
    (manager, backend)
}

pub fn owned(stream: PcmStream) -> ChannelStream {
    ChannelStream::owned(stream)
}
