//! Background thread behavior

use super::support::{fixture, owned, PcmStream};
use crate::audio::backend::{AudioBackend, SimulatedBackend, VoiceState};
use crate::audio::sound_manager::UPDATE_THREAD_NAME;
use crate::audio::stream::AudioStream;
use crate::audio::{AudioError, ChannelHandle, ChannelStream, Result, SoundManager, SoundType};
use crate::config::SoundConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn threaded_config(interval: Duration) -> SoundConfig {
    SoundConfig::new()
        .with_channel_count(64)
        .with_buffers(3, 64)
        .with_update_interval(interval)
}

/// Poll `condition` until it holds or two seconds pass
fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Blocks the first read made from the update thread
struct StallingStream {
    inner: PcmStream,
    stall: Duration,
    stalled: Arc<AtomicBool>,
}

impl AudioStream for StallingStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> Result<usize> {
        let on_update_thread = thread::current().name() == Some(UPDATE_THREAD_NAME);
        if on_update_thread && !self.stalled.swap(true, Ordering::SeqCst) {
            thread::sleep(self.stall);
        }
        self.inner.read_buffer(buffer)
    }

    fn is_stereo(&self) -> bool {
        self.inner.is_stereo()
    }

    fn rate(&self) -> u32 {
        self.inner.rate()
    }

    fn end_of_data(&self) -> bool {
        self.inner.end_of_data()
    }
}

/// A manager whose update thread is stuck in a one second read
fn stalled_manager() -> (SoundManager, SimulatedBackend, ChannelHandle) {
    let mut config = threaded_config(Duration::from_millis(1));
    config.shutdown_timeout_ms = 50;
    let (manager, backend) = fixture(config);

    let stalled = Arc::new(AtomicBool::new(false));
    let stream = StallingStream {
        inner: PcmStream::ramp(10_000),
        stall: Duration::from_secs(1),
        stalled: Arc::clone(&stalled),
    };
    let handle = manager
        .play_audio_stream(ChannelStream::owned(stream), SoundType::Music)
        .unwrap();
    manager.start_channel(&handle).unwrap();

    // Finished buffers make the thread read again
    assert!(wait_until(|| {
        backend.drain();
        stalled.load(Ordering::SeqCst)
    }));
    (manager, backend, handle)
}

#[test]
fn test_start_wakes_sleeping_thread() {
    // Long enough that only the wake-up can explain a started voice
    let (manager, backend) = fixture(threaded_config(Duration::from_secs(30)));
    let handle = manager
        .play_audio_stream(owned(PcmStream::ramp(1000)), SoundType::Sfx)
        .unwrap();
    assert_eq!(backend.voices_in_state(VoiceState::Playing), 0);

    manager.start_channel(&handle).unwrap();
    assert!(wait_until(|| backend.voices_in_state(VoiceState::Playing) == 1));
}

#[test]
fn test_thread_reclaims_finished_channels() {
    let (manager, backend) = fixture(threaded_config(Duration::from_millis(2)));
    let handle = manager
        .play_audio_stream(owned(PcmStream::ramp(500)), SoundType::Sfx)
        .unwrap();
    manager.start_channel(&handle).unwrap();

    assert!(wait_until(|| {
        backend.drain();
        manager.active_channels().unwrap() == 0
    }));
    assert!(!manager.is_valid_channel(&handle));
    assert_eq!(backend.stats().live_voices(), 0);
    assert_eq!(backend.played_samples().len(), 500);
}

#[test]
fn test_concurrent_play_and_stop() {
    let (manager, backend) = fixture(threaded_config(Duration::from_millis(1)));
    let draining = AtomicBool::new(true);

    thread::scope(|scope| {
        scope.spawn(|| {
            while draining.load(Ordering::Acquire) {
                backend.advance(16);
                thread::yield_now();
            }
        });

        let players: Vec<_> = (0..4)
            .map(|worker| {
                let manager = &manager;
                scope.spawn(move || {
                    for round in 0..50 {
                        let mut handle = match manager
                            .play_audio_stream(owned(PcmStream::ramp(100 + round)), SoundType::Sfx)
                        {
                            Ok(handle) => handle,
                            Err(AudioError::AllChannelsOccupied) => continue,
                            Err(e) => panic!("worker {} failed to play: {}", worker, e),
                        };

                        // The thread may have reclaimed the channel already
                        match manager.start_channel(&handle) {
                            Ok(()) | Err(AudioError::InvalidChannel) => {}
                            Err(e) => panic!("worker {} failed to start: {}", worker, e),
                        }
                        if (worker + round) % 2 == 0 {
                            thread::sleep(Duration::from_millis(1));
                        }
                        manager.stop_channel(&mut handle).unwrap();
                        assert!(handle.is_cleared());
                    }
                })
            })
            .collect();

        for player in players {
            player.join().unwrap();
        }
        draining.store(false, Ordering::Release);
    });

    assert_eq!(manager.active_channels().unwrap(), 0);
    let stats = backend.stats();
    assert!(stats.voices_created > 0);
    assert_eq!(stats.live_voices(), 0);
    assert_eq!(stats.live_buffers(), 0);

    manager.deinit();
    let stats = backend.stats();
    assert_eq!(stats.voices_released_on_close, 0);
    assert_eq!(stats.buffers_released_on_close, 0);
}

#[test]
fn test_deinit_joins_thread_promptly() {
    let (manager, _backend) = fixture(threaded_config(Duration::from_secs(30)));
    manager
        .play_audio_stream(owned(PcmStream::ramp(1000)), SoundType::Music)
        .unwrap();

    let started = Instant::now();
    manager.deinit();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!manager.ready());

    // A fresh thread comes up on the next init
    manager.init().unwrap();
    assert!(manager.ready());
}

#[test]
fn test_deinit_detaches_stalled_thread() {
    let (manager, backend, handle) = stalled_manager();

    let started = Instant::now();
    manager.deinit();
    assert!(started.elapsed() < Duration::from_millis(500));

    // The detached thread tears down once its read returns
    assert!(wait_until(|| !manager.ready()));
    assert!(!manager.is_valid_channel(&handle));
    assert!(!backend.is_open());
    let stats = backend.stats();
    assert_eq!(stats.live_voices(), 0);
    assert_eq!(stats.live_buffers(), 0);
    assert_eq!(stats.voices_released_on_close, 0);
}

#[test]
fn test_init_after_detached_deinit_starts_fresh() {
    let (manager, backend, handle) = stalled_manager();
    manager.deinit();

    manager.init().unwrap();
    assert!(manager.ready());
    assert!(!manager.is_valid_channel(&handle));
    assert_eq!(manager.active_channels().unwrap(), 0);
    assert_eq!(backend.stats().live_voices(), 0);

    let fresh = manager
        .play_audio_stream(owned(PcmStream::ramp(100)), SoundType::Sfx)
        .unwrap();
    assert!(manager.is_valid_channel(&fresh));
}
