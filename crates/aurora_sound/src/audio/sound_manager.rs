//! Sound manager
//!
//! Owns the channel table, the sound type gains and the hardware backend,
//! and keeps every playing channel fed from a background thread.
//!
//! # Threading
//!
//! All state sits behind one mutex. The background thread holds it while it
//! refills a channel and yields it between channels, so public calls wait
//! for at most one channel's work. Checks and the condition variable wait
//! happen under the lock, so a `start_channel` signal is never lost.
//!
//! Shutdown gives the thread `shutdown_timeout_ms` to notice its kill flag.
//! A thread stuck inside a slow stream read is detached instead, and it
//! finishes the device teardown itself once the read returns.
//!
//! # Example
//!
//! ```no_run
//! use aurora_sound::audio::{SoundManager, SoundType};
//! use aurora_sound::audio::backend::create_backend;
//! use aurora_sound::config::SoundConfig;
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let manager = SoundManager::new(create_backend(), SoundConfig::default()).unwrap();
//! manager.init().unwrap();
//!
//! let file = BufReader::new(File::open("music/theme.wav").unwrap());
//! let mut handle = manager.play_sound_file(Box::new(file), SoundType::Music, true).unwrap();
//! manager.start_channel(&handle).unwrap();
//!
//! // ...
//!
//! manager.stop_channel(&mut handle).unwrap();
//! manager.deinit();
//! ```

use super::backend::{AudioBackend, BufferId, SampleLayout, VoiceId, VoiceState};
use super::channel::{Channel, ChannelHandle, ChannelState, ChannelStream};
use super::decoders::{DecodedStream, DecoderRegistry};
use super::looping::LoopingAudioStream;
use super::mixer::{SoundType, TypeMixer};
use super::stream::AudioStream;
use super::sub_stream::SeekableStream;
use super::{AudioError, Result};
use crate::config::SoundConfig;
use crate::foundation::collections::SlotTable;
use crate::foundation::math::Vec3;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Everything guarded by the manager lock
struct SoundState {
    ready: bool,
    backend: Box<dyn AudioBackend>,
    config: SoundConfig,
    channels: SlotTable<Channel>,
    mixer: TypeMixer,
    /// Generation id handed to the next channel; never 0
    next_id: u16,
    /// Bumped by every successful init
    session: u64,
    /// One hardware buffer worth of samples
    scratch: Vec<i16>,
}

/// State shared with the background thread
struct Shared {
    state: Mutex<SoundState>,
    need_update: Condvar,
    /// Set when deinit handed the teardown to a detached update thread
    teardown_pending: AtomicBool,
}

/// Flags the manager uses to steer one update thread
#[derive(Default)]
struct ThreadControl {
    kill: AtomicBool,
    detached: AtomicBool,
}

impl ThreadControl {
    fn killed(&self) -> bool {
        self.kill.load(Ordering::Acquire)
    }
}

struct UpdateThread {
    handle: JoinHandle<()>,
    control: Arc<ThreadControl>,
}

/// Streams audio into a fixed pool of hardware channels
///
/// Construct one per process (or per audio device) and share it by
/// reference; every method takes `&self`.
pub struct SoundManager {
    shared: Arc<Shared>,
    thread: Mutex<Option<UpdateThread>>,
    /// Fixed at construction so shutdown never waits on the state lock for it
    shutdown_timeout: Duration,
    decoders: DecoderRegistry,
}

impl SoundManager {
    /// Create a manager around `backend`; call [`init`](Self::init) before use
    pub fn new<B: AudioBackend + 'static>(backend: B, config: SoundConfig) -> Result<Self> {
        config.validate()?;

        let shutdown_timeout = config.shutdown_timeout();
        let state = SoundState {
            ready: false,
            backend: Box::new(backend),
            channels: SlotTable::with_capacity(config.channel_count),
            mixer: TypeMixer::from_config(&config.type_gains),
            next_id: 1,
            session: 0,
            scratch: vec![0; config.samples_per_buffer()],
            config,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                need_update: Condvar::new(),
                teardown_pending: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
            shutdown_timeout,
            decoders: DecoderRegistry::default(),
        })
    }

    /// Replace the codec table used by [`play_sound_file`](Self::play_sound_file)
    #[must_use]
    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = decoders;
        self
    }

    /// Codec table used by [`play_sound_file`](Self::play_sound_file)
    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    /// Copy of the active configuration
    pub fn config(&self) -> SoundConfig {
        self.shared.state.lock().config.clone()
    }

    /// Open the audio device and start the background thread
    ///
    /// Does nothing if the manager is already ready.
    pub fn init(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if self.shared.teardown_pending.swap(false, Ordering::AcqRel) {
            // The detached thread has not got round to it yet
            state.shutdown();
        }
        if state.ready {
            return Ok(());
        }

        state.backend.open()?;
        let listener_gain = state.config.listener_gain;
        if let Err(e) = state.backend.set_listener_gain(listener_gain) {
            state.backend.close();
            return Err(e);
        }

        state.channels = SlotTable::with_capacity(state.config.channel_count);
        state.mixer = TypeMixer::from_config(&state.config.type_gains);
        state.next_id = 1;
        state.session += 1;

        if state.config.threaded {
            if let Err(e) = self.start_thread(state.config.update_interval()) {
                state.backend.close();
                return Err(e);
            }
        }

        state.ready = true;
        log::info!(
            "Sound manager initialized ({} channels, {} x {} byte buffers)",
            state.channels.capacity() - 1,
            state.config.buffer_count,
            state.config.buffer_size
        );
        Ok(())
    }

    /// Stop the background thread, free every channel and close the device
    ///
    /// Does nothing if the manager is not ready. Returns within about twice
    /// the shutdown timeout even when a stream read stalls the background
    /// thread; that thread then completes the teardown when the read returns.
    pub fn deinit(&self) {
        let state = if self.stop_thread() {
            Some(self.shared.state.lock())
        } else {
            self.shared.state.try_lock_for(self.shutdown_timeout)
        };

        let Some(mut state) = state else {
            self.shared.teardown_pending.store(true, Ordering::Release);
            log::warn!("Sound state still held by the detached update thread, leaving the teardown to it");
            return;
        };
        state.shutdown();
    }

    /// Whether [`init`](Self::init) has succeeded and [`deinit`](Self::deinit)
    /// has not been called since
    pub fn ready(&self) -> bool {
        self.shared.state.lock().ready
    }

    /// Decode a sound resource and play it on a new, paused channel
    ///
    /// The container is identified from the stream's first bytes. When
    /// `looping` is requested but the decoded stream cannot rewind, the sound
    /// plays once and a warning is logged.
    pub fn play_sound_file(
        &self,
        stream: Box<dyn SeekableStream>,
        sound_type: SoundType,
        looping: bool,
    ) -> Result<ChannelHandle> {
        if !self.ready() {
            return Err(AudioError::NotReady);
        }

        // Header parsing and decoder setup stay outside the lock
        let stream: Box<dyn AudioStream> = match self.decoders.make_audio_stream(stream)? {
            DecodedStream::Rewindable(stream) if looping => {
                Box::new(LoopingAudioStream::new(stream, 0))
            }
            decoded => {
                if looping {
                    log::warn!("Sound stream cannot rewind, playing it once instead of looping");
                }
                decoded.into_stream()
            }
        };

        self.play_audio_stream(ChannelStream::Owned(stream), sound_type)
    }

    /// Play an audio stream on a new, paused channel
    ///
    /// The channel is primed with up to `buffer_count` buffers and takes the
    /// current gain of `sound_type`. Nothing is audible until
    /// [`start_channel`](Self::start_channel).
    pub fn play_audio_stream(
        &self,
        stream: impl Into<ChannelStream>,
        sound_type: SoundType,
    ) -> Result<ChannelHandle> {
        let stream = stream.into();
        let mut state = self.lock_ready()?;
        state.play_audio_stream(stream, sound_type)
    }

    /// Mark a channel as playing and wake the background thread
    pub fn start_channel(&self, handle: &ChannelHandle) -> Result<()> {
        let mut state = self.lock_ready()?;
        state.channel_mut(handle)?.state = ChannelState::Playing;
        self.shared.need_update.notify_all();
        Ok(())
    }

    /// Pause or resume a channel
    pub fn pause_channel(&self, handle: &ChannelHandle, pause: bool) -> Result<()> {
        let mut state = self.lock_ready()?;
        if !pause {
            state.channel_mut(handle)?.state = ChannelState::Playing;
            self.shared.need_update.notify_all();
            return Ok(());
        }

        let voice = state.voice(handle)?;
        state.backend.pause(voice)?;
        state.channel_mut(handle)?.state = ChannelState::Paused;
        Ok(())
    }

    /// Stop a channel and release it, clearing `handle`
    ///
    /// A handle that was already cleared, or whose channel has finished in
    /// the meantime, is left alone (or cleared) without an error.
    pub fn stop_channel(&self, handle: &mut ChannelHandle) -> Result<()> {
        if handle.is_cleared() {
            return Ok(());
        }

        let mut state = self.lock_ready()?;
        if state.channel(handle).is_ok() {
            state.free_channel(handle.channel());
        }
        handle.clear();
        Ok(())
    }

    /// Whether a channel is still audible or about to be
    ///
    /// Returns false for stale handles. Unlike
    /// [`poll_and_nudge`](Self::poll_and_nudge) this never touches the
    /// hardware.
    pub fn is_playing(&self, handle: &ChannelHandle) -> Result<bool> {
        let mut state = self.lock_ready()?;
        if state.channel(handle).is_err() {
            return Ok(false);
        }
        state.poll_channel(handle.channel(), false)
    }

    /// Like [`is_playing`](Self::is_playing), but restarts a voice that ran
    /// dry while its channel is meant to play
    pub fn poll_and_nudge(&self, handle: &ChannelHandle) -> Result<bool> {
        let mut state = self.lock_ready()?;
        if state.channel(handle).is_err() {
            return Ok(false);
        }
        state.poll_channel(handle.channel(), true)
    }

    /// Whether `handle` refers to a live channel
    pub fn is_valid_channel(&self, handle: &ChannelHandle) -> bool {
        let state = self.shared.state.lock();
        state.ready && state.channel(handle).is_ok()
    }

    /// Place a mono channel in world space
    pub fn set_channel_position(&self, handle: &ChannelHandle, position: Vec3) -> Result<()> {
        let mut state = self.lock_ready()?;
        let voice = state.mono_voice(handle)?;
        state.backend.set_position(voice, position)
    }

    /// World space position of a mono channel
    pub fn channel_position(&self, handle: &ChannelHandle) -> Result<Vec3> {
        let state = self.lock_ready()?;
        let voice = state.mono_voice(handle)?;
        state.backend.position(voice)
    }

    /// Set the gain of a mono channel
    ///
    /// The gain is replaced by the type gain on the next
    /// [`set_type_gain`](Self::set_type_gain) for the channel's type.
    pub fn set_channel_gain(&self, handle: &ChannelHandle, gain: f32) -> Result<()> {
        let mut state = self.lock_ready()?;
        let voice = state.mono_voice(handle)?;
        state.backend.set_gain(voice, gain)
    }

    /// Current hardware gain of a channel
    pub fn channel_gain(&self, handle: &ChannelHandle) -> Result<f32> {
        let state = self.lock_ready()?;
        let voice = state.voice(handle)?;
        state.backend.gain(voice)
    }

    /// Set the gain of a sound type and apply it to its live channels
    pub fn set_type_gain(&self, sound_type: SoundType, gain: f32) -> Result<()> {
        let mut state = self.lock_ready()?;
        state.set_type_gain(sound_type, gain)
    }

    /// Gain of a sound type
    pub fn type_gain(&self, sound_type: SoundType) -> Result<f32> {
        let state = self.lock_ready()?;
        Ok(state.mixer.gain(sound_type))
    }

    /// Set the master gain
    pub fn set_listener_gain(&self, gain: f32) -> Result<()> {
        let mut state = self.lock_ready()?;
        state.backend.set_listener_gain(gain)
    }

    /// Wake the background thread for an immediate scan
    pub fn trigger_update(&self) -> Result<()> {
        let _state = self.lock_ready()?;
        self.shared.need_update.notify_all();
        Ok(())
    }

    /// Run one reclaim and refill scan on the calling thread
    ///
    /// The background thread runs the same scan; with `threaded = false` the
    /// owner calls this itself, typically once per frame.
    pub fn update(&self) -> Result<()> {
        let mut state = self.lock_ready()?;
        state.update();
        Ok(())
    }

    /// Number of live channels
    pub fn active_channels(&self) -> Result<usize> {
        Ok(self.lock_ready()?.channels.len())
    }

    fn lock_ready(&self) -> Result<MutexGuard<'_, SoundState>> {
        let state = self.shared.state.lock();
        if state.ready {
            Ok(state)
        } else {
            Err(AudioError::NotReady)
        }
    }

    /// Spawn the background thread; called with the state lock held
    fn start_thread(&self, interval: Duration) -> Result<()> {
        let control = Arc::new(ThreadControl::default());
        let shared = Arc::clone(&self.shared);
        let thread_control = Arc::clone(&control);

        let handle = thread::Builder::new()
            .name(UPDATE_THREAD_NAME.to_string())
            .spawn(move || update_thread(&shared, &thread_control, interval))?;

        *self.thread.lock() = Some(UpdateThread { handle, control });
        Ok(())
    }

    /// Ask the background thread to exit and wait up to the shutdown timeout
    ///
    /// Returns false when the thread had to be detached.
    fn stop_thread(&self) -> bool {
        let Some(thread) = self.thread.lock().take() else {
            return true;
        };

        thread.control.kill.store(true, Ordering::Release);
        let deadline = Instant::now() + self.shutdown_timeout;

        // Only succeeds while the thread waits or between channels, and
        // either way it checks the kill flag before its next wait
        if let Some(_state) = self.shared.state.try_lock_until(deadline) {
            self.shared.need_update.notify_all();
        }

        while !thread.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        if thread.handle.is_finished() {
            if thread.handle.join().is_err() {
                log::error!("Sound update thread panicked");
            }
            return true;
        }

        thread.control.detached.store(true, Ordering::Release);
        log::warn!(
            "Sound update thread did not stop within {:?}, detaching it",
            self.shutdown_timeout
        );
        false
    }
}

impl Drop for SoundManager {
    fn drop(&mut self) {
        self.deinit();
    }
}

impl std::fmt::Debug for SoundManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SoundManager")
            .field("ready", &state.ready)
            .field("channels", &state.channels.len())
            .field("decoders", &self.decoders)
            .finish_non_exhaustive()
    }
}

/// Name of the background refill thread
pub(crate) const UPDATE_THREAD_NAME: &str = "aurora-sound-update";

fn update_thread(shared: &Shared, control: &ThreadControl, interval: Duration) {
    log::debug!("Sound update thread started");

    let mut state = shared.state.lock();
    let session = state.session;

    'run: while !control.killed() {
        for slot in state.channels.occupied() {
            state.update_channel(slot);

            // Let callers in between channels
            MutexGuard::bump(&mut state);
            if control.killed() || !state.ready || state.session != session {
                break 'run;
            }
        }
        if control.killed() {
            break;
        }
        shared.need_update.wait_for(&mut state, interval);
    }

    if control.detached.load(Ordering::Acquire) && state.session == session && state.ready {
        log::warn!("Detached sound update thread finishing the shutdown");
        state.shutdown();
        shared.teardown_pending.store(false, Ordering::Release);
    }

    log::debug!("Sound update thread stopped");
}

/// Fill `buffer` from `stream`, returning false once the stream has nothing left
fn fill_buffer(
    backend: &mut dyn AudioBackend,
    stream: &mut ChannelStream,
    scratch: &mut [i16],
    buffer: BufferId,
) -> Result<bool> {
    stream.with(|stream: &mut dyn AudioStream| -> Result<bool> {
        if stream.end_of_data() {
            return Ok(false);
        }

        let stereo = stream.is_stereo();
        let mut wanted = scratch.len();
        if stereo {
            wanted &= !1;
        }

        let count = stream.read_buffer(&mut scratch[..wanted])?;
        if count == 0 {
            return Ok(false);
        }

        backend.buffer_data(buffer, SampleLayout::for_stereo(stereo), &scratch[..count], stream.rate())?;
        Ok(true)
    })
}

impl SoundState {
    fn channel(&self, handle: &ChannelHandle) -> Result<&Channel> {
        self.channels
            .get(handle.channel())
            .filter(|channel| handle.id() != 0 && channel.id == handle.id())
            .ok_or(AudioError::InvalidChannel)
    }

    fn channel_mut(&mut self, handle: &ChannelHandle) -> Result<&mut Channel> {
        self.channels
            .get_mut(handle.channel())
            .filter(|channel| handle.id() != 0 && channel.id == handle.id())
            .ok_or(AudioError::InvalidChannel)
    }

    fn voice(&self, handle: &ChannelHandle) -> Result<VoiceId> {
        self.channel(handle)?.voice.ok_or(AudioError::InvalidChannel)
    }

    /// Voice of a channel that may be positioned and attenuated on its own
    fn mono_voice(&self, handle: &ChannelHandle) -> Result<VoiceId> {
        let channel = self.channel(handle)?;
        if channel.stream.is_stereo() {
            return Err(AudioError::UnsupportedOnStereo);
        }
        channel.voice.ok_or(AudioError::InvalidChannel)
    }

    fn allocate_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == 0 {
            self.next_id = 1;
        }
        id
    }

    fn new_channel(&mut self, stream: ChannelStream, sound_type: SoundType) -> Result<(u16, u16)> {
        if self.channels.len() + 1 >= self.channels.capacity() {
            return Err(AudioError::AllChannelsOccupied);
        }

        let id = self.allocate_id();
        let slot = self
            .channels
            .insert(Channel::new(id, stream, sound_type))
            .map_err(|_| AudioError::AllChannelsOccupied)?;
        Ok((slot, id))
    }

    fn play_audio_stream(&mut self, stream: ChannelStream, sound_type: SoundType) -> Result<ChannelHandle> {
        let (slot, id) = self.new_channel(stream, sound_type)?;

        if let Err(e) = self.setup_channel(slot) {
            log::debug!("Channel {} setup failed, rolling back: {}", slot, e);
            self.free_channel(slot);
            return Err(e);
        }

        log::debug!("Channel {} (id {}) created for {}", slot, id, sound_type);
        Ok(ChannelHandle::new(slot, id))
    }

    /// Create the voice and buffers of a fresh channel and prime the queue
    fn setup_channel(&mut self, slot: u16) -> Result<()> {
        let channel = self.channels.get_mut(slot).ok_or(AudioError::InvalidChannel)?;

        let voice = self.backend.create_voice()?;
        channel.voice = Some(voice);

        for _ in 0..self.config.buffer_count {
            let buffer = self.backend.create_buffer()?;
            // Owned from here on, so a failure below still releases it
            channel.buffers.push(buffer);

            if fill_buffer(self.backend.as_mut(), &mut channel.stream, &mut self.scratch, buffer)? {
                self.backend.queue_buffer(voice, buffer)?;
            } else {
                channel.free_buffers.push_back(buffer);
            }
        }

        self.backend.set_gain(voice, self.mixer.gain(channel.sound_type))?;

        self.mixer.register(channel.sound_type, slot);
        channel.registered = true;
        Ok(())
    }

    /// Release a channel's voice, buffers and group membership
    fn free_channel(&mut self, slot: u16) {
        let Some(channel) = self.channels.remove(slot) else {
            return;
        };

        if channel.registered {
            self.mixer.unregister(channel.sound_type, slot);
        }

        if let Some(voice) = channel.voice {
            if let Err(e) = self.backend.destroy_voice(voice) {
                log::warn!("Failed to destroy voice of channel {}: {}", slot, e);
            }
        }
        for buffer in &channel.buffers {
            if let Err(e) = self.backend.destroy_buffer(*buffer) {
                log::warn!("Failed to destroy buffer of channel {}: {}", slot, e);
            }
        }

        log::debug!("Channel {} (id {}) freed", slot, channel.id);
    }

    /// Evaluate the playing condition of the channel in `slot`
    fn poll_channel(&mut self, slot: u16, nudge: bool) -> Result<bool> {
        let channel = self.channels.get(slot).ok_or(AudioError::InvalidChannel)?;
        let voice = channel.voice.ok_or(AudioError::InvalidChannel)?;

        if self.backend.voice_state(voice)? == VoiceState::Playing {
            return Ok(true);
        }

        if channel.stream.end_of_stream()
            && self.backend.buffers_queued(voice)? == self.backend.buffers_processed(voice)?
        {
            return Ok(false);
        }

        if channel.state != ChannelState::Playing {
            return Ok(true);
        }

        // Meant to play but the voice is idle: the queue ran dry or the
        // channel was just started
        if nudge {
            self.backend.play(voice)?;
        }
        Ok(true)
    }

    /// Recycle processed buffers and refill them from the stream
    fn buffer_data(&mut self, slot: u16) -> Result<()> {
        let channel = self.channels.get_mut(slot).ok_or(AudioError::InvalidChannel)?;
        if channel.stream.end_of_data() {
            return Ok(());
        }
        let voice = channel.voice.ok_or(AudioError::InvalidChannel)?;

        let processed = self.backend.buffers_processed(voice)?;
        for _ in 0..processed {
            let buffer = self.backend.unqueue_buffer(voice)?;
            channel.free_buffers.push_back(buffer);
        }

        while let Some(&buffer) = channel.free_buffers.front() {
            if !fill_buffer(self.backend.as_mut(), &mut channel.stream, &mut self.scratch, buffer)? {
                break;
            }
            self.backend.queue_buffer(voice, buffer)?;
            channel.free_buffers.pop_front();
        }

        Ok(())
    }

    fn set_type_gain(&mut self, sound_type: SoundType, gain: f32) -> Result<()> {
        self.mixer.set_gain(sound_type, gain);

        for &slot in self.mixer.channels(sound_type) {
            if let Some(voice) = self.channels.get(slot).and_then(|channel| channel.voice) {
                self.backend.set_gain(voice, gain)?;
            }
        }
        Ok(())
    }

    /// One pass over every live channel
    fn update(&mut self) {
        for slot in self.channels.occupied() {
            self.update_channel(slot);
        }
    }

    /// Reclaim or refill the channel in `slot`
    fn update_channel(&mut self, slot: u16) {
        if !self.ready {
            return;
        }
        let Some(channel) = self.channels.get(slot) else {
            return;
        };
        // Its owner holds the stream lock; try again next pass
        if channel.stream.is_locked() {
            log::trace!("Channel {} stream is busy, skipping it this pass", slot);
            return;
        }

        let result = match self.poll_channel(slot, true) {
            Ok(true) => self.buffer_data(slot).map(|()| true),
            other => other,
        };

        match result {
            Ok(true) => {}
            Ok(false) => self.free_channel(slot),
            Err(e) => {
                log::warn!("Channel {} failed during update, freeing it: {}", slot, e);
                self.free_channel(slot);
            }
        }
    }

    /// Free every channel and close the device
    fn shutdown(&mut self) {
        if !self.ready {
            return;
        }
        for slot in self.channels.occupied() {
            self.free_channel(slot);
        }
        self.backend.close();
        self.ready = false;
        log::info!("Sound manager shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::SimulatedBackend;
    use crate::audio::channel::SharedAudioStream;

    struct Silence {
        left: usize,
    }

    impl AudioStream for Silence {
        fn read_buffer(&mut self, buffer: &mut [i16]) -> Result<usize> {
            let count = buffer.len().min(self.left);
            buffer[..count].fill(0);
            self.left -= count;
            Ok(count)
        }

        fn is_stereo(&self) -> bool {
            false
        }

        fn rate(&self) -> u32 {
            22050
        }

        fn end_of_data(&self) -> bool {
            self.left == 0
        }
    }

    fn manager() -> SoundManager {
        let config = SoundConfig::new().with_threaded(false).with_channel_count(8);
        let manager = SoundManager::new(SimulatedBackend::new(), config).unwrap();
        manager.init().unwrap();
        manager
    }

    #[test]
    fn test_generation_skips_zero_on_wrap() {
        let manager = manager();
        manager.shared.state.lock().next_id = u16::MAX;

        let first = manager
            .play_audio_stream(ChannelStream::owned(Silence { left: 10 }), SoundType::Sfx)
            .unwrap();
        let second = manager
            .play_audio_stream(ChannelStream::owned(Silence { left: 10 }), SoundType::Sfx)
            .unwrap();

        assert_eq!(first.id(), u16::MAX);
        assert_eq!(second.id(), 1);
    }

    #[test]
    fn test_full_table_does_not_consume_ids() {
        let manager = manager();
        for _ in 0..7 {
            manager
                .play_audio_stream(ChannelStream::owned(Silence { left: 10 }), SoundType::Sfx)
                .unwrap();
        }

        let result = manager.play_audio_stream(ChannelStream::owned(Silence { left: 10 }), SoundType::Sfx);
        assert!(matches!(result, Err(AudioError::AllChannelsOccupied)));
        assert_eq!(manager.shared.state.lock().next_id, 8);
    }

    #[test]
    fn test_update_skips_channel_with_locked_stream() {
        let backend = SimulatedBackend::new();
        let config = SoundConfig::new().with_threaded(false).with_channel_count(8);
        let manager = SoundManager::new(backend.clone(), config).unwrap();
        manager.init().unwrap();

        let shared: SharedAudioStream = Arc::new(Mutex::new(Silence { left: 10 }));
        let handle = manager
            .play_audio_stream(Arc::clone(&shared), SoundType::Sfx)
            .unwrap();
        manager.start_channel(&handle).unwrap();
        manager.update().unwrap();
        backend.drain();

        // Finished, but its owner is holding the stream
        let guard = shared.lock();
        manager.update().unwrap();
        assert!(manager.is_valid_channel(&handle));
        drop(guard);

        manager.update().unwrap();
        assert!(!manager.is_valid_channel(&handle));
    }

    #[test]
    fn test_update_without_thread_needs_ready() {
        let config = SoundConfig::new().with_threaded(false);
        let manager = SoundManager::new(SimulatedBackend::new(), config).unwrap();
        assert!(matches!(manager.update(), Err(AudioError::NotReady)));
        assert!(manager.thread.lock().is_none());
    }
}
