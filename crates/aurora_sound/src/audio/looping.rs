//! Looping stream decorator
//!
//! Wraps a [`RewindableAudioStream`] and rewinds it whenever it runs dry,
//! either forever or for a fixed number of passes.

use super::stream::{AudioStream, RewindableAudioStream};
use super::{AudioError, Result};

/// Repeats a rewindable stream
///
/// A pass count of 0 loops forever. With a pass count of `N`, end of data is
/// reported once the wrapped stream has run dry for the `N`-th time.
#[derive(Debug)]
pub struct LoopingAudioStream<S> {
    parent: S,
    loops: u32,
    /// Passes completed (rewinds performed)
    completed: u32,
    /// A full pass produced no samples; looping would spin forever
    stalled: bool,
    /// Samples read since the last rewind
    pass_samples: u64,
}

impl<S: RewindableAudioStream> LoopingAudioStream<S> {
    /// Loop `parent` for `loops` passes, 0 meaning forever
    pub fn new(parent: S, loops: u32) -> Self {
        Self {
            parent,
            loops,
            completed: 0,
            stalled: false,
            pass_samples: 0,
        }
    }

    /// Number of rewinds performed so far
    pub fn completed_loops(&self) -> u32 {
        self.completed
    }

    /// Configured pass count, 0 meaning forever
    pub fn loops(&self) -> u32 {
        self.loops
    }

    /// Give back the wrapped stream
    pub fn into_inner(self) -> S {
        self.parent
    }

    fn on_last_pass(&self) -> bool {
        self.loops != 0 && self.completed + 1 >= self.loops
    }
}

impl<S: RewindableAudioStream> AudioStream for LoopingAudioStream<S> {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> Result<usize> {
        let mut filled = 0;

        while filled < buffer.len() && !self.stalled {
            if self.parent.end_of_data() {
                if self.on_last_pass() {
                    break;
                }
                if self.pass_samples == 0 {
                    log::warn!("Looping stream produced no samples in a full pass, stopping");
                    self.stalled = true;
                    break;
                }
                if !self.parent.rewind() {
                    return Err(AudioError::StreamError(
                        "failed to rewind looping stream".to_string(),
                    ));
                }
                self.completed += 1;
                self.pass_samples = 0;
            }

            let read = self.parent.read_buffer(&mut buffer[filled..])?;
            if read == 0 && !self.parent.end_of_data() {
                // Nothing available right now; try again on the next call
                break;
            }
            filled += read;
            self.pass_samples += read as u64;
        }

        Ok(filled)
    }

    fn is_stereo(&self) -> bool {
        self.parent.is_stereo()
    }

    fn rate(&self) -> u32 {
        self.parent.rate()
    }

    fn end_of_data(&self) -> bool {
        self.stalled || (self.on_last_pass() && self.parent.end_of_data())
    }

    fn end_of_stream(&self) -> bool {
        self.stalled || (self.on_last_pass() && self.parent.end_of_stream())
    }
}

impl<S: RewindableAudioStream> RewindableAudioStream for LoopingAudioStream<S> {
    fn rewind(&mut self) -> bool {
        if !self.parent.rewind() {
            return false;
        }
        self.completed = 0;
        self.stalled = false;
        self.pass_samples = 0;
        true
    }
}
