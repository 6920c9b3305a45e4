//! Audio stream contract
//!
//! An [`AudioStream`] produces interleaved signed 16 bit PCM, mono or stereo,
//! in caller-sized chunks. Rewinding is a separate capability
//! ([`RewindableAudioStream`]) because many sources (network feeds, some
//! decoders) cannot seek back.

use super::Result;

/// A producer of interleaved 16 bit samples
pub trait AudioStream: Send {
    /// Fill `buffer` with up to `buffer.len()` samples
    ///
    /// Returns the number of samples written. Returns `Ok(0)` once the stream
    /// has no more data; never blocks waiting for data.
    fn read_buffer(&mut self, buffer: &mut [i16]) -> Result<usize>;

    /// Whether samples are interleaved left/right pairs
    fn is_stereo(&self) -> bool;

    /// Sample rate in Hz
    fn rate(&self) -> u32;

    /// Whether every sample has been handed out by `read_buffer`
    fn end_of_data(&self) -> bool;

    /// Whether the stream is completely finished
    ///
    /// A superset of [`end_of_data`](Self::end_of_data) for streams that keep
    /// their own internal buffering.
    fn end_of_stream(&self) -> bool {
        self.end_of_data()
    }
}

/// A stream that can restart from its first sample
pub trait RewindableAudioStream: AudioStream {
    /// Restart the stream, returning false if that is impossible
    fn rewind(&mut self) -> bool;
}

impl<S: AudioStream + ?Sized> AudioStream for Box<S> {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> Result<usize> {
        (**self).read_buffer(buffer)
    }

    fn is_stereo(&self) -> bool {
        (**self).is_stereo()
    }

    fn rate(&self) -> u32 {
        (**self).rate()
    }

    fn end_of_data(&self) -> bool {
        (**self).end_of_data()
    }

    fn end_of_stream(&self) -> bool {
        (**self).end_of_stream()
    }
}

impl<S: RewindableAudioStream + ?Sized> RewindableAudioStream for Box<S> {
    fn rewind(&mut self) -> bool {
        (**self).rewind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silence {
        remaining: usize,
    }

    impl AudioStream for Silence {
        fn read_buffer(&mut self, buffer: &mut [i16]) -> Result<usize> {
            let count = buffer.len().min(self.remaining);
            buffer[..count].fill(0);
            self.remaining -= count;
            Ok(count)
        }

        fn is_stereo(&self) -> bool {
            false
        }

        fn rate(&self) -> u32 {
            22050
        }

        fn end_of_data(&self) -> bool {
            self.remaining == 0
        }
    }

    #[test]
    fn test_end_of_stream_defaults_to_end_of_data() {
        let mut stream = Silence { remaining: 10 };
        assert!(!stream.end_of_stream());

        let mut buffer = [1i16; 16];
        assert_eq!(stream.read_buffer(&mut buffer).unwrap(), 10);
        assert!(stream.end_of_data());
        assert!(stream.end_of_stream());
        assert_eq!(stream.read_buffer(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_boxed_stream_delegates() {
        let mut boxed: Box<dyn AudioStream> = Box::new(Silence { remaining: 4 });
        assert_eq!(boxed.rate(), 22050);

        let mut buffer = [0i16; 3];
        assert_eq!(boxed.read_buffer(&mut buffer).unwrap(), 3);
        assert!(!boxed.end_of_data());
    }
}
