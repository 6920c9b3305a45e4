//! Compressed payload decoding using symphonia
//!
//! Decodes MP3 and Ogg Vorbis payloads packet by packet into interleaved
//! 16 bit PCM.

use super::CodecKind;
use crate::audio::stream::{AudioStream, RewindableAudioStream};
use crate::audio::sub_stream::SeekableStream;
use crate::audio::{AudioError, Result};
use std::io::{self, Read, Seek, SeekFrom};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Exposes a [`SeekableStream`] to symphonia
struct StreamSource {
    inner: Box<dyn SeekableStream>,
    len: u64,
}

impl Read for StreamSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for StreamSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl MediaSource for StreamSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}

/// A rewindable stream over an MP3 or Vorbis payload
pub struct SymphoniaStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    codec: CodecKind,
    stereo: bool,
    rate: u32,
    /// Channel layout and rate came from the container or a decoded packet
    layout_known: bool,
    sample_buf: Option<SampleBuffer<i16>>,
    sample_spec: Option<SignalSpec>,
    pending: Vec<i16>,
    pending_pos: usize,
    finished: bool,
}

impl std::fmt::Debug for SymphoniaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymphoniaStream")
            .field("codec", &self.codec)
            .field("track_id", &self.track_id)
            .field("stereo", &self.stereo)
            .field("rate", &self.rate)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl SymphoniaStream {
    /// Probe `source` (positioned at the payload start) and set up a decoder
    pub fn open(mut source: Box<dyn SeekableStream>, codec: CodecKind) -> Result<Self> {
        let len = source.total_len()?;
        let media = MediaSourceStream::new(Box::new(StreamSource { inner: source, len }), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(match codec {
            CodecKind::Mp3 => "mp3",
            CodecKind::Vorbis => "ogg",
        });

        let probed = symphonia::default::get_probe()
            .format(&hint, media, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AudioError::CorruptFormat(format!("failed to probe {codec:?} payload: {e}")))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::CorruptFormat(format!("no audio track in {codec:?} payload")))?;

        let track_id = track.id;
        let channels = track.codec_params.channels.map(|c| c.count());
        let rate = track.codec_params.sample_rate;

        if let Some(count) = channels {
            if count == 0 || count > 2 {
                return Err(AudioError::CorruptFormat(format!(
                    "unsupported channel count {count}"
                )));
            }
        }

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::CorruptFormat(format!("failed to create {codec:?} decoder: {e}")))?;

        let mut stream = Self {
            format,
            decoder,
            track_id,
            codec,
            stereo: channels == Some(2),
            rate: rate.unwrap_or(0),
            layout_known: channels.is_some() && rate.is_some(),
            sample_buf: None,
            sample_spec: None,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
        };

        if !stream.layout_known {
            // MP3 only reveals its layout in the first frame
            stream.decode_next()?;
            if !stream.layout_known {
                return Err(AudioError::CorruptFormat(format!(
                    "{codec:?} payload contains no audio"
                )));
            }
        }

        log::debug!(
            "{:?} stream: {} Hz, {}",
            codec,
            stream.rate,
            if stream.stereo { "stereo" } else { "mono" }
        );

        Ok(stream)
    }

    /// Decode packets until one yields samples or the payload ends
    fn decode_next(&mut self) -> Result<()> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    self.finished = true;
                    return Ok(());
                }
                Err(SymphoniaError::ResetRequired) => {
                    log::warn!("{:?} stream changed parameters mid-stream, stopping", self.codec);
                    self.finished = true;
                    return Ok(());
                }
                Err(e) => return Err(AudioError::StreamError(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping undecodable {:?} packet: {}", self.codec, e);
                    continue;
                }
                Err(e) => return Err(AudioError::StreamError(e.to_string())),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            if channels == 0 || channels > 2 {
                return Err(AudioError::CorruptFormat(format!(
                    "unsupported channel count {channels}"
                )));
            }
            if self.layout_known {
                if (channels == 2) != self.stereo {
                    return Err(AudioError::CorruptFormat(
                        "channel layout changed mid-stream".to_string(),
                    ));
                }
            } else {
                self.stereo = channels == 2;
                self.rate = spec.rate;
                self.layout_known = true;
            }

            let needed = decoded.capacity() * channels;
            let reuse = self.sample_spec == Some(spec)
                && self.sample_buf.as_ref().is_some_and(|buf| buf.capacity() >= needed);
            if !reuse {
                self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                self.sample_spec = Some(spec);
            }

            if let Some(buf) = self.sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                self.pending.clear();
                self.pending.extend_from_slice(buf.samples());
                self.pending_pos = 0;
            }

            if !self.pending.is_empty() {
                return Ok(());
            }
        }
    }
}

impl AudioStream for SymphoniaStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> Result<usize> {
        let mut filled = 0;

        while filled < buffer.len() {
            if self.pending_pos < self.pending.len() {
                let count = (buffer.len() - filled).min(self.pending.len() - self.pending_pos);
                buffer[filled..filled + count]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + count]);
                filled += count;
                self.pending_pos += count;
            } else if self.finished {
                break;
            } else {
                self.decode_next()?;
            }
        }

        Ok(filled)
    }

    fn is_stereo(&self) -> bool {
        self.stereo
    }

    fn rate(&self) -> u32 {
        self.rate
    }

    fn end_of_data(&self) -> bool {
        self.finished && self.pending_pos >= self.pending.len()
    }
}

impl RewindableAudioStream for SymphoniaStream {
    fn rewind(&mut self) -> bool {
        let seek_to = SeekTo::TimeStamp {
            ts: 0,
            track_id: self.track_id,
        };
        match self.format.seek(SeekMode::Accurate, seek_to) {
            Ok(_) => {
                self.decoder.reset();
                self.pending.clear();
                self.pending_pos = 0;
                self.finished = false;
                true
            }
            Err(e) => {
                log::warn!("Failed to rewind {:?} stream: {}", self.codec, e);
                false
            }
        }
    }
}
