//! Raw PCM streams from RIFF/WAVE containers
//!
//! Only integer PCM (format tag 1) with 8 or 16 bit samples is handled here;
//! compressed payloads inside RIFF are routed to a codec by the format
//! sniffer instead.

use super::stream::{AudioStream, RewindableAudioStream};
use super::sub_stream::SeekableStream;
use super::{AudioError, Result};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Read, Seek, SeekFrom};

const WAVE_FORMAT_PCM: u16 = 1;

/// A rewindable stream over the `data` chunk of a PCM WAVE file
pub struct WavStream {
    reader: Box<dyn SeekableStream>,
    stereo: bool,
    rate: u32,
    bits_per_sample: u16,
    data_start: u64,
    /// Samples (not frames) in the data chunk
    total_samples: u64,
    remaining_samples: u64,
    scratch: Vec<u8>,
}

impl std::fmt::Debug for WavStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavStream")
            .field("stereo", &self.stereo)
            .field("rate", &self.rate)
            .field("bits_per_sample", &self.bits_per_sample)
            .field("total_samples", &self.total_samples)
            .field("remaining_samples", &self.remaining_samples)
            .finish_non_exhaustive()
    }
}

struct WaveFormat {
    channels: u16,
    rate: u32,
    bits_per_sample: u16,
}

impl WavStream {
    /// Parse a WAVE header starting at offset 0 of `reader`
    pub fn new(mut reader: Box<dyn SeekableStream>) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;

        let mut tag = [0u8; 4];
        read_tag(&mut reader, &mut tag)?;
        if &tag != b"RIFF" {
            return Err(AudioError::CorruptFormat("missing RIFF header".to_string()));
        }
        let _riff_size = read_u32(&mut reader)?;
        read_tag(&mut reader, &mut tag)?;
        if &tag != b"WAVE" {
            return Err(AudioError::CorruptFormat("RIFF file is not WAVE".to_string()));
        }

        let mut format = None;
        loop {
            read_tag(&mut reader, &mut tag)?;
            let size = read_u32(&mut reader)?;

            match &tag {
                b"fmt " => {
                    if size < 16 {
                        return Err(AudioError::CorruptFormat("fmt chunk too small".to_string()));
                    }
                    format = Some(parse_format(&mut reader, size)?);
                }
                b"data" => {
                    let format = format.ok_or_else(|| {
                        AudioError::CorruptFormat("data chunk before fmt chunk".to_string())
                    })?;
                    let data_start = reader.stream_position()?;
                    let available = reader.total_len()?.saturating_sub(data_start);
                    let data_len = u64::from(size).min(available);
                    return Ok(Self::from_format(reader, &format, data_start, data_len));
                }
                _ => {
                    // Chunks are word aligned
                    let skip = i64::from(size) + i64::from(size & 1);
                    reader.seek(SeekFrom::Current(skip))?;
                }
            }
        }
    }

    fn from_format(
        reader: Box<dyn SeekableStream>,
        format: &WaveFormat,
        data_start: u64,
        data_len: u64,
    ) -> Self {
        let bytes_per_sample = u64::from(format.bits_per_sample / 8);
        let mut total_samples = data_len / bytes_per_sample;
        if format.channels == 2 {
            // Whole frames only
            total_samples &= !1;
        }

        log::debug!(
            "WAVE stream: {} Hz, {} channel(s), {} bit, {} samples",
            format.rate,
            format.channels,
            format.bits_per_sample,
            total_samples
        );

        Self {
            reader,
            stereo: format.channels == 2,
            rate: format.rate,
            bits_per_sample: format.bits_per_sample,
            data_start,
            total_samples,
            remaining_samples: total_samples,
            scratch: Vec::new(),
        }
    }

    /// Samples (not frames) in the stream
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }
}

fn parse_format(reader: &mut Box<dyn SeekableStream>, size: u32) -> Result<WaveFormat> {
    let format_tag = reader.read_u16::<LittleEndian>().map_err(truncated)?;
    let channels = reader.read_u16::<LittleEndian>().map_err(truncated)?;
    let rate = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    let _byte_rate = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    let _block_align = reader.read_u16::<LittleEndian>().map_err(truncated)?;
    let bits_per_sample = reader.read_u16::<LittleEndian>().map_err(truncated)?;

    // Skip cbSize and any extension, keeping word alignment
    let rest = i64::from(size - 16) + i64::from(size & 1);
    reader.seek(SeekFrom::Current(rest))?;

    if format_tag != WAVE_FORMAT_PCM {
        return Err(AudioError::CorruptFormat(format!(
            "unsupported WAVE encoding {format_tag:#06x}"
        )));
    }
    if channels != 1 && channels != 2 {
        return Err(AudioError::CorruptFormat(format!(
            "unsupported WAVE channel count {channels}"
        )));
    }
    if bits_per_sample != 8 && bits_per_sample != 16 {
        return Err(AudioError::CorruptFormat(format!(
            "unsupported WAVE sample size {bits_per_sample}"
        )));
    }
    if rate == 0 {
        return Err(AudioError::CorruptFormat("WAVE sample rate is 0".to_string()));
    }

    Ok(WaveFormat {
        channels,
        rate,
        bits_per_sample,
    })
}

fn read_tag(reader: &mut Box<dyn SeekableStream>, tag: &mut [u8; 4]) -> Result<()> {
    reader.read_exact(tag).map_err(truncated)
}

fn read_u32(reader: &mut Box<dyn SeekableStream>) -> Result<u32> {
    reader.read_u32::<LittleEndian>().map_err(truncated)
}

fn truncated(error: io::Error) -> AudioError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        AudioError::CorruptFormat("truncated WAVE header".to_string())
    } else {
        AudioError::Io(error)
    }
}

impl AudioStream for WavStream {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> Result<usize> {
        let mut count = (buffer.len() as u64).min(self.remaining_samples) as usize;
        if self.stereo {
            count &= !1;
        }
        if count == 0 {
            return Ok(0);
        }

        let bytes_per_sample = usize::from(self.bits_per_sample / 8);
        self.scratch.resize(count * bytes_per_sample, 0);

        // A short file is treated as ending early rather than as an error
        let mut filled = 0;
        while filled < self.scratch.len() {
            let read = self.reader.read(&mut self.scratch[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        let mut count = filled / bytes_per_sample;
        if self.stereo {
            count &= !1;
        }

        if self.bits_per_sample == 16 {
            LittleEndian::read_i16_into(&self.scratch[..count * 2], &mut buffer[..count]);
        } else {
            for (out, byte) in buffer[..count].iter_mut().zip(&self.scratch[..count]) {
                *out = (i16::from(*byte) - 128) << 8;
            }
        }

        if count == 0 {
            self.remaining_samples = 0;
        } else {
            self.remaining_samples -= count as u64;
        }
        Ok(count)
    }

    fn is_stereo(&self) -> bool {
        self.stereo
    }

    fn rate(&self) -> u32 {
        self.rate
    }

    fn end_of_data(&self) -> bool {
        self.remaining_samples == 0
    }
}

impl RewindableAudioStream for WavStream {
    fn rewind(&mut self) -> bool {
        match self.reader.seek(SeekFrom::Start(self.data_start)) {
            Ok(_) => {
                self.remaining_samples = self.total_samples;
                true
            }
            Err(e) => {
                log::warn!("Failed to rewind WAVE stream: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_data {
    use byteorder::{LittleEndian, WriteBytesExt};

    /// Build a PCM WAVE file in memory
    pub fn wav_bytes(channels: u16, rate: u32, bits: u16, samples: &[i16]) -> Vec<u8> {
        let bytes_per_sample = u32::from(bits / 8);
        let data_len = samples.len() as u32 * bytes_per_sample;
        let mut wav = Vec::new();

        wav.extend_from_slice(b"RIFF");
        wav.write_u32::<LittleEndian>(36 + data_len).unwrap();
        wav.extend_from_slice(b"WAVE");

        wav.extend_from_slice(b"fmt ");
        wav.write_u32::<LittleEndian>(16).unwrap();
        wav.write_u16::<LittleEndian>(1).unwrap();
        wav.write_u16::<LittleEndian>(channels).unwrap();
        wav.write_u32::<LittleEndian>(rate).unwrap();
        wav.write_u32::<LittleEndian>(rate * u32::from(channels) * bytes_per_sample).unwrap();
        wav.write_u16::<LittleEndian>(channels * bits / 8).unwrap();
        wav.write_u16::<LittleEndian>(bits).unwrap();

        wav.extend_from_slice(b"data");
        wav.write_u32::<LittleEndian>(data_len).unwrap();
        for sample in samples {
            if bits == 16 {
                wav.write_i16::<LittleEndian>(*sample).unwrap();
            } else {
                wav.push(((*sample >> 8) + 128) as u8);
            }
        }

        wav
    }
}
