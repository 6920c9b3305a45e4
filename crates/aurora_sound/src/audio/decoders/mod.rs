//! Format sniffing and decoder dispatch
//!
//! Sound resources come in a handful of containers. The first four bytes
//! decide which one:
//!
//! | Tag | Container | Payload |
//! |---|---|---|
//! | `FF F3 60 C4` | modified WAVE (stream sounds) | MP3 after a 0x1D6 byte header |
//! | `RIFF` | WAVE | raw PCM, or MP3 when the `data` chunk declares size 0 |
//! | `BMU ` + `V1.0` | BMU | MP3 after an 8 byte header |
//! | `OggS` | Ogg | Vorbis |
//!
//! Raw PCM is decoded in-crate ([`WavStream`](super::pcm::WavStream));
//! compressed payloads go through a [`DecoderRegistry`].

#[cfg(feature = "symphonia-decoders")]
pub mod symphonia_decoder;

use super::pcm::WavStream;
use super::stream::{AudioStream, RewindableAudioStream};
use super::sub_stream::{SeekableStream, SubReadStream};
use super::{AudioError, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Seek, SeekFrom};

/// Tag of the modified WAVE files used for streamed sounds
pub const MODIFIED_WAVE_TAG: u32 = 0xFFF3_60C4;

/// Size of the header in front of a modified WAVE's MP3 payload
pub const MODIFIED_WAVE_HEADER_SIZE: u64 = 0x1D6;

const fn tag(id: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*id)
}

const TAG_RIFF: u32 = tag(b"RIFF");
const TAG_FMT: u32 = tag(b"fmt ");
const TAG_FACT: u32 = tag(b"fact");
const TAG_DATA: u32 = tag(b"data");
const TAG_BMU: u32 = tag(b"BMU ");
const TAG_BMU_VERSION: u32 = tag(b"V1.0");
const TAG_OGG: u32 = tag(b"OggS");

/// Compressed codecs the sniffer can route to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    /// MPEG-1/2 layer III
    Mp3,
    /// Vorbis in an Ogg container
    Vorbis,
}

/// What the sniffer found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundFormat {
    /// PCM WAVE; the stream has been rewound to offset 0
    Wave,
    /// Compressed payload starting at `offset`
    Compressed {
        /// Codec of the payload
        codec: CodecKind,
        /// Byte offset of the payload in the source stream
        offset: u64,
    },
}

/// A freshly decoded stream, tagged with whether it can rewind
pub enum DecodedStream {
    /// Plays once
    Once(Box<dyn AudioStream>),
    /// Can restart, and therefore loop
    Rewindable(Box<dyn RewindableAudioStream>),
}

impl DecodedStream {
    /// Whether the stream supports rewinding
    pub fn is_rewindable(&self) -> bool {
        matches!(self, Self::Rewindable(_))
    }

    /// Forget the rewind capability
    pub fn into_stream(self) -> Box<dyn AudioStream> {
        match self {
            Self::Once(stream) => stream,
            Self::Rewindable(stream) => Box::new(stream),
        }
    }

    /// Borrow the stream through the common contract
    pub fn as_stream(&self) -> &dyn AudioStream {
        match self {
            Self::Once(stream) => stream.as_ref(),
            Self::Rewindable(stream) => stream,
        }
    }
}

impl fmt::Debug for DecodedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stream = self.as_stream();
        f.debug_struct("DecodedStream")
            .field("rewindable", &self.is_rewindable())
            .field("stereo", &stream.is_stereo())
            .field("rate", &stream.rate())
            .finish()
    }
}

/// Builds a stream from a compressed payload
pub type DecoderFactory =
    Box<dyn Fn(Box<dyn SeekableStream>) -> Result<DecodedStream> + Send + Sync>;

/// Maps compressed codecs to stream constructors
pub struct DecoderRegistry {
    factories: HashMap<CodecKind, DecoderFactory>,
}

impl DecoderRegistry {
    /// Create a registry without any compressed codec
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with the built-in compressed codecs
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty();

        #[cfg(feature = "symphonia-decoders")]
        {
            registry.register(CodecKind::Mp3, |source| {
                symphonia_decoder::SymphoniaStream::open(source, CodecKind::Mp3)
                    .map(|stream| DecodedStream::Rewindable(Box::new(stream)))
            });
            registry.register(CodecKind::Vorbis, |source| {
                symphonia_decoder::SymphoniaStream::open(source, CodecKind::Vorbis)
                    .map(|stream| DecodedStream::Rewindable(Box::new(stream)))
            });
        }

        registry
    }

    /// Register (or replace) the constructor for a codec
    pub fn register<F>(&mut self, codec: CodecKind, factory: F)
    where
        F: Fn(Box<dyn SeekableStream>) -> Result<DecodedStream> + Send + Sync + 'static,
    {
        self.factories.insert(codec, Box::new(factory));
    }

    /// Whether a codec can be decoded
    pub fn supports(&self, codec: CodecKind) -> bool {
        self.factories.contains_key(&codec)
    }

    /// Sniff the container and build the matching stream
    pub fn make_audio_stream(&self, mut source: Box<dyn SeekableStream>) -> Result<DecodedStream> {
        match sniff_format(&mut source)? {
            SoundFormat::Wave => Ok(DecodedStream::Rewindable(Box::new(WavStream::new(source)?))),
            SoundFormat::Compressed { codec, offset } => {
                let factory = self.factories.get(&codec).ok_or(AudioError::NoDecoder(codec))?;
                let payload: Box<dyn SeekableStream> = if offset == 0 {
                    source.seek(SeekFrom::Start(0))?;
                    source
                } else {
                    Box::new(SubReadStream::from_offset(source, offset)?)
                };
                log::debug!("Decoding {:?} payload at offset {:#x}", codec, offset);
                factory(payload)
            }
        }
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("codecs", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Identify the container of a sound resource
///
/// On success the stream is positioned at offset 0 for [`SoundFormat::Wave`]
/// and [`SoundFormat::Compressed`] payloads at offset 0, and at the payload
/// start otherwise.
pub fn sniff_format<S: SeekableStream + ?Sized>(stream: &mut S) -> Result<SoundFormat> {
    stream.seek(SeekFrom::Start(0))?;

    let id = match stream.read_u32::<BigEndian>() {
        Ok(id) => id,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(AudioError::UnknownFormat { tag: 0 });
        }
        Err(e) => return Err(e.into()),
    };

    match id {
        MODIFIED_WAVE_TAG => {
            stream.seek(SeekFrom::Start(MODIFIED_WAVE_HEADER_SIZE))?;
            Ok(SoundFormat::Compressed {
                codec: CodecKind::Mp3,
                offset: MODIFIED_WAVE_HEADER_SIZE,
            })
        }
        TAG_RIFF => sniff_riff(stream),
        TAG_BMU => {
            if read_be_tag(stream).ok() != Some(TAG_BMU_VERSION) {
                return Err(AudioError::UnknownFormat { tag: TAG_BMU });
            }
            let offset = stream.stream_position()?;
            Ok(SoundFormat::Compressed {
                codec: CodecKind::Mp3,
                offset,
            })
        }
        TAG_OGG => {
            stream.seek(SeekFrom::Start(0))?;
            Ok(SoundFormat::Compressed {
                codec: CodecKind::Vorbis,
                offset: 0,
            })
        }
        other => Err(AudioError::UnknownFormat { tag: other }),
    }
}

fn sniff_riff<S: SeekableStream + ?Sized>(stream: &mut S) -> Result<SoundFormat> {
    stream.seek(SeekFrom::Start(12))?;

    let mut id = read_be_tag(stream)?;
    if id != TAG_FMT {
        return Err(AudioError::CorruptFormat("broken WAVE file: missing fmt chunk".to_string()));
    }
    skip_chunk(stream)?;

    id = read_be_tag(stream)?;
    if id == TAG_FACT {
        // Skip the fact chunk and re-read the next header
        skip_chunk(stream)?;
        id = read_be_tag(stream)?;
    }

    if id != TAG_DATA {
        return Err(AudioError::CorruptFormat(format!(
            "found invalid tag {id:#010x} in WAVE file"
        )));
    }

    let data_size = stream.read_u32::<LittleEndian>().map_err(header_error)?;
    if data_size == 0 {
        // Dummied data header: the rest of the file is MP3
        let offset = stream.stream_position()?;
        return Ok(SoundFormat::Compressed {
            codec: CodecKind::Mp3,
            offset,
        });
    }

    stream.seek(SeekFrom::Start(0))?;
    Ok(SoundFormat::Wave)
}

fn read_be_tag<S: SeekableStream + ?Sized>(stream: &mut S) -> Result<u32> {
    stream.read_u32::<BigEndian>().map_err(header_error)
}

fn skip_chunk<S: SeekableStream + ?Sized>(stream: &mut S) -> Result<()> {
    let size = stream.read_u32::<LittleEndian>().map_err(header_error)?;
    stream.seek(SeekFrom::Current(i64::from(size)))?;
    Ok(())
}

fn header_error(error: io::Error) -> AudioError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        AudioError::CorruptFormat("truncated sound header".to_string())
    } else {
        AudioError::Io(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::test_data::wav_bytes;
    use byteorder::WriteBytesExt;
    use std::io::{Cursor, Read};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// RIFF header with a fmt chunk, an optional fact chunk and a data chunk
    fn riff_bytes(with_fact: bool, data_size: u32, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.write_u32::<LittleEndian>(20).unwrap();
        bytes.extend_from_slice(&[0u8; 20]);
        if with_fact {
            bytes.extend_from_slice(b"fact");
            bytes.write_u32::<LittleEndian>(4).unwrap();
            bytes.extend_from_slice(&[0u8; 4]);
        }
        bytes.extend_from_slice(b"data");
        bytes.write_u32::<LittleEndian>(data_size).unwrap();
        bytes.extend_from_slice(payload);
        bytes
    }

    fn cursor(bytes: Vec<u8>) -> Cursor<Vec<u8>> {
        Cursor::new(bytes)
    }

    /// Records the payload's first byte and hands back a one-sample stream
    fn recording_registry(seen: Arc<AtomicU64>) -> DecoderRegistry {
        let mut registry = DecoderRegistry::empty();
        for codec in [CodecKind::Mp3, CodecKind::Vorbis] {
            let seen = Arc::clone(&seen);
            registry.register(codec, move |mut source| {
                let mut first = [0u8; 1];
                source.read_exact(&mut first)?;
                seen.store(u64::from(first[0]), Ordering::SeqCst);
                let wav = wav_bytes(1, 8000, 16, &[0]);
                Ok(DecodedStream::Once(Box::new(WavStream::new(Box::new(cursor(wav)))?)))
            });
        }
        registry
    }

    #[test]
    fn test_riff_with_zero_data_size_is_compressed() {
        let bytes = riff_bytes(false, 0, &[0xAB, 0xCD]);
        let payload_offset = (bytes.len() - 2) as u64;
        let mut stream = cursor(bytes);

        let format = sniff_format(&mut stream).unwrap();
        assert_eq!(
            format,
            SoundFormat::Compressed {
                codec: CodecKind::Mp3,
                offset: payload_offset
            }
        );
    }

    #[test]
    fn test_riff_with_data_is_raw_pcm_at_offset_zero() {
        let mut stream = cursor(riff_bytes(false, 4, &[1, 2, 3, 4]));
        assert_eq!(sniff_format(&mut stream).unwrap(), SoundFormat::Wave);
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn test_fact_chunk_is_skipped() {
        let mut stream = cursor(riff_bytes(true, 0, &[0xFF]));
        assert!(matches!(
            sniff_format(&mut stream).unwrap(),
            SoundFormat::Compressed { codec: CodecKind::Mp3, .. }
        ));
    }

    #[test]
    fn test_riff_without_fmt_is_corrupt() {
        let mut bytes = riff_bytes(false, 4, &[0; 4]);
        bytes[12..16].copy_from_slice(b"junk");
        assert!(matches!(
            sniff_format(&mut cursor(bytes)),
            Err(AudioError::CorruptFormat(_))
        ));
    }

    #[test]
    fn test_riff_with_unknown_chunk_is_corrupt() {
        let mut bytes = riff_bytes(false, 4, &[0; 4]);
        let data_at = bytes.len() - 12;
        bytes[data_at..data_at + 4].copy_from_slice(b"LIST");
        assert!(matches!(
            sniff_format(&mut cursor(bytes)),
            Err(AudioError::CorruptFormat(_))
        ));
    }

    #[test]
    fn test_modified_wave_skips_header() {
        let mut bytes = vec![0u8; MODIFIED_WAVE_HEADER_SIZE as usize + 4];
        bytes[..4].copy_from_slice(&MODIFIED_WAVE_TAG.to_be_bytes());
        let mut stream = cursor(bytes);

        assert_eq!(
            sniff_format(&mut stream).unwrap(),
            SoundFormat::Compressed {
                codec: CodecKind::Mp3,
                offset: 0x1D6
            }
        );
        assert_eq!(stream.position(), 0x1D6);
    }

    #[test]
    fn test_bmu_needs_version_tag() {
        let mut good = b"BMU V1.0".to_vec();
        good.extend_from_slice(&[0x11; 4]);
        assert_eq!(
            sniff_format(&mut cursor(good)).unwrap(),
            SoundFormat::Compressed {
                codec: CodecKind::Mp3,
                offset: 8
            }
        );

        let bad = b"BMU V2.0".to_vec();
        assert!(matches!(
            sniff_format(&mut cursor(bad)),
            Err(AudioError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn test_ogg_is_vorbis_from_start() {
        let mut stream = cursor(b"OggS\0\0\0\0".to_vec());
        assert_eq!(
            sniff_format(&mut stream).unwrap(),
            SoundFormat::Compressed {
                codec: CodecKind::Vorbis,
                offset: 0
            }
        );
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn test_unknown_and_short_streams() {
        assert!(matches!(
            sniff_format(&mut cursor(b"fLaC1234".to_vec())),
            Err(AudioError::UnknownFormat { tag }) if tag == u32::from_be_bytes(*b"fLaC")
        ));
        assert!(matches!(
            sniff_format(&mut cursor(vec![0x52, 0x49])),
            Err(AudioError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn test_registry_builds_wave_streams() {
        let registry = DecoderRegistry::empty();
        let samples: Vec<i16> = (0..32).collect();
        let decoded = registry
            .make_audio_stream(Box::new(cursor(wav_bytes(2, 44100, 16, &samples))))
            .unwrap();
        assert!(decoded.is_rewindable());
        assert!(decoded.as_stream().is_stereo());
        assert_eq!(decoded.as_stream().rate(), 44100);
    }

    #[test]
    fn test_registry_hands_payload_window_to_codec() {
        let seen = Arc::new(AtomicU64::new(0));
        let registry = recording_registry(Arc::clone(&seen));

        let mut bmu = b"BMU V1.0".to_vec();
        bmu.push(0x5A);
        registry.make_audio_stream(Box::new(cursor(bmu))).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0x5A);

        registry
            .make_audio_stream(Box::new(cursor(riff_bytes(true, 0, &[0x77]))))
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0x77);

        registry.make_audio_stream(Box::new(cursor(b"OggS".to_vec()))).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), u64::from(b'O'));
    }

    #[test]
    fn test_missing_codec_is_reported() {
        let registry = DecoderRegistry::empty();
        let result = registry.make_audio_stream(Box::new(cursor(b"OggS".to_vec())));
        assert!(matches!(result, Err(AudioError::NoDecoder(CodecKind::Vorbis))));
    }
}
