//! RIFF/WAVE header codec.
//!
//! Parsing walks the tagged sub-chunks of the container sequentially, so it
//! works on any [`Read`] stream and never assumes fixed offsets: every
//! sub-chunk that is not the one being looked for is skipped by its declared
//! length. Writing always produces the canonical 44-byte header of a PCM file
//! without extra chunks.

use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use log::{debug, warn};

use crate::error::WavSplitError;

pub const RIFF_TAG: [u8; 4] = *b"RIFF";
pub const WAVE_TAG: [u8; 4] = *b"WAVE";
pub const FMT_TAG: [u8; 4] = *b"fmt ";
pub const DATA_TAG: [u8; 4] = *b"data";

/// Format code of integer PCM samples.
pub const PCM_FORMAT: u16 = 1;

/// Length of the fixed part of the `fmt ` payload.
pub const FMT_PAYLOAD_LEN: u32 = 16;

/// Bytes counted by the RIFF size field on top of the audio data for a
/// header produced by [`ContainerHeader::render`].
pub const HEADER_OVERHEAD: u32 = 36;

/// Total length of a header produced by [`ContainerHeader::render`].
pub const HEADER_LEN: usize = 44;

/// Largest data length whose RIFF size field still fits in 32 bits.
pub const MAX_DATA_BYTES: u64 = (u32::MAX - HEADER_OVERHEAD) as u64;

/// Sample layout shared by every chunk file of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FormatDescriptor {
    pub audio_format: u16,
    pub channel_count: u16,
    pub sample_rate_hz: u32,
    pub bits_per_sample: u16,
}

impl FormatDescriptor {
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Bytes consumed by one interleaved frame (one sample of every channel).
    pub fn frame_stride(&self) -> usize {
        usize::from(self.channel_count) * self.bytes_per_sample()
    }

    /// Check the invariants the demultiplexer relies on.
    ///
    /// `declared_block_align` is the per-frame byte count stored in the
    /// container, which must agree with the stride derived from the other
    /// fields.
    pub fn validate(&self, declared_block_align: u16) -> Result<(), WavSplitError> {
        if self.audio_format != PCM_FORMAT {
            return Err(WavSplitError::UnsupportedFormat {
                format_code: self.audio_format,
            });
        }
        if self.channel_count == 0 {
            return Err(WavSplitError::malformed("format declares zero channels"));
        }
        if self.bits_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(WavSplitError::malformed(format!(
                "unsupported sample width of {} bits",
                self.bits_per_sample
            )));
        }
        if usize::from(declared_block_align) != self.frame_stride() {
            return Err(WavSplitError::malformed(format!(
                "block alignment {} does not match {} channels of {} bytes",
                declared_block_align,
                self.channel_count,
                self.bytes_per_sample()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} channel(s) at {} Hz, {}-bit",
            self.channel_count, self.sample_rate_hz, self.bits_per_sample
        )
    }
}

/// Result of parsing a container header.
///
/// The reader is left positioned at the first byte of the audio data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedHeader {
    pub format: FormatDescriptor,
    /// Length stored in the `data` sub-chunk. Informational only: the
    /// demultiplexer reads until the stream ends.
    pub declared_data_bytes: u32,
}

/// One tagged, length-prefixed sub-chunk header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ChunkTag {
    id: [u8; 4],
    len: u32,
}

impl ChunkTag {
    fn read<R: Read>(reader: &mut R, sought: &[u8; 4]) -> Result<Self, WavSplitError> {
        let mut id = [0u8; 4];
        reader
            .read_exact(&mut id)
            .map_err(truncated(format!("no '{}' sub-chunk found", tag_name(sought))))?;
        let len = reader
            .read_u32::<LittleEndian>()
            .map_err(truncated(format!(
                "sub-chunk '{}' has no length field",
                tag_name(&id)
            )))?;
        Ok(Self { id, len })
    }
}

/// Parse a container header from `reader`.
///
/// The 12-byte preamble is read verbatim, then the `fmt ` and `data`
/// sub-chunks are located in that order, skipping everything else.
pub fn parse_header<R: Read>(reader: &mut R) -> Result<ParsedHeader, WavSplitError> {
    let mut preamble = [0u8; 12];
    reader
        .read_exact(&mut preamble)
        .map_err(truncated("container preamble is incomplete"))?;
    if preamble[0..4] != RIFF_TAG || preamble[8..12] != WAVE_TAG {
        warn!(
            "unexpected container preamble '{}'/'{}', continuing",
            String::from_utf8_lossy(&preamble[0..4]),
            String::from_utf8_lossy(&preamble[8..12])
        );
    }

    let fmt_len = seek_chunk(reader, &FMT_TAG)?;
    if fmt_len < FMT_PAYLOAD_LEN {
        return Err(WavSplitError::malformed(format!(
            "'fmt ' sub-chunk is only {fmt_len} bytes long"
        )));
    }

    let field = |name: &str| truncated(format!("'fmt ' field {name} is incomplete"));
    let audio_format = reader
        .read_u16::<LittleEndian>()
        .map_err(field("audio_format"))?;
    let channel_count = reader
        .read_u16::<LittleEndian>()
        .map_err(field("channel_count"))?;
    let sample_rate_hz = reader
        .read_u32::<LittleEndian>()
        .map_err(field("sample_rate"))?;
    let _byte_rate = reader
        .read_u32::<LittleEndian>()
        .map_err(field("byte_rate"))?;
    let block_align = reader
        .read_u16::<LittleEndian>()
        .map_err(field("block_align"))?;
    let bits_per_sample = reader
        .read_u16::<LittleEndian>()
        .map_err(field("bits_per_sample"))?;
    skip_bytes(reader, fmt_len - FMT_PAYLOAD_LEN, &FMT_TAG)?;

    let format = FormatDescriptor {
        audio_format,
        channel_count,
        sample_rate_hz,
        bits_per_sample,
    };
    format.validate(block_align)?;

    let declared_data_bytes = seek_chunk(reader, &DATA_TAG)?;

    Ok(ParsedHeader {
        format,
        declared_data_bytes,
    })
}

/// Advance past sub-chunks until one tagged `sought` is found and return its
/// declared length. The reader is left at the start of its payload.
fn seek_chunk<R: Read>(reader: &mut R, sought: &[u8; 4]) -> Result<u32, WavSplitError> {
    loop {
        let tag = ChunkTag::read(reader, sought)?;
        if &tag.id == sought {
            return Ok(tag.len);
        }
        debug!(
            "skipping '{}' sub-chunk of {} bytes",
            tag_name(&tag.id),
            tag.len
        );
        skip_bytes(reader, tag.len, &tag.id)?;
    }
}

fn skip_bytes<R: Read>(reader: &mut R, len: u32, id: &[u8; 4]) -> Result<(), WavSplitError> {
    if len == 0 {
        return Ok(());
    }
    let skipped = io::copy(&mut reader.by_ref().take(u64::from(len)), &mut io::sink())?;
    if skipped < u64::from(len) {
        return Err(WavSplitError::malformed(format!(
            "sub-chunk '{}' declares {} bytes but only {} remain",
            tag_name(id),
            len,
            skipped
        )));
    }
    Ok(())
}

fn truncated(reason: impl Into<String>) -> impl FnOnce(io::Error) -> WavSplitError {
    let reason = reason.into();
    move |err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            WavSplitError::malformed(reason)
        } else {
            WavSplitError::Io(err)
        }
    }
}

fn tag_name(id: &[u8; 4]) -> String {
    String::from_utf8_lossy(id).into_owned()
}

/// Header of a PCM output container with a fixed channel count.
///
/// The same value renders both the provisional header written when an output
/// is created and the final one written once its data length is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerHeader {
    format: FormatDescriptor,
}

impl ContainerHeader {
    /// Header for `source` re-labelled with `channel_count` channels.
    pub fn new(source: &FormatDescriptor, channel_count: u16) -> Self {
        Self {
            format: FormatDescriptor {
                channel_count,
                ..*source
            },
        }
    }

    pub fn block_align(&self) -> u16 {
        self.format.channel_count * (self.format.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.format
            .sample_rate_hz
            .wrapping_mul(u32::from(self.block_align()))
    }

    /// Serialize the header for a data section of `data_bytes` bytes.
    pub fn render(&self, data_bytes: u32) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&RIFF_TAG);
        LittleEndian::write_u32(&mut out[4..8], HEADER_OVERHEAD.wrapping_add(data_bytes));
        out[8..12].copy_from_slice(&WAVE_TAG);
        out[12..16].copy_from_slice(&FMT_TAG);
        LittleEndian::write_u32(&mut out[16..20], FMT_PAYLOAD_LEN);
        LittleEndian::write_u16(&mut out[20..22], self.format.audio_format);
        LittleEndian::write_u16(&mut out[22..24], self.format.channel_count);
        LittleEndian::write_u32(&mut out[24..28], self.format.sample_rate_hz);
        LittleEndian::write_u32(&mut out[28..32], self.byte_rate());
        LittleEndian::write_u16(&mut out[32..34], self.block_align());
        LittleEndian::write_u16(&mut out[34..36], self.format.bits_per_sample);
        out[36..40].copy_from_slice(&DATA_TAG);
        LittleEndian::write_u32(&mut out[40..44], data_bytes);
        out
    }
}

/// Write a header for `descriptor` with `channel_count` channels and a data
/// section of `data_bytes` bytes.
pub fn write_header<W: Write>(
    writer: &mut W,
    descriptor: &FormatDescriptor,
    channel_count: u16,
    data_bytes: u32,
) -> Result<(), WavSplitError> {
    let header = ContainerHeader::new(descriptor, channel_count).render(data_bytes);
    writer
        .write_all(&header)
        .map_err(|source| WavSplitError::WriteFailure {
            target: String::from("container header"),
            source,
        })
}
