//! RIFF/WAVE container reading and writing.
//!
//! Only the container metadata is interpreted here: the `fmt ` chunk fields
//! and the location of the `data` payload. Unknown chunks between them
//! (`LIST`, `fact`, ...) are skipped by their declared size. Writers emit a
//! canonical 44-byte header with zero size placeholders and back-patch the
//! sizes once the payload length is known.

use crate::error::{BookVoiceError, Result};
use std::fmt;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

/// Format tag for linear PCM.
pub const WAVE_FORMAT_PCM: u16 = 1;

/// Size of the `fmt ` chunk body written by [`write_header`].
pub const FMT_CHUNK_BYTES: u32 = 16;

/// Byte offset of the RIFF chunk size field.
const RIFF_SIZE_OFFSET: u64 = 4;

/// Sample layout shared by every fragment of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl PcmSpec {
    /// Bytes per sample frame across all channels.
    pub fn block_align(&self) -> u32 {
        u32::from(self.channels) * u32::from(self.bits_per_sample).div_ceil(8)
    }

    /// Bytes per second of audio, saturating at `u32::MAX`.
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate.saturating_mul(self.block_align())
    }

    /// Block align and byte rate as stored in a `fmt ` chunk.
    ///
    /// # Errors
    ///
    /// [`BookVoiceError::MalformedContainer`] for zero channels or bit depth,
    /// a frame wider than the 16-bit block align field, or a byte rate past
    /// `u32::MAX`.
    pub fn header_fields(&self) -> Result<(u16, u32)> {
        if self.channels == 0 {
            return Err(malformed("zero channels"));
        }
        if self.bits_per_sample == 0 {
            return Err(malformed("zero bits per sample"));
        }
        let block_align = u32::from(self.channels)
            .checked_mul(u32::from(self.bits_per_sample).div_ceil(8))
            .and_then(|align| u16::try_from(align).ok())
            .ok_or_else(|| malformed("block align does not fit 16 bits"))?;
        let byte_rate = self
            .sample_rate
            .checked_mul(u32::from(block_align))
            .ok_or_else(|| malformed("byte rate does not fit 32 bits"))?;
        Ok((block_align, byte_rate))
    }
}

impl fmt::Display for PcmSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {} bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// Container metadata returned by [`read_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    /// Format tag from the `fmt ` chunk (1 = PCM).
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Absolute byte offset of the first payload byte.
    pub data_offset: u64,
    /// Payload length in bytes.
    pub data_size: u32,
}

impl WavFormat {
    pub fn spec(&self) -> PcmSpec {
        PcmSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
        }
    }
}

/// Read the `fmt ` and `data` chunk metadata of a RIFF/WAVE stream.
///
/// A `data` chunk whose declared size runs past the end of the stream (as
/// left behind by streaming writers) is clamped to the bytes actually present.
///
/// # Errors
///
/// [`BookVoiceError::MalformedContainer`] if the RIFF/WAVE magic is missing,
/// the `fmt ` chunk is truncated or describes an impossible layout (see
/// [`PcmSpec::header_fields`]), or the stream ends before both chunks are
/// found. I/O errors other than a premature end of stream are propagated.
pub fn read_format<R: Read + Seek>(reader: &mut R) -> Result<WavFormat> {
    reader.seek(SeekFrom::Start(0))?;

    let mut riff = [0u8; 12];
    read_exact_or_malformed(reader, &mut riff, "file shorter than a RIFF header")?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(malformed("missing RIFF/WAVE magic bytes"));
    }

    let mut fmt_fields: Option<(u16, u16, u32, u16)> = None;

    loop {
        let mut header = [0u8; 8];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(malformed(if fmt_fields.is_some() {
                    "no data chunk before end of file"
                } else {
                    "no fmt chunk before end of file"
                }));
            }
            Err(e) => return Err(e.into()),
        }

        let id = [header[0], header[1], header[2], header[3]];
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        match &id {
            b"fmt " => {
                if size < FMT_CHUNK_BYTES {
                    return Err(malformed("fmt chunk shorter than 16 bytes"));
                }
                let mut body = [0u8; FMT_CHUNK_BYTES as usize];
                read_exact_or_malformed(reader, &mut body, "truncated fmt chunk")?;
                fmt_fields = Some((
                    u16::from_le_bytes([body[0], body[1]]),
                    u16::from_le_bytes([body[2], body[3]]),
                    u32::from_le_bytes([body[4], body[5], body[6], body[7]]),
                    u16::from_le_bytes([body[14], body[15]]),
                ));
                skip_chunk(reader, size - FMT_CHUNK_BYTES, size)?;
            }
            b"data" => {
                let Some((audio_format, channels, sample_rate, bits_per_sample)) = fmt_fields
                else {
                    return Err(malformed("data chunk precedes fmt chunk"));
                };
                let data_offset = reader.stream_position()?;
                let end = reader.seek(SeekFrom::End(0))?;
                let available = end.saturating_sub(data_offset);
                let data_size = u32::try_from(available.min(u64::from(size))).unwrap_or(size);
                reader.seek(SeekFrom::Start(data_offset))?;

                let format = WavFormat {
                    audio_format,
                    channels,
                    sample_rate,
                    bits_per_sample,
                    data_offset,
                    data_size,
                };
                format.spec().header_fields()?;
                return Ok(format);
            }
            _ => skip_chunk(reader, size, size)?,
        }
    }
}

/// Write a canonical PCM header with zero size placeholders.
///
/// Returns the absolute offset of the `data` chunk size field, to be passed
/// to [`patch_sizes`] once the payload has been streamed.
pub fn write_header<W: Write + Seek>(out: &mut W, spec: &PcmSpec) -> Result<u64> {
    let (block_align, byte_rate) = spec.header_fields()?;

    out.write_all(b"RIFF")?;
    out.write_all(&0u32.to_le_bytes())?;
    out.write_all(b"WAVE")?;

    out.write_all(b"fmt ")?;
    out.write_all(&FMT_CHUNK_BYTES.to_le_bytes())?;
    out.write_all(&WAVE_FORMAT_PCM.to_le_bytes())?;
    out.write_all(&spec.channels.to_le_bytes())?;
    out.write_all(&spec.sample_rate.to_le_bytes())?;
    out.write_all(&byte_rate.to_le_bytes())?;
    out.write_all(&block_align.to_le_bytes())?;
    out.write_all(&spec.bits_per_sample.to_le_bytes())?;

    out.write_all(b"data")?;
    let data_size_offset = out.stream_position()?;
    out.write_all(&0u32.to_le_bytes())?;

    Ok(data_size_offset)
}

/// Back-patch the RIFF and `data` chunk sizes, then return to the end of the stream.
///
/// The RIFF size is `4 + (8 + 16) + 8 + total_data_bytes`, i.e. `36 + data`.
///
/// # Errors
///
/// [`BookVoiceError::OutputTooLarge`] when the sizes do not fit the 32-bit
/// fields of the container.
pub fn patch_sizes<W: Write + Seek>(
    out: &mut W,
    data_size_offset: u64,
    total_data_bytes: u64,
) -> Result<()> {
    let riff_size = 4 + (8 + u64::from(FMT_CHUNK_BYTES)) + 8 + total_data_bytes;
    let too_large = || BookVoiceError::OutputTooLarge {
        bytes: total_data_bytes,
    };
    let riff_size = u32::try_from(riff_size).map_err(|_| too_large())?;
    let data_size = u32::try_from(total_data_bytes).map_err(|_| too_large())?;

    out.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
    out.write_all(&riff_size.to_le_bytes())?;
    out.seek(SeekFrom::Start(data_size_offset))?;
    out.write_all(&data_size.to_le_bytes())?;
    out.seek(SeekFrom::End(0))?;
    out.flush()?;
    Ok(())
}

/// Skip a chunk body plus the pad byte RIFF adds after odd-sized chunks.
fn skip_chunk<R: Read + Seek>(reader: &mut R, remaining: u32, declared: u32) -> Result<()> {
    let pad = u64::from(declared % 2);
    reader.seek(SeekFrom::Current(i64::from(remaining) + pad as i64))?;
    Ok(())
}

fn read_exact_or_malformed<R: Read>(reader: &mut R, buf: &mut [u8], context: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            malformed(context)
        } else {
            e.into()
        }
    })
}

fn malformed(message: &str) -> BookVoiceError {
    BookVoiceError::MalformedContainer {
        message: message.to_string(),
    }
}
