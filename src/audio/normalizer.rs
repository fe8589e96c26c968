//! Two-pass peak normalization of 16-bit PCM WAV files.

use crate::audio::wav::{self, WAVE_FORMAT_PCM};
use crate::defaults::{NORMALIZE_BLOCK_BYTES, TARGET_PEAK};
use crate::error::{BookVoiceError, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, warn};

/// What [`normalize`] did to the file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizeOutcome {
    /// Input was silent; output is a byte-identical copy.
    Silent,
    /// Samples were scaled by `gain` so `peak` maps to the target peak.
    Scaled { peak: i32, gain: f64 },
}

/// Gain that maps `peak` onto [`TARGET_PEAK`]. May attenuate or boost.
pub fn gain_for_peak(peak: i32) -> f64 {
    f64::from(TARGET_PEAK) / f64::from(peak)
}

/// Scale one sample, rounding and clamping to the signed 16-bit range.
fn scale_sample(sample: i16, gain: f64) -> i16 {
    (f64::from(sample) * gain)
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Peak-normalize the 16-bit PCM file at `input` into `output`.
///
/// Pass 1 streams the `data` chunk and tracks the largest absolute sample
/// over all interleaved channels. A silent file is copied verbatim. Otherwise
/// pass 2 writes a fresh header followed by every sample scaled by
/// `TARGET_PEAK / peak`, clamped to `[-32768, 32767]`. `input` and `output`
/// must be different paths.
///
/// # Errors
///
/// [`BookVoiceError::UnsupportedFormat`] unless the input is linear PCM with
/// 16 bits per sample. Read, seek and write failures are propagated; the
/// output may be partially written in that case.
pub fn normalize(input: &Path, output: &Path) -> Result<NormalizeOutcome> {
    let mut reader = BufReader::new(File::open(input)?);
    let format = wav::read_format(&mut reader)?;

    if format.audio_format != WAVE_FORMAT_PCM || format.bits_per_sample != 16 {
        return Err(BookVoiceError::UnsupportedFormat {
            audio_format: format.audio_format,
            bits_per_sample: format.bits_per_sample,
        });
    }

    // Pass 1: peak scan.
    reader.seek(SeekFrom::Start(format.data_offset))?;
    let mut peak: i32 = 0;
    for_each_sample_block(&mut reader, format.data_size, |samples| {
        for sample in samples {
            peak = peak.max(i32::from(*sample).abs());
        }
        Ok(())
    })?;

    if peak == 0 {
        fs::copy(input, output)?;
        debug!(path = %input.display(), "silent input, copied unchanged");
        return Ok(NormalizeOutcome::Silent);
    }

    let gain = gain_for_peak(peak);
    debug!(peak, gain, "normalizing");

    // Pass 2: scale into a freshly written container.
    reader.seek(SeekFrom::Start(format.data_offset))?;
    let mut out = BufWriter::new(File::create(output)?);
    let data_size_offset = wav::write_header(&mut out, &format.spec())?;
    let mut written: u64 = 0;
    let mut scaled = Vec::with_capacity(NORMALIZE_BLOCK_BYTES);

    for_each_sample_block(&mut reader, format.data_size, |samples| {
        scaled.clear();
        for sample in samples {
            scaled.extend_from_slice(&scale_sample(*sample, gain).to_le_bytes());
        }
        out.write_all(&scaled)?;
        written += scaled.len() as u64;
        Ok(())
    })?;

    wav::patch_sizes(&mut out, data_size_offset, written)?;
    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;

    Ok(NormalizeOutcome::Scaled { peak, gain })
}

/// Normalize `merged` into `output`, falling back to a plain copy on failure.
///
/// Normalization problems never fail the caller: any error is logged and the
/// un-normalized audio becomes the output. Returns `true` when the output was
/// normalized. Only a failure of the fallback copy itself is returned.
pub fn normalize_or_fallback(merged: &Path, output: &Path) -> Result<bool> {
    match normalize(merged, output) {
        Ok(_) => Ok(true),
        Err(e) => {
            warn!(
                path = %merged.display(),
                "normalization failed, keeping un-normalized audio: {e}"
            );
            fs::copy(merged, output)?;
            Ok(false)
        }
    }
}

/// Stream `data_size` bytes of little-endian i16 samples in fixed-size blocks.
///
/// A trailing odd byte (a truncated sample) is ignored.
fn for_each_sample_block<R, F>(reader: &mut R, data_size: u32, mut visit: F) -> Result<()>
where
    R: Read,
    F: FnMut(&[i16]) -> Result<()>,
{
    let mut remaining = data_size as usize - (data_size as usize % 2);
    let mut bytes = vec![0u8; NORMALIZE_BLOCK_BYTES];
    let mut samples = Vec::with_capacity(NORMALIZE_BLOCK_BYTES / 2);

    while remaining > 0 {
        let len = remaining.min(bytes.len());
        reader.read_exact(&mut bytes[..len])?;
        samples.clear();
        samples.extend(
            bytes[..len]
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        );
        visit(&samples)?;
        remaining -= len;
    }

    Ok(())
}
