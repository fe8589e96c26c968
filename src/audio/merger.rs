//! Concatenation of WAV fragments into one file.

use crate::audio::wav::{self, PcmSpec};
use crate::error::{BookVoiceError, Result};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Result of a successful merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    /// Format taken from the first fragment.
    pub spec: PcmSpec,
    /// Number of fragments copied.
    pub fragments: usize,
    /// Bytes written to the output `data` chunk, silence included.
    pub data_bytes: u64,
}

/// Silence length in bytes for `silence_ms`, rounded up to whole sample frames.
pub fn silence_bytes(spec: &PcmSpec, silence_ms: u32) -> usize {
    let block = u64::from(spec.block_align().max(1));
    let raw = (u64::from(spec.byte_rate()) * u64::from(silence_ms)).div_ceil(1000);
    (raw.div_ceil(block) * block) as usize
}

/// Concatenate the `data` payloads of `inputs` into a new WAV file at `output`.
///
/// The format of the first fragment is used for the output header; every
/// later fragment must share its channel count, sample rate and bit depth.
/// When `silence_ms > 0`, that much silence is written before each fragment
/// after the first. Only `data` payloads are copied, never fragment headers.
///
/// # Errors
///
/// [`BookVoiceError::EmptyInput`] for an empty list,
/// [`BookVoiceError::MalformedContainer`] for an unreadable fragment,
/// [`BookVoiceError::AudioFormatMismatch`] when a fragment's format differs
/// from the first. I/O failures are propagated as-is. A partially written
/// output file is left in place on error; removing it is up to the caller.
pub fn merge<P: AsRef<Path>>(inputs: &[P], output: &Path, silence_ms: u32) -> Result<MergeSummary> {
    let Some(first) = inputs.first() else {
        return Err(BookVoiceError::EmptyInput);
    };

    let spec = {
        let mut reader = BufReader::new(File::open(first.as_ref())?);
        wav::read_format(&mut reader)?.spec()
    };

    let silence = if silence_ms > 0 {
        // 8-bit PCM is unsigned, its midpoint is 0x80.
        let fill = if spec.bits_per_sample == 8 { 0x80 } else { 0 };
        vec![fill; silence_bytes(&spec, silence_ms)]
    } else {
        Vec::new()
    };

    let mut out = BufWriter::new(File::create(output)?);
    let data_size_offset = wav::write_header(&mut out, &spec)?;
    let mut data_bytes: u64 = 0;

    for (index, input) in inputs.iter().enumerate() {
        let path = input.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let format = wav::read_format(&mut reader)?;

        if format.spec() != spec {
            return Err(BookVoiceError::AudioFormatMismatch {
                path: path.display().to_string(),
                expected: spec.to_string(),
                actual: format.spec().to_string(),
            });
        }

        if index > 0 && !silence.is_empty() {
            out.write_all(&silence)?;
            data_bytes += silence.len() as u64;
        }

        reader.seek(SeekFrom::Start(format.data_offset))?;
        let copied = io::copy(&mut reader.take(u64::from(format.data_size)), &mut out)?;
        debug!(path = %path.display(), bytes = copied, "appended fragment");
        data_bytes += copied;
    }

    wav::patch_sizes(&mut out, data_size_offset, data_bytes)?;
    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;

    Ok(MergeSummary {
        spec,
        fragments: inputs.len(),
        data_bytes,
    })
}
