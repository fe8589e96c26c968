//! WAV container handling, fragment merging and peak normalization.

pub mod merger;
pub mod normalizer;
pub mod wav;

pub use merger::{MergeSummary, merge, silence_bytes};
pub use normalizer::{NormalizeOutcome, normalize, normalize_or_fallback};
pub use wav::{PcmSpec, WavFormat, patch_sizes, read_format, write_header};
