//! Default configuration constants for bookvoice.
//!
//! Shared between the configuration types, the audio passes and the
//! generation orchestrator so the tuning knobs live in one place.

/// Peak level normalization scales to, about -1.0 dBFS of full-scale 32767.
pub const TARGET_PEAK: i32 = 29195;

/// Silence inserted between consecutive segments of a chapter, in milliseconds.
pub const MERGE_SILENCE_MS: u32 = 400;

/// Whether merged chapters are peak-normalized by default.
pub const NORMALIZE_AUDIO: bool = true;

/// Synthesis sub-chunk limit (code points) for single-chapter generation.
pub const CHAPTER_MAX_CHARS: usize = 20;

/// Synthesis sub-chunk limit (code points) for whole-book batch generation.
pub const BATCH_MAX_CHARS: usize = 100;

/// Analysis chunk limit in code points.
pub const ANALYSIS_CHUNK_SIZE: usize = 800;

/// Upper bound of the boundary lookback window used when splitting for analysis.
pub const ANALYSIS_MAX_LOOKBACK: usize = 1000;

/// Block size in bytes for the streaming normalization passes.
pub const NORMALIZE_BLOCK_BYTES: usize = 8192;

/// Emotion used when neither the analysis nor the voice mapping provides one.
pub const DEFAULT_EMOTION: &str = "calm";

/// Chapter id used for whole-book batch progress messages.
pub const BATCH_PROGRESS_ID: &str = "batch-generate";

/// Per-subscriber progress buffer; a subscriber that falls this far behind is dropped.
pub const PROGRESS_BUFFER: usize = 64;

/// Root of project files, relative to the working directory.
pub const DATA_DIR: &str = "data";

/// Per-chapter scratch space for synthesized fragments.
pub const TEMP_DIR: &str = "data/temp";

/// Final chapter audio, as `{OUT_DIR}/{book_id}/{chapter_id}.wav`.
pub const OUT_DIR: &str = "data/out";

/// Directory scanned for voice reference files.
pub const VOICE_DIR: &str = "voices";

/// Default IndexTTS endpoint.
pub const TTS_URL: &str = "http://127.0.0.1:7860";

/// Voice file used when a speaker has no mapping.
pub const DEFAULT_VOICE: &str = "voice_06.wav";

/// Number of leading characters of a segment shown in progress messages.
pub const PROGRESS_PREVIEW_CHARS: usize = 10;
