//! bookvoice - narrated audio for book chapters
//!
//! Splits chapter text for analysis and synthesis, drives a speech backend
//! segment by segment, and assembles the fragments into one peak-normalized
//! WAV file per chapter.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod analysis;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod generation;
#[cfg(feature = "cli")]
pub mod output;
pub mod progress;
pub mod project;
pub mod synth;
pub mod text;

// Backend traits
pub use analysis::{Analyzer, MockAnalyzer};
pub use synth::{MockSynthesizer, SynthesisRequest, Synthesizer};

// Audio assembly
pub use audio::{merge, normalize, normalize_or_fallback};
pub use text::{split_for_analysis, split_for_synthesis};

// Generation
pub use generation::{
    BatchSummary, CancelFlag, ChapterState, GenerationSettings, Generator, JobHandle, JobManager,
};
pub use progress::{ProgressHub, ProgressMessage};
pub use project::{Emotion, ProjectStore, Segment, VoiceConfig};

// Error handling
pub use error::{BookVoiceError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_hash_suffix_only_with_git_hash() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "Git hash should be 7 chars, got: {}", ver);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
