//! Error types for bookvoice.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookVoiceError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio container errors
    #[error("No input files to merge")]
    EmptyInput,

    #[error("Malformed WAV container: {message}")]
    MalformedContainer { message: String },

    #[error(
        "Unsupported audio format for normalization: format tag {audio_format}, {bits_per_sample} bits per sample"
    )]
    UnsupportedFormat {
        audio_format: u16,
        bits_per_sample: u16,
    },

    #[error("Audio format mismatch in {path}: expected {expected}, got {actual}")]
    AudioFormatMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Audio output too large for a WAV container: {bytes} data bytes")]
    OutputTooLarge { bytes: u64 },

    // Backend errors
    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Text analysis failed: {message}")]
    Analysis { message: String },

    // Generation errors
    #[error("Chapter not found: {chapter_id}")]
    ChapterNotFound { chapter_id: String },

    #[error("Chapter not analyzed yet: {chapter_id}")]
    ChapterNotAnalyzed { chapter_id: String },

    #[error("Generation already running for {chapter_id}")]
    AlreadyGenerating { chapter_id: String },

    #[error("Generation cancelled for {chapter_id}")]
    Cancelled { chapter_id: String },

    #[error("Invalid identifier {value:?}: {reason}")]
    InvalidIdentifier { value: String, reason: String },

    // Project persistence
    #[error("Project file error: {0}")]
    Project(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BookVoiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_empty_input_display() {
        assert_eq!(
            BookVoiceError::EmptyInput.to_string(),
            "No input files to merge"
        );
    }

    #[test]
    fn test_malformed_container_display() {
        let error = BookVoiceError::MalformedContainer {
            message: "missing RIFF magic".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Malformed WAV container: missing RIFF magic"
        );
    }

    #[test]
    fn test_unsupported_format_display() {
        let error = BookVoiceError::UnsupportedFormat {
            audio_format: 3,
            bits_per_sample: 32,
        };
        assert_eq!(
            error.to_string(),
            "Unsupported audio format for normalization: format tag 3, 32 bits per sample"
        );
    }

    #[test]
    fn test_audio_format_mismatch_display() {
        let error = BookVoiceError::AudioFormatMismatch {
            path: "2.wav".to_string(),
            expected: "22050 Hz, 1 ch, 16 bit".to_string(),
            actual: "44100 Hz, 1 ch, 16 bit".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio format mismatch in 2.wav: expected 22050 Hz, 1 ch, 16 bit, got 44100 Hz, 1 ch, 16 bit"
        );
    }

    #[test]
    fn test_synthesis_display() {
        let error = BookVoiceError::Synthesis {
            message: "POST API error: 500".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Speech synthesis failed: POST API error: 500"
        );
    }

    #[test]
    fn test_generation_state_errors_display() {
        let error = BookVoiceError::ChapterNotAnalyzed {
            chapter_id: "ch3".to_string(),
        };
        assert_eq!(error.to_string(), "Chapter not analyzed yet: ch3");

        let error = BookVoiceError::AlreadyGenerating {
            chapter_id: "ch3".to_string(),
        };
        assert_eq!(error.to_string(), "Generation already running for ch3");

        let error = BookVoiceError::Cancelled {
            chapter_id: "ch3".to_string(),
        };
        assert_eq!(error.to_string(), "Generation cancelled for ch3");
    }

    #[test]
    fn test_invalid_identifier_display() {
        let error = BookVoiceError::InvalidIdentifier {
            value: "../etc".to_string(),
            reason: "contains a path separator".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid identifier \"../etc\": contains a path separator"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: BookVoiceError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: BookVoiceError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: BookVoiceError = json_error.into();
        assert!(error.to_string().starts_with("Project file error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: BookVoiceError = io_error.into();
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<BookVoiceError>();
        assert_sync::<BookVoiceError>();
    }
}
