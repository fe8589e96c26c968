use crate::defaults;
use crate::error::{BookVoiceError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub generation: GenerationConfig,
    pub analysis: AnalysisConfig,
    pub tts: TtsConfig,
    pub progress: ProgressConfig,
}

/// Where project data, scratch files, output and voices live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub out_dir: PathBuf,
    pub voice_dir: PathBuf,
}

/// Chapter assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub merge_silence_ms: u32,
    pub normalize_audio: bool,
    pub chapter_max_chars: usize,
    pub batch_max_chars: usize,
}

/// Text analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub chunk_size: usize,
}

/// Speech synthesis backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub backend: TtsBackend,
    pub url: String,
    pub default_voice: String,
}

/// Progress reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProgressConfig {
    pub subscriber_buffer: usize,
}

/// Synthesis backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TtsBackend {
    #[default]
    IndexTts,
    Mock,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
            temp_dir: PathBuf::from(defaults::TEMP_DIR),
            out_dir: PathBuf::from(defaults::OUT_DIR),
            voice_dir: PathBuf::from(defaults::VOICE_DIR),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            merge_silence_ms: defaults::MERGE_SILENCE_MS,
            normalize_audio: defaults::NORMALIZE_AUDIO,
            chapter_max_chars: defaults::CHAPTER_MAX_CHARS,
            batch_max_chars: defaults::BATCH_MAX_CHARS,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chunk_size: defaults::ANALYSIS_CHUNK_SIZE,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: TtsBackend::default(),
            url: defaults::TTS_URL.to_string(),
            default_voice: defaults::DEFAULT_VOICE.to_string(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: defaults::PROGRESS_BUFFER,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BookVoiceError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                BookVoiceError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(BookVoiceError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - BOOKVOICE_TTS_URL → tts.url
    /// - BOOKVOICE_DATA_DIR → paths.data_dir, with temp and out dirs beneath it
    /// - BOOKVOICE_MERGE_SILENCE_MS → generation.merge_silence_ms
    /// - BOOKVOICE_NORMALIZE → generation.normalize_audio
    ///
    /// Values that fail to parse are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("BOOKVOICE_TTS_URL")
            && !url.is_empty()
        {
            self.tts.url = url;
        }

        if let Ok(dir) = std::env::var("BOOKVOICE_DATA_DIR")
            && !dir.is_empty()
        {
            let dir = PathBuf::from(dir);
            self.paths.temp_dir = dir.join("temp");
            self.paths.out_dir = dir.join("out");
            self.paths.data_dir = dir;
        }

        if let Ok(ms) = std::env::var("BOOKVOICE_MERGE_SILENCE_MS")
            && let Ok(ms) = ms.trim().parse()
        {
            self.generation.merge_silence_ms = ms;
        }

        if let Ok(flag) = std::env::var("BOOKVOICE_NORMALIZE")
            && let Some(flag) = parse_bool(&flag)
        {
            self.generation.normalize_audio = flag;
        }

        self
    }

    /// Check values that would make generation misbehave
    pub fn validate(&self) -> Result<()> {
        if self.generation.chapter_max_chars == 0 {
            return Err(invalid("generation.chapter_max_chars", "must be at least 1"));
        }
        if self.generation.batch_max_chars == 0 {
            return Err(invalid("generation.batch_max_chars", "must be at least 1"));
        }
        if self.analysis.chunk_size < 2 {
            return Err(invalid("analysis.chunk_size", "must be at least 2"));
        }
        if self.progress.subscriber_buffer == 0 {
            return Err(invalid("progress.subscriber_buffer", "must be at least 1"));
        }
        if self.tts.backend == TtsBackend::IndexTts
            && !(self.tts.url.starts_with("http://") || self.tts.url.starts_with("https://"))
        {
            return Err(invalid("tts.url", "must start with http:// or https://"));
        }
        Ok(())
    }

    /// Write the configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| BookVoiceError::ConfigParse {
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/bookvoice/config.toml on Linux, or a path relative
    /// to the working directory when no config directory is known.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bookvoice")
            .join("config.toml")
    }
}

fn invalid(key: &str, message: &str) -> BookVoiceError {
    BookVoiceError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
