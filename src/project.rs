//! Project state: chapters, analysis segments and speaker voice mappings.
//!
//! The state is owned by a [`ProjectStore`] handle shared between the job
//! runner and its callers. Every accessor copies the requested data out and
//! releases the lock before returning, so no guard can be held across a
//! synthesis call.

use crate::defaults;
use crate::error::{BookVoiceError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Emotion passed to the synthesizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Angry,
    Sad,
    Afraid,
    Disgusted,
    Melancholic,
    Surprised,
    #[default]
    Calm,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Happy,
        Emotion::Angry,
        Emotion::Sad,
        Emotion::Afraid,
        Emotion::Disgusted,
        Emotion::Melancholic,
        Emotion::Surprised,
        Emotion::Calm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Angry => "angry",
            Emotion::Sad => "sad",
            Emotion::Afraid => "afraid",
            Emotion::Disgusted => "disgusted",
            Emotion::Melancholic => "melancholic",
            Emotion::Surprised => "surprised",
            Emotion::Calm => "calm",
        }
    }

    /// Position in the synthesizer's emotion vector.
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|e| e == self).unwrap_or(7)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = BookVoiceError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| BookVoiceError::Other(format!("Unknown emotion: {s:?}")))
    }
}

/// Accept unknown or empty emotion labels from the analysis backend as "none".
fn lenient_emotion<'de, D>(deserializer: D) -> std::result::Result<Option<Emotion>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

/// One attributed span of chapter text, in narrative order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub text: String,
    /// Optional override of `text` for synthesis (e.g. with pronunciation hints).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub typesetting: String,
    #[serde(default)]
    pub speaker: String,
    #[serde(default, deserialize_with = "lenient_emotion")]
    pub emotion: Option<Emotion>,
}

impl Segment {
    pub fn new(text: &str, speaker: &str, emotion: Option<Emotion>) -> Self {
        Self {
            text: text.to_string(),
            typesetting: String::new(),
            speaker: speaker.to_string(),
            emotion,
        }
    }

    /// Text handed to the synthesizer: the typesetting override when present.
    pub fn speakable_text(&self) -> &str {
        if self.typesetting.is_empty() {
            &self.text
        } else {
            &self.typesetting
        }
    }
}

/// Synthesis parameters for one speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VoiceConfig {
    pub voice_ref: String,
    #[serde(deserialize_with = "lenient_emotion")]
    pub default_emotion: Option<Emotion>,
    pub use_analysis_emotion: bool,
    pub speed: f32,
    pub reference_audio_path: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_ref: String::new(),
            default_emotion: None,
            use_analysis_emotion: true,
            speed: 1.0,
            reference_audio_path: String::new(),
        }
    }
}

/// A chapter of the loaded book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

impl Chapter {
    /// Title for user-facing messages.
    pub fn display_title(&self) -> String {
        if self.title.is_empty() {
            format!("Chapter {}", self.id)
        } else {
            self.title.clone()
        }
    }
}

/// Persisted project state of one book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectState {
    pub book_id: String,
    pub chapters: Vec<Chapter>,
    /// Chapter id to analysis segments.
    pub analysis: HashMap<String, Vec<Segment>>,
    /// Speaker name to voice configuration.
    pub voice_mapping: HashMap<String, VoiceConfig>,
}

/// Reject identifiers that would escape their directory when used in a path.
pub fn validate_identifier(value: &str) -> Result<()> {
    let reason = if value.is_empty() {
        Some("is empty")
    } else if value == "." || value == ".." {
        Some("is a relative path component")
    } else if value.contains(['/', '\\']) {
        Some("contains a path separator")
    } else if value.contains('\0') {
        Some("contains a NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(BookVoiceError::InvalidIdentifier {
            value: value.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Shared handle to the project state behind a single readers-writer lock.
#[derive(Debug, Clone, Default)]
pub struct ProjectStore {
    inner: Arc<RwLock<ProjectState>>,
}

impl ProjectStore {
    pub fn new(state: ProjectState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Load a project from its JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let state: ProjectState = serde_json::from_str(&contents)?;
        Ok(Self::new(state))
    }

    /// Write the project to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&*self.read())?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    // A panic while holding the lock cannot leave the plain data half-updated
    // in a way readers care about, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, ProjectState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ProjectState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn book_id(&self) -> String {
        self.read().book_id.clone()
    }

    pub fn chapters(&self) -> Vec<Chapter> {
        self.read().chapters.clone()
    }

    pub fn chapter(&self, chapter_id: &str) -> Option<Chapter> {
        self.read()
            .chapters
            .iter()
            .find(|c| c.id == chapter_id)
            .cloned()
    }

    /// Copy of the chapter's segments; `None` when it has not been analyzed.
    pub fn chapter_segments(&self, chapter_id: &str) -> Option<Vec<Segment>> {
        self.read()
            .analysis
            .get(chapter_id)
            .filter(|segments| !segments.is_empty())
            .cloned()
    }

    /// Current voice mapping for `speaker`, looked up at generation time.
    pub fn voice_for(&self, speaker: &str) -> Option<VoiceConfig> {
        self.read().voice_mapping.get(speaker).cloned()
    }

    pub fn set_analysis(&self, chapter_id: &str, segments: Vec<Segment>) {
        self.write()
            .analysis
            .insert(chapter_id.to_string(), segments);
    }

    pub fn set_voice(&self, speaker: &str, voice: VoiceConfig) {
        self.write()
            .voice_mapping
            .insert(speaker.to_string(), voice);
    }

    /// Snapshot of the whole state.
    pub fn snapshot(&self) -> ProjectState {
        self.read().clone()
    }

    /// Apply `update` to the state under the write lock.
    pub fn update<T>(&self, update: impl FnOnce(&mut ProjectState) -> T) -> T {
        update(&mut self.write())
    }
}

/// Emotion of last resort when neither analysis nor mapping has one.
pub fn fallback_emotion() -> Emotion {
    defaults::DEFAULT_EMOTION.parse().unwrap_or_default()
}
