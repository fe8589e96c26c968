//! Text analysis: speaker attribution and voice assignment.
//!
//! Analysis backends turn a chunk of chapter text into ordered segments.
//! Long chapters are split with [`split_for_analysis`] first so each chunk
//! fits the backend's context.

use crate::error::{BookVoiceError, Result};
use crate::project::{Emotion, ProjectStore, Segment, VoiceConfig};
use crate::text::split_for_analysis;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Speaker used for text without an attributed character.
pub const NARRATOR: &str = "Narrator";

/// Extensions recognised as voice reference files.
const VOICE_EXTENSIONS: [&str; 4] = ["wav", "mp3", "ogg", "flac"];

/// Trait for text analysis backends.
#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    /// Split `chunk` into speaker-attributed segments, in reading order.
    async fn analyze(&self, chunk: &str) -> Result<Vec<Segment>>;

    fn name(&self) -> &str;
}

/// Offline analyzer: one segment per non-empty paragraph.
///
/// A paragraph of the form `Name: words` is attributed to `Name`; anything
/// else goes to the narrator. An optional `[emotion]` prefix after the colon
/// sets the segment emotion, e.g. `Ann: [happy] Hello!`.
#[derive(Debug, Clone, Default)]
pub struct MockAnalyzer {
    should_fail: bool,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail on analyze.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    fn parse_paragraph(paragraph: &str) -> Segment {
        let Some((speaker, rest)) = paragraph.split_once(':') else {
            return Segment::new(paragraph, NARRATOR, None);
        };
        let speaker = speaker.trim();
        if speaker.is_empty() || speaker.chars().any(char::is_whitespace) {
            return Segment::new(paragraph, NARRATOR, None);
        }

        let rest = rest.trim_start();
        if let Some(tagged) = rest.strip_prefix('[')
            && let Some((label, text)) = tagged.split_once(']')
            && let Ok(emotion) = label.parse::<Emotion>()
        {
            return Segment::new(text.trim_start(), speaker, Some(emotion));
        }
        Segment::new(rest, speaker, None)
    }
}

#[async_trait::async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, chunk: &str) -> Result<Vec<Segment>> {
        if self.should_fail {
            return Err(BookVoiceError::Analysis {
                message: "mock analysis failure".to_string(),
            });
        }

        Ok(chunk
            .split('\n')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Self::parse_paragraph)
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Analyze `text` chunk by chunk and concatenate the segments in order.
///
/// # Errors
///
/// The first chunk failure aborts the whole call; partial results are
/// discarded so a retry starts clean.
pub async fn analyze_text(
    analyzer: &dyn Analyzer,
    text: &str,
    chunk_size: usize,
) -> Result<Vec<Segment>> {
    let chunks = split_for_analysis(text, chunk_size);
    debug!(chunks = chunks.len(), limit = chunk_size, "split text for analysis");

    let mut segments = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let results = analyzer.analyze(chunk).await.map_err(|e| BookVoiceError::Analysis {
            message: format!("Analysis failed at chunk {}: {e}", i + 1),
        })?;
        segments.extend(results);
    }

    Ok(segments)
}

/// Analyze a chapter and store the result, assigning voices to new speakers.
///
/// Existing analysis is kept and returned unless `force` is set.
pub async fn analyze_chapter(
    analyzer: &dyn Analyzer,
    store: &ProjectStore,
    chapter_id: &str,
    text: &str,
    chunk_size: usize,
    voices: &[PathBuf],
    force: bool,
) -> Result<Vec<Segment>> {
    if !force && let Some(existing) = store.chapter_segments(chapter_id) {
        info!(chapter = chapter_id, "using cached analysis");
        return Ok(existing);
    }

    let segments = analyze_text(analyzer, text, chunk_size).await?;
    info!(
        chapter = chapter_id,
        segments = segments.len(),
        backend = analyzer.name(),
        "chapter analyzed"
    );

    store.set_analysis(chapter_id, segments.clone());
    assign_voices(store, &segments, voices);

    Ok(segments)
}

/// Voice reference files in `dir`, sorted by path.
pub fn list_voices(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut voices = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let known = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| VOICE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if known {
            voices.push(path);
        }
    }
    voices.sort();
    Ok(voices)
}

/// Give every speaker in `segments` without a voice the next voice, round-robin.
///
/// Returns the number of speakers that received a voice.
pub fn assign_voices(store: &ProjectStore, segments: &[Segment], voices: &[PathBuf]) -> usize {
    if voices.is_empty() {
        warn!("no voices available for automatic assignment");
        return 0;
    }

    store.update(|state| {
        let mut next = 0;
        for segment in segments {
            if segment.speaker.is_empty() {
                continue;
            }
            let needs_voice = state
                .voice_mapping
                .get(&segment.speaker)
                .is_none_or(|v| v.voice_ref.is_empty());
            if !needs_voice {
                continue;
            }

            let voice = &voices[next % voices.len()];
            next += 1;
            debug!(speaker = %segment.speaker, voice = %voice.display(), "auto-assigned voice");
            state.voice_mapping.insert(
                segment.speaker.clone(),
                VoiceConfig {
                    voice_ref: voice.to_string_lossy().into_owned(),
                    default_emotion: Some(Emotion::Calm),
                    use_analysis_emotion: true,
                    ..Default::default()
                },
            );
        }
        next
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_mock_attributes_speakers() {
        let segments = MockAnalyzer::new()
            .analyze("It was late.\nAnn: [happy] Hello there!\nBob: Hi.")
            .await
            .unwrap();

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].speaker, NARRATOR);
        assert_eq!(segments[1].speaker, "Ann");
        assert_eq!(segments[1].text, "Hello there!");
        assert_eq!(segments[1].emotion, Some(Emotion::Happy));
        assert_eq!(segments[2].speaker, "Bob");
        assert_eq!(segments[2].emotion, None);
    }

    #[tokio::test]
    async fn test_mock_keeps_colons_in_narration() {
        let segments = MockAnalyzer::new()
            .analyze("He said this: nothing.")
            .await
            .unwrap();
        assert_eq!(segments[0].speaker, NARRATOR);
        assert_eq!(segments[0].text, "He said this: nothing.");
    }

    #[tokio::test]
    async fn test_analyze_text_concatenates_chunks_in_order() {
        let text = "one\n\ntwo\n\nthree\n\nfour";
        let segments = analyze_text(&MockAnalyzer::new(), text, 8).await.unwrap();
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three", "four"]);
    }

    #[tokio::test]
    async fn test_analyze_text_reports_failing_chunk() {
        let err = analyze_text(&MockAnalyzer::new().with_failure(), "text", 100)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chunk 1"));
    }

    #[tokio::test]
    async fn test_analyze_chapter_uses_cache_unless_forced() {
        let store = ProjectStore::default();
        store.set_analysis("c1", vec![Segment::new("cached", NARRATOR, None)]);

        let cached = analyze_chapter(&MockAnalyzer::new(), &store, "c1", "fresh", 800, &[], false)
            .await
            .unwrap();
        assert_eq!(cached[0].text, "cached");

        let fresh = analyze_chapter(&MockAnalyzer::new(), &store, "c1", "fresh", 800, &[], true)
            .await
            .unwrap();
        assert_eq!(fresh[0].text, "fresh");
        assert_eq!(store.chapter_segments("c1").unwrap()[0].text, "fresh");
    }

    #[test]
    fn test_list_voices_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["b.wav", "a.WAV", "c.mp3", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.wav")).unwrap();

        let voices = list_voices(dir.path()).unwrap();
        let names: Vec<String> = voices
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.WAV", "b.wav", "c.mp3"]);
    }

    #[test]
    fn test_list_voices_missing_dir_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(list_voices(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_assign_voices_round_robin_keeps_existing() {
        let store = ProjectStore::default();
        store.set_voice(
            "Ann",
            VoiceConfig {
                voice_ref: "mine.wav".to_string(),
                ..Default::default()
            },
        );
        let segments = vec![
            Segment::new("a", "Ann", None),
            Segment::new("b", "Bob", None),
            Segment::new("c", "Cid", None),
            Segment::new("d", "Dee", None),
            Segment::new("e", "Bob", None),
        ];
        let voices = vec![PathBuf::from("v1.wav"), PathBuf::from("v2.wav")];

        let assigned = assign_voices(&store, &segments, &voices);

        assert_eq!(assigned, 3);
        assert_eq!(store.voice_for("Ann").unwrap().voice_ref, "mine.wav");
        assert_eq!(store.voice_for("Bob").unwrap().voice_ref, "v1.wav");
        assert_eq!(store.voice_for("Cid").unwrap().voice_ref, "v2.wav");
        assert_eq!(store.voice_for("Dee").unwrap().voice_ref, "v1.wav");
        assert_eq!(
            store.voice_for("Bob").unwrap().default_emotion,
            Some(Emotion::Calm)
        );
    }

    #[test]
    fn test_assign_voices_without_voices_is_noop() {
        let store = ProjectStore::default();
        let segments = vec![Segment::new("a", "Ann", None)];
        assert_eq!(assign_voices(&store, &segments, &[]), 0);
        assert_eq!(store.voice_for("Ann"), None);
    }
}
