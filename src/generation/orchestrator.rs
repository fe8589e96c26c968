//! Chapter and whole-book audio generation.
//!
//! A chapter run synthesizes its segments strictly in order into
//! `{temp_dir}/{chapter_id}/{i}.wav`, merges them with the configured
//! silence, optionally normalizes, and writes
//! `{out_dir}/{book_id}/{chapter_id}.wav`. The final file is the only record
//! that a chapter was generated. The temp directory is removed whatever the
//! outcome.

use crate::audio::{merge, normalize_or_fallback};
use crate::config::Config;
use crate::defaults;
use crate::error::{BookVoiceError, Result};
use crate::generation::state::ChapterState;
use crate::generation::voice::{ResolvedVoice, resolve_voice};
use crate::progress::{ProgressHub, ProgressMessage};
use crate::project::{ProjectStore, Segment, validate_identifier};
use crate::synth::{SynthesisRequest, Synthesizer};
use crate::text::split_for_synthesis;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// File-system layout and tuning knobs of a generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub temp_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Silence inserted between segments of a chapter.
    pub merge_silence_ms: u32,
    pub normalize: bool,
    /// Synthesis chunk limit for single-chapter runs.
    pub chapter_max_chars: usize,
    /// Synthesis chunk limit for whole-book runs.
    pub batch_max_chars: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from(defaults::TEMP_DIR),
            out_dir: PathBuf::from(defaults::OUT_DIR),
            merge_silence_ms: defaults::MERGE_SILENCE_MS,
            normalize: defaults::NORMALIZE_AUDIO,
            chapter_max_chars: defaults::CHAPTER_MAX_CHARS,
            batch_max_chars: defaults::BATCH_MAX_CHARS,
        }
    }
}

impl GenerationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temp_dir: config.paths.temp_dir.clone(),
            out_dir: config.paths.out_dir.clone(),
            merge_silence_ms: config.generation.merge_silence_ms,
            normalize: config.generation.normalize_audio,
            chapter_max_chars: config.generation.chapter_max_chars,
            batch_max_chars: config.generation.batch_max_chars,
        }
    }
}

/// Cooperative cancellation, checked between segments and sub-chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome counts of a whole-book run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub generated: usize,
    pub skipped: usize,
    /// Titles of failed chapters, in book order.
    pub failed: Vec<String>,
    /// The run stopped early on a cancel request.
    pub cancelled: bool,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancelled {
            write!(
                f,
                "Cancelled. {} generated, {} skipped, {} failed",
                self.generated,
                self.skipped,
                self.failed.len()
            )
        } else if self.failed.is_empty() {
            write!(
                f,
                "All done! {} generated, {} skipped.",
                self.generated, self.skipped
            )
        } else {
            write!(
                f,
                "Done. {} generated, {} skipped, {} failed: [{}]",
                self.generated,
                self.skipped,
                self.failed.len(),
                self.failed.join(", ")
            )
        }
    }
}

/// Reservation of a chapter for one run; released on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    chapter_id: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl InFlightGuard {
    pub fn chapter_id(&self) -> &str {
        &self.chapter_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.chapter_id);
    }
}

/// Where progress for a run is published and how it is worded.
#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    Chapter,
    Batch {
        title: &'a str,
        index: usize,
        total: usize,
    },
}

impl Scope<'_> {
    fn progress_id<'a>(&self, chapter_id: &'a str) -> &'a str {
        match self {
            Scope::Chapter => chapter_id,
            Scope::Batch { .. } => defaults::BATCH_PROGRESS_ID,
        }
    }

    fn overall(&self) -> usize {
        match *self {
            Scope::Chapter => 0,
            Scope::Batch { index, total, .. } => percent(index, total),
        }
    }

    fn segment(&self, i: usize, n: usize, preview: &str) -> (usize, String) {
        match *self {
            Scope::Chapter => (
                percent(i, n),
                format!("Generating ({}/{n}): {preview}...", i + 1),
            ),
            Scope::Batch {
                title,
                index,
                total,
            } => (
                self.overall(),
                format!("{title} ({}/{total}) Seg {}/{n}: {preview}...", index + 1, i + 1),
            ),
        }
    }

    fn part(&self, i: usize, n: usize, j: usize, m: usize) -> (usize, String) {
        match *self {
            Scope::Chapter => (
                percent(i, n),
                format!("Generating ({}/{n}): Part {}/{m}...", i + 1, j + 1),
            ),
            Scope::Batch { title, total, .. } => (
                self.overall() + percent(i, n) / total.max(1),
                format!("{title} Seg {}/{n} Part {}/{m}", i + 1, j + 1),
            ),
        }
    }
}

fn percent(done: usize, total: usize) -> usize {
    if total == 0 { 0 } else { done * 100 / total }
}

fn progress_percent(value: usize) -> u8 {
    u8::try_from(value.min(100)).unwrap_or(100)
}

fn preview(text: &str) -> String {
    text.chars().take(defaults::PROGRESS_PREVIEW_CHARS).collect()
}

/// Position and context of one segment within a chapter run.
struct SegmentJob<'a> {
    chapter_id: &'a str,
    progress_id: &'a str,
    temp: &'a Path,
    max_chars: usize,
    index: usize,
    total: usize,
    scope: Scope<'a>,
    cancel: &'a CancelFlag,
}

/// Runs chapter and book generation against one project.
///
/// Clones share the project, progress hub, per-chapter states and in-flight
/// reservations.
#[derive(Clone)]
pub struct Generator {
    store: ProjectStore,
    synthesizer: Arc<dyn Synthesizer>,
    hub: ProgressHub,
    settings: Arc<GenerationSettings>,
    states: Arc<Mutex<HashMap<String, ChapterState>>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("synthesizer", &self.synthesizer.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Generator {
    pub fn new(
        store: ProjectStore,
        synthesizer: Arc<dyn Synthesizer>,
        hub: ProgressHub,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            store,
            synthesizer,
            hub,
            settings: Arc::new(settings),
            states: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Final output path of a chapter.
    pub fn output_path(&self, book_id: &str, chapter_id: &str) -> PathBuf {
        self.settings
            .out_dir
            .join(book_id)
            .join(format!("{chapter_id}.wav"))
    }

    fn temp_path(&self, chapter_id: &str) -> PathBuf {
        self.settings.temp_dir.join(chapter_id)
    }

    /// Last known state of a chapter in this process.
    pub fn state(&self, chapter_id: &str) -> ChapterState {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(chapter_id)
            .cloned()
            .unwrap_or_default()
    }

    fn set_state(&self, chapter_id: &str, next: ChapterState) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let current = states.get(chapter_id).cloned().unwrap_or_default();
        if !current.can_transition_to(&next) {
            warn!(chapter = chapter_id, from = %current, to = %next, "unexpected state transition");
        }
        states.insert(chapter_id.to_string(), next);
    }

    pub fn is_in_flight(&self, chapter_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(chapter_id)
    }

    /// Reserve `chapter_id` so no second run can share its temp directory.
    ///
    /// # Errors
    ///
    /// [`BookVoiceError::AlreadyGenerating`] while another run holds it.
    pub fn reserve(&self, chapter_id: &str) -> Result<InFlightGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(chapter_id.to_string()) {
            return Err(BookVoiceError::AlreadyGenerating {
                chapter_id: chapter_id.to_string(),
            });
        }
        drop(in_flight);

        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(chapter_id.to_string(), ChapterState::Idle);

        Ok(InFlightGuard {
            chapter_id: chapter_id.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    fn publish(&self, id: &str, percentage: usize, message: impl Into<String>) {
        self.hub
            .publish(ProgressMessage::progress(id, progress_percent(percentage), message));
    }

    /// Generate one chapter with the single-chapter chunk limit.
    pub async fn generate_chapter(&self, chapter_id: &str, cancel: &CancelFlag) -> Result<PathBuf> {
        validate_identifier(chapter_id)?;
        let guard = self.reserve(chapter_id)?;
        self.generate_reserved(guard, cancel).await
    }

    /// Generate the chapter held by `guard`.
    ///
    /// Progress is published under the chapter id: 0% at start, one message
    /// per segment, then 100% on success or 0% with the error text.
    pub async fn generate_reserved(&self, guard: InFlightGuard, cancel: &CancelFlag) -> Result<PathBuf> {
        let chapter_id = guard.chapter_id().to_string();
        validate_identifier(&chapter_id)?;
        let book_id = self.store.book_id();
        validate_identifier(&book_id)?;

        self.publish(&chapter_id, 0, "Initializing TTS...");

        let result = match self.store.chapter_segments(&chapter_id) {
            Some(segments) => {
                self.run_chapter(
                    &book_id,
                    &chapter_id,
                    &segments,
                    self.settings.chapter_max_chars,
                    Scope::Chapter,
                    cancel,
                )
                .await
            }
            None => Err(BookVoiceError::ChapterNotAnalyzed {
                chapter_id: chapter_id.clone(),
            }),
        };

        self.finish(&chapter_id, &result).await;
        match &result {
            Ok(_) => self.publish(&chapter_id, 100, "Generation Complete!"),
            Err(BookVoiceError::Cancelled { .. }) => self.publish(&chapter_id, 0, "Generation cancelled"),
            Err(e) => self.hub.publish(ProgressMessage::error(&chapter_id, e)),
        }

        drop(guard);
        result
    }

    /// Generate every chapter of the book with the batch chunk limit.
    ///
    /// Chapters whose output already exists are skipped. Chapters without
    /// analysis, or whose run fails, are recorded as failed and the batch
    /// moves on. Progress is published under the batch id.
    pub async fn generate_book(&self, cancel: &CancelFlag) -> Result<BatchSummary> {
        let book_id = self.store.book_id();
        validate_identifier(&book_id)?;

        let chapters = self.store.chapters();
        let total = chapters.len();
        let mut summary = BatchSummary::default();

        for (index, chapter) in chapters.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let title = chapter.display_title();
            let scope = Scope::Batch {
                title: &title,
                index,
                total,
            };
            self.publish(
                defaults::BATCH_PROGRESS_ID,
                scope.overall(),
                format!("Processing {title} ({}/{total})...", index + 1),
            );

            if let Err(e) = validate_identifier(&chapter.id) {
                warn!(chapter = %chapter.id, "skipping chapter: {e}");
                summary.failed.push(title);
                continue;
            }

            let output = self.output_path(&book_id, &chapter.id);
            if tokio::fs::try_exists(&output).await.unwrap_or(false) {
                info!(chapter = %chapter.id, "output already exists, skipping");
                summary.skipped += 1;
                continue;
            }

            let Some(segments) = self.store.chapter_segments(&chapter.id) else {
                info!(chapter = %chapter.id, "no analysis, skipping");
                summary.failed.push(format!("{title} (no analysis)"));
                continue;
            };

            let guard = match self.reserve(&chapter.id) {
                Ok(guard) => guard,
                Err(e) => {
                    warn!(chapter = %chapter.id, "{e}");
                    summary.failed.push(title);
                    continue;
                }
            };

            let result = self
                .run_chapter(
                    &book_id,
                    &chapter.id,
                    &segments,
                    self.settings.batch_max_chars,
                    scope,
                    cancel,
                )
                .await;
            self.finish(&chapter.id, &result).await;
            drop(guard);

            match result {
                Ok(_) => summary.generated += 1,
                Err(BookVoiceError::Cancelled { .. }) => {
                    summary.cancelled = true;
                    break;
                }
                Err(_) => summary.failed.push(title),
            }
        }

        info!(
            generated = summary.generated,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "batch finished"
        );
        self.publish(defaults::BATCH_PROGRESS_ID, 100, summary.to_string());
        Ok(summary)
    }

    /// Record the terminal state and remove the chapter's temp directory.
    async fn finish(&self, chapter_id: &str, result: &Result<PathBuf>) {
        match result {
            Ok(path) => {
                info!(chapter = chapter_id, path = %path.display(), "chapter complete");
                self.set_state(chapter_id, ChapterState::Complete);
            }
            Err(BookVoiceError::Cancelled { .. }) => {
                info!(chapter = chapter_id, "chapter cancelled");
                self.set_state(chapter_id, ChapterState::Cancelled);
            }
            Err(e) => {
                error!(chapter = chapter_id, "chapter generation failed: {e}");
                self.set_state(chapter_id, ChapterState::Failed(e.to_string()));
            }
        }

        let temp = self.temp_path(chapter_id);
        if let Err(e) = tokio::fs::remove_dir_all(&temp).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %temp.display(), "failed to remove temp directory: {e}");
        }
    }

    async fn run_chapter(
        &self,
        book_id: &str,
        chapter_id: &str,
        segments: &[Segment],
        max_chars: usize,
        scope: Scope<'_>,
        cancel: &CancelFlag,
    ) -> Result<PathBuf> {
        let temp = self.temp_path(chapter_id);
        tokio::fs::create_dir_all(&temp).await?;
        let output = self.output_path(book_id, chapter_id);
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let total = segments.len();
        let progress_id = scope.progress_id(chapter_id);
        let mut files = Vec::with_capacity(total);

        for (i, segment) in segments.iter().enumerate() {
            check_cancel(chapter_id, cancel)?;
            self.set_state(
                chapter_id,
                ChapterState::Generating {
                    segment: i + 1,
                    total,
                },
            );

            // Looked up per segment so mapping edits apply to the running job.
            let mapping = self.store.voice_for(&segment.speaker);
            let voice = resolve_voice(segment, mapping.as_ref());

            let (pct, message) = scope.segment(i, total, &preview(&segment.text));
            self.publish(progress_id, pct, message);

            let job = SegmentJob {
                chapter_id,
                progress_id,
                temp: &temp,
                max_chars,
                index: i,
                total,
                scope,
                cancel,
            };
            files.push(self.synthesize_segment(&job, segment, &voice).await?);
        }

        check_cancel(chapter_id, cancel)?;
        self.set_state(chapter_id, ChapterState::Merging);
        self.publish(
            progress_id,
            if matches!(scope, Scope::Chapter) { 95 } else { scope.overall() },
            "Merging Audio Files...",
        );

        if let Err(e) = self.assemble(chapter_id, files, &temp, &output).await {
            if let Err(remove_err) = tokio::fs::remove_file(&output).await
                && remove_err.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %output.display(), "failed to remove partial output: {remove_err}");
            }
            return Err(e);
        }

        Ok(output)
    }

    /// Synthesize one segment into `{temp}/{i}.wav`.
    ///
    /// Text longer than `max_chars` is synthesized per sub-chunk, merged with
    /// no silence and read back, so every segment ends up as one file.
    async fn synthesize_segment(
        &self,
        job: &SegmentJob<'_>,
        segment: &Segment,
        voice: &ResolvedVoice,
    ) -> Result<PathBuf> {
        let i = job.index;
        let text = segment.speakable_text();
        let chunks = split_for_synthesis(text, job.max_chars);
        let segment_path = job.temp.join(format!("{i}.wav"));

        if let [only] = chunks.as_slice() {
            debug!(segment = i, text = %only, "synthesizing segment");
            let audio = self.synthesize(only, voice).await?;
            tokio::fs::write(&segment_path, audio).await?;
            return Ok(segment_path);
        }

        debug!(
            segment = i,
            chars = text.chars().count(),
            parts = chunks.len(),
            "segment split for synthesis"
        );

        let mut parts = Vec::with_capacity(chunks.len());
        for (j, chunk) in chunks.iter().enumerate() {
            if j > 0 {
                check_cancel(job.chapter_id, job.cancel)?;
            }
            let (pct, message) = job.scope.part(i, job.total, j, chunks.len());
            self.publish(job.progress_id, pct, message);

            let audio = self.synthesize(chunk, voice).await?;
            let part_path = job.temp.join(format!("{i}_part_{j}.wav"));
            tokio::fs::write(&part_path, audio).await?;
            parts.push(part_path);
        }

        let merged_path = job.temp.join(format!("{i}_merged.wav"));
        {
            let parts = parts.clone();
            let merged_path = merged_path.clone();
            run_blocking(move || merge(&parts, &merged_path, 0).map(|_| ())).await?;
        }

        let data = tokio::fs::read(&merged_path).await?;
        for path in parts.iter().chain(std::iter::once(&merged_path)) {
            tokio::fs::remove_file(path).await?;
        }
        tokio::fs::write(&segment_path, data).await?;

        Ok(segment_path)
    }

    async fn synthesize(&self, text: &str, voice: &ResolvedVoice) -> Result<Vec<u8>> {
        let request = SynthesisRequest {
            speed: voice.speed,
            ..SynthesisRequest::new(text, &voice.voice_ref, voice.emotion)
        };
        self.synthesizer.synthesize(&request).await
    }

    /// Merge segment files into the chapter output, normalizing if enabled.
    async fn assemble(
        &self,
        chapter_id: &str,
        files: Vec<PathBuf>,
        temp: &Path,
        output: &Path,
    ) -> Result<()> {
        let silence = self.settings.merge_silence_ms;

        if !self.settings.normalize {
            let output = output.to_path_buf();
            let summary = run_blocking(move || merge(&files, &output, silence)).await?;
            debug!(chapter = chapter_id, bytes = summary.data_bytes, "chapter merged");
            return Ok(());
        }

        let merged = temp.join("chapter_merged.wav");
        {
            let merged = merged.clone();
            let summary = run_blocking(move || merge(&files, &merged, silence)).await?;
            debug!(chapter = chapter_id, bytes = summary.data_bytes, "chapter merged");
        }

        self.set_state(chapter_id, ChapterState::Normalizing);
        let output = output.to_path_buf();
        let normalized = run_blocking(move || normalize_or_fallback(&merged, &output)).await?;
        if !normalized {
            warn!(chapter = chapter_id, "chapter written without normalization");
        }
        Ok(())
    }
}

fn check_cancel(chapter_id: &str, cancel: &CancelFlag) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(BookVoiceError::Cancelled {
            chapter_id: chapter_id.to_string(),
        });
    }
    Ok(())
}

/// Run blocking file work off the async executor.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BookVoiceError::Other(format!("Audio task failed: {e}")))?
}
