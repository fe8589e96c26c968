//! Chapter and book generation against the mock synthesizer, driven through
//! a project file the way the binary loads it.

use bookvoice::BookVoiceError;
use bookvoice::audio::read_format;
use bookvoice::generation::{
    CancelFlag, ChapterState, GenerationSettings, Generator, JobManager, JobOutcome,
};
use bookvoice::progress::{ProgressHub, ProgressMessage};
use bookvoice::project::ProjectStore;
use bookvoice::synth::MockSynthesizer;
use crossbeam_channel::Receiver;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const PROJECT_JSON: &str = r#"{
  "bookId": "novel",
  "chapters": [
    { "id": "ch1", "title": "Opening" },
    { "id": "ch2", "title": "" },
    { "id": "ch3", "title": "Unread" }
  ],
  "analysis": {
    "ch1": [
      { "text": "一つ目。", "speaker": "Narrator", "emotion": "calm" },
      { "text": "二つ目！", "speaker": "Aki", "emotion": "happy" },
      { "text": "三つ目？", "speaker": "Aki", "emotion": "nonsense" },
      { "text": "四つ目。", "speaker": "Narrator" },
      { "text": "五つ目。", "speaker": "Ren", "emotion": "sad" }
    ],
    "ch2": [
      { "text": "短い。", "speaker": "Narrator" }
    ]
  },
  "voiceMapping": {
    "Aki": { "voiceRef": "voices/aki.wav", "defaultEmotion": "angry", "useAnalysisEmotion": false, "speed": 1.25 }
  }
}"#;

fn load_project(dir: &TempDir) -> ProjectStore {
    let path = dir.path().join("novel.json");
    std::fs::write(&path, PROJECT_JSON).unwrap();
    ProjectStore::load(&path).unwrap()
}

fn settings(dir: &TempDir, normalize: bool) -> GenerationSettings {
    GenerationSettings {
        temp_dir: dir.path().join("temp"),
        out_dir: dir.path().join("out"),
        merge_silence_ms: 100,
        normalize,
        chapter_max_chars: 20,
        batch_max_chars: 100,
    }
}

fn generator(dir: &TempDir, synth: &MockSynthesizer, normalize: bool) -> Generator {
    Generator::new(
        load_project(dir),
        Arc::new(synth.clone()),
        ProgressHub::new(256),
        settings(dir, normalize),
    )
}

fn drain(receiver: &Receiver<ProgressMessage>) -> Vec<ProgressMessage> {
    receiver.try_iter().collect()
}

fn data_size(path: &Path) -> u32 {
    read_format(&mut File::open(path).unwrap()).unwrap().data_size
}

#[tokio::test]
async fn chapter_is_merged_with_silence_between_segments() {
    let dir = TempDir::new().unwrap();
    let synth = MockSynthesizer::new().with_samples_per_char(50);
    let generator = generator(&dir, &synth, false);

    let output = generator
        .generate_chapter("ch1", &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(output, dir.path().join("out").join("novel").join("ch1.wav"));
    // Four chars per segment at 50 samples each, plus four 100 ms gaps at 22050 Hz.
    let expected = 5 * 4 * 50 * 2 + 4 * 2205 * 2;
    assert_eq!(data_size(&output), expected);
    assert_eq!(generator.state("ch1"), ChapterState::Complete);
    assert!(!dir.path().join("temp").join("ch1").exists());
}

#[tokio::test]
async fn voices_and_emotions_follow_the_mapping() {
    let dir = TempDir::new().unwrap();
    let synth = MockSynthesizer::new();
    let generator = generator(&dir, &synth, true);

    generator
        .generate_chapter("ch1", &CancelFlag::new())
        .await
        .unwrap();

    let requests = synth.requests();
    assert_eq!(requests.len(), 5);

    // Unmapped speakers keep the analysis emotion with the default voice.
    assert_eq!(requests[0].voice, "");
    assert_eq!(requests[0].emotion.as_str(), "calm");
    assert_eq!(requests[4].emotion.as_str(), "sad");

    // Aki ignores analysis emotions and uses the mapped default.
    assert_eq!(requests[1].voice, "voices/aki.wav");
    assert_eq!(requests[1].emotion.as_str(), "angry");
    assert_eq!(requests[2].emotion.as_str(), "angry");
    assert!((requests[1].speed - 1.25).abs() < f32::EPSILON);
}

#[tokio::test]
async fn failing_segment_fails_the_chapter_without_output() {
    let dir = TempDir::new().unwrap();
    let synth = MockSynthesizer::new().with_failure_on_call(3);
    let generator = generator(&dir, &synth, true);
    let progress = generator.hub().subscribe();

    let result = generator.generate_chapter("ch1", &CancelFlag::new()).await;

    assert!(matches!(result, Err(BookVoiceError::Synthesis { .. })));
    assert_eq!(synth.call_count(), 3);
    assert!(matches!(generator.state("ch1"), ChapterState::Failed(_)));
    assert!(!generator.output_path("novel", "ch1").exists());
    assert!(!dir.path().join("temp").join("ch1").exists());

    let messages = drain(&progress);
    let last = messages.last().unwrap();
    assert_eq!(last.chapter_id, "ch1");
    assert_eq!(last.percentage, 0);
    assert!(last.message.starts_with("Error: "), "{}", last.message);
    assert!(
        last.message.contains("mock synthesis failure on call 3"),
        "{}",
        last.message
    );
    assert!(!messages.iter().any(|m| m.percentage == 100));
}

#[tokio::test]
async fn long_segment_is_synthesized_in_parts() {
    let dir = TempDir::new().unwrap();
    let synth = MockSynthesizer::new().with_samples_per_char(10);
    let store = load_project(&dir);
    store.set_analysis(
        "ch2",
        vec![bookvoice::Segment::new(
            "あいうえおかきくけこ。さしすせそたちつてと。なにぬねの。",
            "Narrator",
            None,
        )],
    );
    let generator = Generator::new(
        store,
        Arc::new(synth.clone()),
        ProgressHub::new(256),
        GenerationSettings {
            chapter_max_chars: 12,
            ..settings(&dir, false)
        },
    );
    let progress = generator.hub().subscribe();

    let output = generator
        .generate_chapter("ch2", &CancelFlag::new())
        .await
        .unwrap();

    let texts: Vec<String> = synth.requests().into_iter().map(|r| r.text).collect();
    assert_eq!(
        texts,
        vec!["あいうえおかきくけこ。", "さしすせそたちつてと。", "なにぬねの。"]
    );
    // Parts are joined without silence: 28 chars at 10 samples each.
    assert_eq!(data_size(&output), 28 * 10 * 2);
    assert!(
        drain(&progress)
            .iter()
            .any(|m| m.message.contains("Part 2/3"))
    );
}

#[tokio::test]
async fn cancelled_chapter_stops_before_synthesis() {
    let dir = TempDir::new().unwrap();
    let synth = MockSynthesizer::new();
    let generator = generator(&dir, &synth, true);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let result = generator.generate_chapter("ch1", &cancel).await;

    assert!(matches!(result, Err(BookVoiceError::Cancelled { .. })));
    assert_eq!(synth.call_count(), 0);
    assert_eq!(generator.state("ch1"), ChapterState::Cancelled);
}

#[tokio::test]
async fn book_run_skips_existing_output_and_reports_missing_analysis() {
    let dir = TempDir::new().unwrap();
    let synth = MockSynthesizer::new();
    let generator = generator(&dir, &synth, true);

    let existing = generator.output_path("novel", "ch1");
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, b"already here").unwrap();
    let progress = generator.hub().subscribe();

    let summary = generator.generate_book(&CancelFlag::new()).await.unwrap();

    assert_eq!(summary.generated, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, vec!["Unread (no analysis)".to_string()]);
    assert_eq!(std::fs::read(&existing).unwrap(), b"already here");
    assert!(generator.output_path("novel", "ch2").exists());

    let messages = drain(&progress);
    assert!(messages.iter().all(|m| m.chapter_id == "batch-generate"));
    assert!(
        messages
            .iter()
            .any(|m| m.message == "Processing Chapter ch2 (2/3)...")
    );
    let last = messages.last().unwrap();
    assert_eq!(last.percentage, 100);
    assert_eq!(last.message, summary.to_string());
}

#[tokio::test]
async fn book_run_continues_past_a_failing_chapter() {
    let dir = TempDir::new().unwrap();
    let synth = MockSynthesizer::new().with_failure_on_text("三つ目");
    let store = load_project(&dir);
    store.update(|state| state.chapters.truncate(2));
    let generator = Generator::new(
        store,
        Arc::new(synth.clone()),
        ProgressHub::new(256),
        settings(&dir, true),
    );

    let summary = generator.generate_book(&CancelFlag::new()).await.unwrap();

    assert_eq!(summary.generated, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, vec!["Opening".to_string()]);
    assert!(!summary.cancelled);
    assert!(matches!(generator.state("ch1"), ChapterState::Failed(_)));
    assert!(!generator.output_path("novel", "ch1").exists());
    assert!(!dir.path().join("temp").join("ch1").exists());
    assert!(generator.output_path("novel", "ch2").exists());
    assert_eq!(generator.state("ch2"), ChapterState::Complete);
    // ch1 stops at its third segment; ch2 has one.
    assert_eq!(synth.call_count(), 4);
}

#[tokio::test]
async fn job_manager_rejects_duplicate_runs() {
    let dir = TempDir::new().unwrap();
    let synth = MockSynthesizer::new();
    let manager = JobManager::new(generator(&dir, &synth, false));

    let first = manager.start_chapter("ch1").unwrap();
    let second = manager.start_chapter("ch1");
    assert!(matches!(second, Err(BookVoiceError::AlreadyGenerating { .. })));

    let outcome = first.wait().await.unwrap();
    assert!(matches!(outcome, JobOutcome::Chapter(_)));

    // The reservation is released once the job ends.
    let again = manager.start_chapter("ch1").unwrap();
    again.wait().await.unwrap();
}

#[tokio::test]
async fn job_manager_rejects_unanalyzed_and_invalid_chapters() {
    let dir = TempDir::new().unwrap();
    let synth = MockSynthesizer::new();
    let manager = JobManager::new(generator(&dir, &synth, false));

    assert!(matches!(
        manager.start_chapter("ch3"),
        Err(BookVoiceError::ChapterNotAnalyzed { .. })
    ));
    assert!(matches!(
        manager.start_chapter("../ch1"),
        Err(BookVoiceError::InvalidIdentifier { .. })
    ));
    assert_eq!(synth.call_count(), 0);
}
