//! Background generation jobs.
//!
//! Starting a job validates and reserves the chapter up front, then returns
//! at once with a handle; completion is observed through the handle, the
//! progress hub, or [`JobManager::state`].

use crate::error::{BookVoiceError, Result};
use crate::generation::orchestrator::{BatchSummary, CancelFlag, Generator};
use crate::generation::state::ChapterState;
use crate::project::validate_identifier;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::info;

/// What a finished job produced.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Chapter(PathBuf),
    Book(BatchSummary),
}

/// Handle to an accepted job.
#[derive(Debug)]
pub struct JobHandle {
    id: String,
    cancel: CancelFlag,
    task: JoinHandle<Result<JobOutcome>>,
}

impl JobHandle {
    /// Chapter id, or the batch progress id for book jobs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ask the job to stop at its next segment boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Shared flag for cancelling from another task (e.g. a signal handler).
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> Result<JobOutcome> {
        self.task
            .await
            .map_err(|e| BookVoiceError::Other(format!("Generation task failed: {e}")))?
    }
}

/// Spawns generation runs on the tokio runtime.
#[derive(Debug, Clone)]
pub struct JobManager {
    generator: Generator,
}

impl JobManager {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Start generating one chapter in the background.
    ///
    /// # Errors
    ///
    /// Rejected before spawning when the id is invalid, the chapter is not in
    /// the project or has no analysis, or a run for it is already in flight.
    pub fn start_chapter(&self, chapter_id: &str) -> Result<JobHandle> {
        validate_identifier(chapter_id)?;
        validate_identifier(&self.generator.store().book_id())?;
        if self.generator.store().chapter(chapter_id).is_none() {
            return Err(BookVoiceError::ChapterNotFound {
                chapter_id: chapter_id.to_string(),
            });
        }
        if self.generator.store().chapter_segments(chapter_id).is_none() {
            return Err(BookVoiceError::ChapterNotAnalyzed {
                chapter_id: chapter_id.to_string(),
            });
        }
        let guard = self.generator.reserve(chapter_id)?;

        let cancel = CancelFlag::new();
        let generator = self.generator.clone();
        let flag = cancel.clone();
        let task = tokio::spawn(async move {
            generator
                .generate_reserved(guard, &flag)
                .await
                .map(JobOutcome::Chapter)
        });

        info!(chapter = chapter_id, "generation job accepted");
        Ok(JobHandle {
            id: chapter_id.to_string(),
            cancel,
            task,
        })
    }

    /// Start generating every chapter of the book in the background.
    pub fn start_book(&self) -> Result<JobHandle> {
        validate_identifier(&self.generator.store().book_id())?;

        let cancel = CancelFlag::new();
        let generator = self.generator.clone();
        let flag = cancel.clone();
        let task = tokio::spawn(async move {
            generator.generate_book(&flag).await.map(JobOutcome::Book)
        });

        info!("book generation job accepted");
        Ok(JobHandle {
            id: crate::defaults::BATCH_PROGRESS_ID.to_string(),
            cancel,
            task,
        })
    }

    pub fn state(&self, chapter_id: &str) -> ChapterState {
        self.generator.state(chapter_id)
    }
}
