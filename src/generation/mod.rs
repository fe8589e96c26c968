//! Chapter generation: voice resolution, job state and orchestration.

pub mod jobs;
pub mod orchestrator;
pub mod state;
pub mod voice;

pub use jobs::{JobHandle, JobManager, JobOutcome};
pub use orchestrator::{
    BatchSummary, CancelFlag, GenerationSettings, Generator, InFlightGuard,
};
pub use state::ChapterState;
pub use voice::{ResolvedVoice, resolve_voice};
