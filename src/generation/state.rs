use std::fmt;

/// Lifecycle of one chapter generation job.
///
/// `Idle -> Generating -> Merging -> Normalizing -> Complete`, with `Failed`
/// and `Cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChapterState {
    #[default]
    Idle,
    /// Synthesizing segment `segment` (1-based) of `total`.
    Generating { segment: usize, total: usize },
    Merging,
    Normalizing,
    Complete,
    Failed(String),
    Cancelled,
}

impl ChapterState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChapterState::Complete | ChapterState::Failed(_) | ChapterState::Cancelled
        )
    }

    pub fn is_running(&self) -> bool {
        !self.is_terminal() && *self != ChapterState::Idle
    }

    /// Whether moving from `self` to `next` follows the lifecycle.
    ///
    /// A terminal state may restart at `Idle` or `Generating` for a new run.
    pub fn can_transition_to(&self, next: &ChapterState) -> bool {
        use ChapterState::*;

        if matches!(next, Failed(_) | Cancelled) {
            return !self.is_terminal();
        }

        match (self, next) {
            (Idle, Generating { .. }) => true,
            (Generating { segment: a, .. }, Generating { segment: b, .. }) => b >= a,
            (Generating { .. }, Merging) => true,
            (Merging, Normalizing) => true,
            (Merging | Normalizing, Complete) => true,
            (s, Idle | Generating { .. }) if s.is_terminal() => true,
            _ => false,
        }
    }
}

impl fmt::Display for ChapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChapterState::Idle => write!(f, "idle"),
            ChapterState::Generating { segment, total } => {
                write!(f, "generating segment {segment}/{total}")
            }
            ChapterState::Merging => write!(f, "merging"),
            ChapterState::Normalizing => write!(f, "normalizing"),
            ChapterState::Complete => write!(f, "complete"),
            ChapterState::Failed(reason) => write!(f, "failed: {reason}"),
            ChapterState::Cancelled => write!(f, "cancelled"),
        }
    }
}
