//! Text splitting for the analysis and synthesis backends.

pub mod chunker;

pub use chunker::{split_for_analysis, split_for_synthesis};
