//! Speech synthesis backends.

#[cfg(feature = "index-tts")]
pub mod index_tts;
pub mod synthesizer;

#[cfg(feature = "index-tts")]
pub use index_tts::IndexTtsClient;
pub use synthesizer::{MockSynthesizer, SynthesisRequest, Synthesizer};
