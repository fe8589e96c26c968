use crate::error::{BookVoiceError, Result};
use crate::project::Emotion;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Parameters of one synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    /// Voice reference: a local file path or a backend-side identifier.
    pub voice: String,
    pub emotion: Emotion,
    /// Playback speed multiplier; 1.0 leaves the audio untouched.
    pub speed: f32,
}

impl SynthesisRequest {
    pub fn new(text: &str, voice: &str, emotion: Emotion) -> Self {
        Self {
            text: text.to_string(),
            voice: voice.to_string(),
            emotion,
            speed: 1.0,
        }
    }
}

/// Trait for text-to-speech backends.
///
/// Implementations return the raw bytes of a complete WAV file.
#[async_trait::async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

#[async_trait::async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        (**self).synthesize(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Offline synthesizer producing a short tone per request.
///
/// Output is 16-bit mono PCM whose length grows with the text length, so
/// merged chapters have predictable sizes. Clones share the request log.
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    sample_rate: u32,
    samples_per_char: usize,
    amplitude: i16,
    fail_on_call: Option<usize>,
    fail_marker: Option<String>,
    requests: Arc<Mutex<Vec<SynthesisRequest>>>,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            sample_rate: 22050,
            samples_per_char: 100,
            amplitude: 8000,
            fail_on_call: None,
            fail_marker: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_samples_per_char(mut self, samples: usize) -> Self {
        self.samples_per_char = samples.max(1);
        self
    }

    pub fn with_amplitude(mut self, amplitude: i16) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Fail the `n`-th call (1-based).
    pub fn with_failure_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    /// Fail every request whose text contains `marker`.
    pub fn with_failure_on_text(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    /// Requests received so far, failed ones included.
    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SynthesisRequest>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn render(&self, text: &str) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let len = text.chars().count().max(1) * self.samples_per_char;

        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
        for i in 0..len {
            // Square wave with a 32-sample period.
            let sample = if (i / 16) % 2 == 0 {
                self.amplitude
            } else {
                self.amplitude.saturating_neg()
            };
            writer.write_sample(sample).map_err(wav_error)?;
        }
        writer.finalize().map_err(wav_error)?;

        Ok(cursor.into_inner())
    }
}

fn wav_error(e: hound::Error) -> BookVoiceError {
    BookVoiceError::Synthesis {
        message: format!("Mock WAV encoding failed: {e}"),
    }
}

#[async_trait::async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        let call = {
            let mut requests = self.lock();
            requests.push(request.clone());
            requests.len()
        };

        if self.fail_on_call == Some(call) {
            return Err(BookVoiceError::Synthesis {
                message: format!("mock synthesis failure on call {call}"),
            });
        }
        if let Some(marker) = &self.fail_marker
            && request.text.contains(marker.as_str())
        {
            return Err(BookVoiceError::Synthesis {
                message: format!("mock synthesis failure for text {:?}", request.text),
            });
        }

        self.render(&request.text)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
