use crate::error::{Result, ScribedError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Per-call transcription parameters.
///
/// The scheduler uses two variants of these: single-segment with context
/// disabled for streaming partials, and multi-segment for the final pass
/// over a finished utterance.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    /// Language code (e.g., "en", "de")
    pub language: String,
    /// Translate output to English
    pub translate: bool,
    /// Threads for this inference call
    pub threads: usize,
    /// Force the whole window into a single segment
    pub single_segment: bool,
    /// Do not condition on previous decoder output
    pub no_context: bool,
    /// Suppress timestamp computation
    pub no_timestamps: bool,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            language: crate::defaults::DEFAULT_LANGUAGE.to_string(),
            translate: false,
            threads: crate::defaults::N_THREADS,
            single_segment: true,
            no_context: true,
            no_timestamps: true,
        }
    }
}

/// Trait for speech-to-text transcription.
///
/// One implementor instance corresponds to one loaded inference context;
/// the context pool owns several and hands each session exactly one.
/// This trait allows swapping implementations (real whisper vs mock).
pub trait Transcriber: Send + Sync {
    /// Transcribe audio samples to text.
    ///
    /// # Arguments
    /// * `samples` - Audio as float samples in [-1.0, 1.0] at 16kHz mono
    /// * `options` - Per-call parameters
    ///
    /// # Returns
    /// The text of each decoded segment, in order
    fn transcribe(&self, samples: &[f32], options: &TranscribeOptions) -> Result<Vec<String>>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;
}

/// Implement Transcriber for Arc<T> to allow sharing across owners.
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, samples: &[f32], options: &TranscribeOptions) -> Result<Vec<String>> {
        (**self).transcribe(samples, options)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Mock transcriber for testing
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    response: String,
    should_fail: bool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            should_fail: false,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific segment text
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the mock to sleep before returning, simulating a slow
    /// inference call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of transcribe calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _samples: &[f32], _options: &TranscribeOptions) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.should_fail {
            Err(ScribedError::Inference {
                message: "mock transcription failure".to_string(),
            })
        } else {
            Ok(vec![self.response.clone()])
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_transcriber_returns_response() {
        let transcriber = MockTranscriber::new("test-model").with_response(" hello there ");

        let audio = vec![0.0f32; 1600];
        let segments = transcriber
            .transcribe(&audio, &TranscribeOptions::default())
            .unwrap();

        assert_eq!(segments, vec![" hello there ".to_string()]);
    }

    #[test]
    fn test_mock_transcriber_returns_error_when_configured() {
        let transcriber = MockTranscriber::new("test-model").with_failure();

        let result = transcriber.transcribe(&[0.0; 100], &TranscribeOptions::default());
        match result {
            Err(ScribedError::Inference { message }) => {
                assert_eq!(message, "mock transcription failure");
            }
            _ => panic!("Expected Inference error"),
        }
    }

    #[test]
    fn test_mock_transcriber_counts_calls() {
        let transcriber = MockTranscriber::new("test-model");
        assert_eq!(transcriber.call_count(), 0);

        let _ = transcriber.transcribe(&[0.0; 10], &TranscribeOptions::default());
        let _ = transcriber.transcribe(&[0.0; 10], &TranscribeOptions::default());
        assert_eq!(transcriber.call_count(), 2);
    }

    #[test]
    fn test_mock_transcriber_clone_shares_call_count() {
        let transcriber = MockTranscriber::new("test-model");
        let clone = transcriber.clone();

        let _ = clone.transcribe(&[0.0; 10], &TranscribeOptions::default());
        assert_eq!(transcriber.call_count(), 1);
    }

    #[test]
    fn test_transcriber_trait_is_object_safe() {
        let transcriber: Box<dyn Transcriber> =
            Box::new(MockTranscriber::new("test-model").with_response("boxed"));

        assert_eq!(transcriber.model_name(), "test-model");
        let segments = transcriber
            .transcribe(&[0.0; 10], &TranscribeOptions::default())
            .unwrap();
        assert_eq!(segments, vec!["boxed".to_string()]);
    }

    #[test]
    fn test_arc_transcriber_delegates() {
        let transcriber: Arc<dyn Transcriber> =
            Arc::new(MockTranscriber::new("arc-model").with_response("shared"));

        assert_eq!(transcriber.model_name(), "arc-model");
        let segments = transcriber
            .transcribe(&[0.0; 10], &TranscribeOptions::default())
            .unwrap();
        assert_eq!(segments, vec!["shared".to_string()]);
    }

    #[test]
    fn test_default_options_match_partial_pass() {
        let options = TranscribeOptions::default();
        assert!(options.single_segment);
        assert!(options.no_context);
        assert!(options.no_timestamps);
        assert!(!options.translate);
    }
}
