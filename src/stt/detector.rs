use crate::error::{Result, ScribedError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Trait for voice-activity detection.
///
/// A detector reports the probability that a short audio window contains
/// speech. Detectors are stateful (streaming models carry hidden state
/// between calls) and are not assumed thread-safe; the scheduler
/// serialises access behind one mutex shared by all sessions.
pub trait SpeechDetector: Send {
    /// Speech probability in [0.0, 1.0] for the given window.
    ///
    /// The value is the probability of the last frame of the windowed
    /// input. Empty input is an error.
    fn probability(&mut self, samples: &[f32]) -> Result<f32>;
}

/// Scriptable detector for tests.
///
/// Returns whatever probability its handle was last set to, so a test can
/// flip a session between "speech" and "silence" while the scheduler is
/// running.
#[derive(Debug)]
pub struct ScriptedDetector {
    prob: Arc<AtomicU32>,
    fail: Arc<AtomicBool>,
}

impl ScriptedDetector {
    /// Create a detector reporting `initial` until the handle changes it.
    pub fn new(initial: f32) -> Self {
        Self {
            prob: Arc::new(AtomicU32::new(initial.to_bits())),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for steering the detector from the test thread.
    pub fn handle(&self) -> DetectorHandle {
        DetectorHandle {
            prob: self.prob.clone(),
            fail: self.fail.clone(),
        }
    }
}

impl SpeechDetector for ScriptedDetector {
    fn probability(&mut self, samples: &[f32]) -> Result<f32> {
        if samples.is_empty() {
            return Err(ScribedError::Detector {
                message: "no frames".to_string(),
            });
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScribedError::Detector {
                message: "scripted failure".to_string(),
            });
        }
        Ok(f32::from_bits(self.prob.load(Ordering::SeqCst)))
    }
}

/// Remote control for a `ScriptedDetector`.
#[derive(Debug, Clone)]
pub struct DetectorHandle {
    prob: Arc<AtomicU32>,
    fail: Arc<AtomicBool>,
}

impl DetectorHandle {
    /// Set the probability subsequent calls will report.
    pub fn set_probability(&self, prob: f32) {
        self.prob.store(prob.to_bits(), Ordering::SeqCst);
    }

    /// Make subsequent calls fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}
