//! Per-session speech state machine.
//!
//! Driven by the scheduler on every voice-activity tick with a fresh
//! speech probability and a monotonic timestamp. The machine decides
//! when a session is speaking (partials flow), when an utterance has
//! ended (a final is due), and when short noise is discarded.

/// Speech progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    /// No utterance in progress.
    Idle,
    /// An utterance is in progress; partials are emitted.
    Speaking,
    /// Silence ended the utterance; the finaliser runs next.
    Ending,
}

/// Scheduler-owned mutable speech state of one session.
///
/// Only the scheduler thread writes these fields; they live behind one
/// mutex on the session.
#[derive(Debug)]
pub struct SpeechTracker {
    pub state: SpeechState,
    /// When the current utterance began (monotonic ms).
    pub speech_start_ms: u64,
    /// Last tick that counted as speech (monotonic ms).
    pub last_speech_ms: u64,
    /// Most recent partial text, the candidate final.
    pub pending_text: String,
    /// Last partial actually sent, for duplicate suppression.
    pub last_partial_text: String,
    /// Samples most recently submitted to the transcriber; the next
    /// window overlaps with its tail, and the finaliser re-reads it.
    pub window_tail: Vec<f32>,
}

impl SpeechTracker {
    pub fn new() -> Self {
        Self {
            state: SpeechState::Idle,
            speech_start_ms: 0,
            last_speech_ms: 0,
            pending_text: String::new(),
            last_partial_text: String::new(),
            window_tail: Vec::new(),
        }
    }

    /// Reset after a finaliser run: back to idle with all text and
    /// window state cleared.
    pub fn reset(&mut self) {
        self.state = SpeechState::Idle;
        self.pending_text.clear();
        self.last_partial_text.clear();
        self.window_tail.clear();
    }
}

impl Default for SpeechTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Thresholds governing the state machine.
#[derive(Debug, Clone, Copy)]
pub struct SpeechParams {
    /// Probability at or above which a tick counts as speech.
    pub vad_threshold: f32,
    /// Silence needed to end an utterance, in ms.
    pub silence_trigger_ms: u64,
    /// Minimum utterance duration for a final, in ms.
    pub min_speech_ms: u64,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self {
            vad_threshold: crate::defaults::VAD_THRESHOLD,
            silence_trigger_ms: crate::defaults::SILENCE_TRIGGER_MS,
            min_speech_ms: crate::defaults::MIN_SPEECH_MS,
        }
    }
}

impl SpeechParams {
    /// Advance the state machine with one probability sample.
    ///
    /// Speech duration is measured as `now - speech_start_ms`, so by the
    /// time silence has accumulated the duration already includes the
    /// full silence window. `min_speech_ms` therefore only rejects
    /// utterances when it exceeds `silence_trigger_ms`.
    pub fn advance(&self, tracker: &mut SpeechTracker, prob: f32, now_ms: u64) {
        let is_speech = prob >= self.vad_threshold;

        match tracker.state {
            SpeechState::Idle => {
                if is_speech {
                    tracker.state = SpeechState::Speaking;
                    tracker.speech_start_ms = now_ms;
                    tracker.last_speech_ms = now_ms;
                    tracker.pending_text.clear();
                }
            }
            SpeechState::Speaking => {
                if is_speech {
                    tracker.last_speech_ms = now_ms;
                } else {
                    let silence_ms = now_ms.saturating_sub(tracker.last_speech_ms);
                    if silence_ms >= self.silence_trigger_ms {
                        let speech_duration = now_ms.saturating_sub(tracker.speech_start_ms);
                        if speech_duration >= self.min_speech_ms {
                            tracker.state = SpeechState::Ending;
                        } else {
                            // Too short, discard without a final
                            tracker.state = SpeechState::Idle;
                        }
                    }
                }
            }
            SpeechState::Ending => {
                // The speaker resumed before the final was emitted; the
                // pending text and window survive the interruption.
                if is_speech {
                    tracker.state = SpeechState::Speaking;
                    tracker.last_speech_ms = now_ms;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SpeechParams {
        SpeechParams {
            vad_threshold: 0.5,
            silence_trigger_ms: 1000,
            min_speech_ms: 100,
        }
    }

    #[test]
    fn test_idle_stays_idle_without_speech() {
        let p = params();
        let mut t = SpeechTracker::new();

        p.advance(&mut t, 0.1, 0);
        p.advance(&mut t, 0.49, 1000);
        p.advance(&mut t, 0.0, 5000);

        assert_eq!(t.state, SpeechState::Idle);
    }

    #[test]
    fn test_idle_to_speaking_records_both_timestamps() {
        let p = params();
        let mut t = SpeechTracker::new();
        t.pending_text = "stale".to_string();

        p.advance(&mut t, 0.9, 1234);

        assert_eq!(t.state, SpeechState::Speaking);
        assert_eq!(t.speech_start_ms, 1234);
        assert_eq!(t.last_speech_ms, 1234);
        assert!(t.pending_text.is_empty());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let p = params();
        let mut t = SpeechTracker::new();

        p.advance(&mut t, 0.5, 0);
        assert_eq!(t.state, SpeechState::Speaking);
    }

    #[test]
    fn test_speaking_updates_last_speech_ms() {
        let p = params();
        let mut t = SpeechTracker::new();

        p.advance(&mut t, 0.9, 0);
        p.advance(&mut t, 0.9, 30);
        p.advance(&mut t, 0.9, 60);

        assert_eq!(t.state, SpeechState::Speaking);
        assert_eq!(t.speech_start_ms, 0);
        assert_eq!(t.last_speech_ms, 60);
    }

    #[test]
    fn test_silence_below_trigger_keeps_speaking() {
        let p = params();
        let mut t = SpeechTracker::new();

        p.advance(&mut t, 0.9, 0);
        // Exactly one ms short of the trigger
        p.advance(&mut t, 0.1, 999);

        assert_eq!(t.state, SpeechState::Speaking);
    }

    #[test]
    fn test_silence_at_trigger_ends_utterance() {
        let p = params();
        let mut t = SpeechTracker::new();

        p.advance(&mut t, 0.9, 0);
        p.advance(&mut t, 0.1, 1000);

        assert_eq!(t.state, SpeechState::Ending);
    }

    #[test]
    fn test_short_utterance_discarded_to_idle() {
        // min_speech_ms must exceed silence_trigger_ms to reject anything,
        // because duration is measured to now (inclusive of the silence).
        let p = SpeechParams {
            vad_threshold: 0.5,
            silence_trigger_ms: 500,
            min_speech_ms: 2000,
        };
        let mut t = SpeechTracker::new();

        p.advance(&mut t, 0.9, 0);   // speech begins
        p.advance(&mut t, 0.9, 100); // 100ms of speech
        p.advance(&mut t, 0.1, 600); // 500ms of silence, duration 600 < 2000

        assert_eq!(t.state, SpeechState::Idle);
    }

    #[test]
    fn test_duration_includes_trailing_silence() {
        // A 1ms utterance still ends with duration >= silence_trigger_ms,
        // so the default min_speech_ms cannot reject it.
        let p = params();
        let mut t = SpeechTracker::new();

        p.advance(&mut t, 0.9, 0);
        p.advance(&mut t, 0.1, 1000);

        assert_eq!(t.state, SpeechState::Ending);
    }

    #[test]
    fn test_ending_interrupted_back_to_speaking() {
        let p = params();
        let mut t = SpeechTracker::new();

        p.advance(&mut t, 0.9, 0);
        p.advance(&mut t, 0.1, 1000);
        assert_eq!(t.state, SpeechState::Ending);

        t.pending_text = "so far".to_string();
        t.window_tail = vec![0.5; 100];

        p.advance(&mut t, 0.9, 1030);

        assert_eq!(t.state, SpeechState::Speaking);
        assert_eq!(t.last_speech_ms, 1030);
        // start timestamp is untouched by the interruption
        assert_eq!(t.speech_start_ms, 0);
        assert_eq!(t.pending_text, "so far");
        assert_eq!(t.window_tail.len(), 100);
    }

    #[test]
    fn test_ending_stays_ending_on_silence() {
        let p = params();
        let mut t = SpeechTracker::new();

        p.advance(&mut t, 0.9, 0);
        p.advance(&mut t, 0.1, 1000);
        p.advance(&mut t, 0.1, 1030);
        p.advance(&mut t, 0.1, 1060);

        assert_eq!(t.state, SpeechState::Ending);
    }

    #[test]
    fn test_silence_gap_within_utterance_is_bridged() {
        let p = params();
        let mut t = SpeechTracker::new();

        p.advance(&mut t, 0.9, 0);
        p.advance(&mut t, 0.1, 500); // a pause shorter than the trigger
        p.advance(&mut t, 0.9, 900); // speech resumes
        p.advance(&mut t, 0.1, 1800); // 900ms of silence, still short

        assert_eq!(t.state, SpeechState::Speaking);

        p.advance(&mut t, 0.1, 1900); // 1000ms of silence
        assert_eq!(t.state, SpeechState::Ending);
    }

    #[test]
    fn test_reset_clears_text_and_window() {
        let mut t = SpeechTracker::new();
        t.state = SpeechState::Ending;
        t.pending_text = "text".to_string();
        t.last_partial_text = "text".to_string();
        t.window_tail = vec![0.1; 10];

        t.reset();

        assert_eq!(t.state, SpeechState::Idle);
        assert!(t.pending_text.is_empty());
        assert!(t.last_partial_text.is_empty());
        assert!(t.window_tail.is_empty());
    }
}
