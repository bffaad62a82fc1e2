//! The inference scheduler thread.
//!
//! One dedicated OS thread drives all sessions: it wakes every few
//! milliseconds, runs a voice-activity pass on its own cadence, and an
//! inference pass on the (slower) step cadence. Inference runs inline on
//! this thread (the context pool exists to hold model memory, not to
//! parallelise), so per-session ordering is trivial and a single busy
//! flag per session is enough to coordinate with destroy.

use crate::engine::courier::OutboundCourier;
use crate::engine::session::{Session, SessionRegistry};
use crate::engine::speech::{SpeechParams, SpeechState};
use crate::protocol::ServerMessage;
use crate::stt::{SpeechDetector, TranscribeOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Timing and inference parameters for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Wakeup interval of the loop, in ms.
    pub tick_ms: u64,
    /// Interval between inference passes, in ms.
    pub step_ms: u64,
    /// Sliding-window length, in ms.
    pub length_ms: u64,
    /// Overlap carried between windows, in ms.
    pub keep_ms: u64,
    /// Cadence of voice-activity checks, in ms.
    pub vad_check_ms: u64,
    /// Input sample rate in Hz.
    pub sample_rate: u32,
    /// State-machine thresholds.
    pub speech: SpeechParams,
    /// Options for the streaming partial pass.
    pub partial_options: TranscribeOptions,
    /// Options for the finaliser pass.
    pub final_options: TranscribeOptions,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        use crate::defaults;
        Self {
            tick_ms: defaults::TICK_MS,
            step_ms: defaults::STEP_MS,
            length_ms: defaults::LENGTH_MS,
            keep_ms: defaults::KEEP_MS,
            vad_check_ms: defaults::VAD_CHECK_MS,
            sample_rate: defaults::SAMPLE_RATE,
            speech: SpeechParams::default(),
            partial_options: TranscribeOptions::default(),
            final_options: TranscribeOptions {
                single_segment: false,
                ..Default::default()
            },
        }
    }
}

impl SchedulerConfig {
    /// Derive scheduler parameters from the loaded configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        let base_options = TranscribeOptions {
            language: config.model.language.clone(),
            translate: config.model.translate,
            threads: config.model.n_threads,
            single_segment: true,
            no_context: true,
            no_timestamps: true,
        };
        Self {
            tick_ms: crate::defaults::TICK_MS,
            step_ms: config.timing.step_ms,
            length_ms: config.timing.length_ms,
            keep_ms: config.timing.keep_ms,
            vad_check_ms: config.timing.vad_check_ms,
            sample_rate: crate::defaults::SAMPLE_RATE,
            speech: SpeechParams {
                vad_threshold: config.timing.vad_threshold,
                silence_trigger_ms: config.timing.silence_trigger_ms,
                min_speech_ms: config.timing.min_speech_ms,
            },
            final_options: TranscribeOptions {
                single_segment: false,
                ..base_options.clone()
            },
            partial_options: base_options,
        }
    }
}

/// The periodic driver for all sessions.
pub struct InferenceScheduler {
    registry: Arc<SessionRegistry>,
    courier: OutboundCourier,
    /// The detector is shared across sessions and not assumed
    /// thread-safe; all calls go through this mutex. `None` disables the
    /// VAD pass entirely.
    detector: Option<Mutex<Box<dyn SpeechDetector>>>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
}

impl InferenceScheduler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        courier: OutboundCourier,
        detector: Option<Box<dyn SpeechDetector>>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            courier,
            detector: detector.map(Mutex::new),
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the scheduler thread.
    pub fn spawn(self) -> SchedulerHandle {
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let thread = std::thread::Builder::new()
            .name("inference-scheduler".to_string())
            .spawn(move || self.run())
            .expect("failed to spawn scheduler thread");

        SchedulerHandle {
            running,
            thread: Some(thread),
        }
    }

    fn run(&self) {
        tracing::info!(
            step_ms = self.config.step_ms,
            length_ms = self.config.length_ms,
            keep_ms = self.config.keep_ms,
            vad = self.detector.is_some(),
            "scheduler running"
        );

        let start = Instant::now();
        let mut last_vad_ms = 0u64;
        let mut last_infer_ms = 0u64;

        while self.running.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(self.config.tick_ms));
            let now_ms = start.elapsed().as_millis() as u64;

            // Strong handles for this tick; the registry lock is never
            // held across detector or transcriber calls.
            let sessions = self.registry.snapshot_active();

            if let Some(detector) = &self.detector
                && now_ms - last_vad_ms >= self.config.vad_check_ms
            {
                for session in &sessions {
                    self.vad_tick(session, detector, now_ms);
                }
                last_vad_ms = now_ms;
            }

            if now_ms - last_infer_ms >= self.config.step_ms {
                for session in &sessions {
                    self.inference_tick(session);
                }
                last_infer_ms = now_ms;
            }
        }

        tracing::info!("scheduler stopped");
    }

    /// One voice-activity check for one session.
    fn vad_tick(
        &self,
        session: &Arc<Session>,
        detector: &Mutex<Box<dyn SpeechDetector>>,
        now_ms: u64,
    ) {
        let window = session.audio.snapshot_last_ms(self.config.vad_check_ms);
        if window.is_empty() {
            return;
        }

        let prob = match detector.lock().unwrap().probability(&window) {
            Ok(p) => p,
            Err(e) => {
                // A failed tick behaves as silence
                tracing::debug!(session = %session.id, "VAD tick failed: {}", e);
                0.0
            }
        };

        let mut speech = session.speech.lock().unwrap();
        let before = speech.state;
        self.config.speech.advance(&mut speech, prob, now_ms);
        if speech.state != before {
            tracing::debug!(
                session = %session.id,
                from = ?before,
                to = ?speech.state,
                prob,
                "speech state changed"
            );
        }
    }

    /// One inference decision for one session.
    fn inference_tick(&self, session: &Arc<Session>) {
        if !session.is_active() {
            return;
        }

        if self.detector.is_none() {
            // Without VAD, transcribe whenever a step's worth of audio
            // has accumulated.
            if session.audio.has_min_duration(self.config.step_ms) && session.begin_inference() {
                self.run_partial(session);
                session.end_inference();
            }
            return;
        }

        let state = session.speech.lock().unwrap().state;
        match state {
            SpeechState::Speaking => {
                if session.begin_inference() {
                    self.run_partial(session);
                    session.end_inference();
                }
            }
            SpeechState::Ending => self.emit_final(session),
            SpeechState::Idle => {}
        }
    }

    /// Transcribe the sliding window and emit a partial if the text moved.
    fn run_partial(&self, session: &Arc<Session>) {
        let new_audio = session.audio.snapshot_all();
        session.audio.clear();
        if new_audio.is_empty() {
            return;
        }

        let samples_per_ms = self.config.sample_rate as usize / 1000;
        let n_keep = self.config.keep_ms as usize * samples_per_ms;
        let n_len = self.config.length_ms as usize * samples_per_ms;

        // Window = tail of the previous window + everything new. The tail
        // is saved before inference so a failed call does not lose audio.
        let window = {
            let mut speech = session.speech.lock().unwrap();
            let max_carry = (n_keep + n_len).saturating_sub(new_audio.len());
            let take = speech.window_tail.len().min(max_carry);

            let mut window = Vec::with_capacity(take + new_audio.len());
            window.extend_from_slice(&speech.window_tail[speech.window_tail.len() - take..]);
            window.extend_from_slice(&new_audio);
            speech.window_tail = window.clone();
            window
        };

        let segments = match session
            .transcriber()
            .transcribe(&window, &self.config.partial_options)
        {
            Ok(segments) => segments,
            Err(e) => {
                // Skip this partial; the window survives for the next one
                tracing::warn!(session = %session.id, "partial inference failed: {}", e);
                return;
            }
        };

        let text = join_and_trim(&segments);
        if text.is_empty() {
            return;
        }

        let changed = {
            let mut speech = session.speech.lock().unwrap();
            if text != speech.last_partial_text {
                speech.pending_text = text.clone();
                speech.last_partial_text = text.clone();
                true
            } else {
                false
            }
        };

        if changed {
            session.enqueue_message(ServerMessage::Partial { text }.to_json());
            self.courier.notify(&session.id);
        }
    }

    /// Run the finaliser over the retained window and reset the session.
    ///
    /// A no-op unless the session is in the ending state.
    fn emit_final(&self, session: &Arc<Session>) {
        {
            let speech = session.speech.lock().unwrap();
            if speech.state != SpeechState::Ending {
                return;
            }
        }

        if !session.begin_inference() {
            return;
        }

        let window = session.speech.lock().unwrap().window_tail.clone();

        let mut final_text = String::new();
        if !window.is_empty() {
            match session
                .transcriber()
                .transcribe(&window, &self.config.final_options)
            {
                Ok(segments) => final_text = join_and_trim(&segments),
                Err(e) => {
                    // Final suppressed; the session still resets below
                    tracing::warn!(session = %session.id, "final inference failed: {}", e);
                }
            }
        }

        if !final_text.is_empty() {
            tracing::debug!(session = %session.id, text = %final_text, "final transcript");
            session.enqueue_message(ServerMessage::Final { text: final_text }.to_json());
            self.courier.notify(&session.id);
        }

        session.speech.lock().unwrap().reset();
        session.audio.clear();
        session.end_inference();
    }
}

/// Join handle for a running scheduler.
pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal the loop to exit and join the thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Concatenate segment texts and trim ASCII whitespace.
fn join_and_trim(segments: &[String]) -> String {
    let mut text = String::new();
    for segment in segments {
        text.push_str(segment);
    }
    text.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
        .to_string()
}
