//! Default configuration constants for scribed.
//!
//! Shared between the config layer and the engine so the two never
//! disagree about units or baseline values.

/// Audio sample rate in Hz expected from clients.
///
/// 16kHz mono is the standard input format for speech recognition models;
/// clients are required to deliver it (no resampling happens server-side).
pub const SAMPLE_RATE: u32 = 16000;

/// Default whisper model path.
pub const DEFAULT_MODEL: &str = "models/ggml-base.en.bin";

/// Default transcription language code.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 9090;

/// Default listen host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default number of pooled whisper contexts.
///
/// Each context holds a full copy of the model in memory, so this is the
/// hard cap on concurrent sessions.
pub const N_CONTEXTS: usize = 2;

/// Default threads per inference call.
pub const N_THREADS: usize = 4;

/// Interval between inference passes in milliseconds.
pub const STEP_MS: u64 = 500;

/// Sliding-window length handed to the transcriber, in milliseconds.
pub const LENGTH_MS: u64 = 5000;

/// Overlap carried from one window into the next, in milliseconds.
pub const KEEP_MS: u64 = 200;

/// Cadence of voice-activity checks in milliseconds.
pub const VAD_CHECK_MS: u64 = 30;

/// Speech probability at or above which a VAD tick counts as speech.
pub const VAD_THRESHOLD: f32 = 0.5;

/// Silence duration that ends an utterance, in milliseconds.
pub const SILENCE_TRIGGER_MS: u64 = 1000;

/// Minimum utterance duration for a final to be emitted, in milliseconds.
pub const MIN_SPEECH_MS: u64 = 100;

/// Maximum seconds of audio retained per session.
pub const MAX_RETAIN_SECONDS: u32 = 30;

/// Scheduler wakeup interval in milliseconds.
pub const TICK_MS: u64 = 10;

/// Report the GPU backend compiled into this build.
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else {
        "CPU"
    }
}
