//! Speech-to-text capabilities: transcription and voice-activity detection.
//!
//! The engine only sees the `Transcriber` and `SpeechDetector` traits;
//! the whisper and Silero backends live behind feature gates so the
//! crate builds (and the engine tests run) without the native toolchains.

pub mod detector;
pub mod silero;
pub mod transcriber;
pub mod whisper;

pub use detector::{DetectorHandle, ScriptedDetector, SpeechDetector};
pub use silero::SileroDetector;
pub use transcriber::{MockTranscriber, TranscribeOptions, Transcriber};
pub use whisper::{WhisperConfig, WhisperTranscriber};
