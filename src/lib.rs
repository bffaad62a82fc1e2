//! scribed - real-time speech-to-text streaming over WebSockets
//!
//! Clients push 16-bit mono PCM at 16kHz in binary frames and receive
//! JSON transcript messages: `partial` hypotheses while speaking and one
//! `final` per utterance.

pub mod audio;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod server;
pub mod stt;
