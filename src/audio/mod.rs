//! Audio buffering for streaming sessions.

pub mod ring;

pub use ring::AudioRing;
