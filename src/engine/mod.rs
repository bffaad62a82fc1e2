//! The real-time inference engine.
//!
//! Everything here runs independently of the connection layer: a fixed
//! pool of transcriber contexts, a registry of live sessions, the speech
//! state machine, a single scheduler thread driving inference, and the
//! courier that hands finished messages back to the I/O side.

pub mod courier;
pub mod pool;
pub mod scheduler;
pub mod session;
pub mod speech;

pub use courier::{IoBridge, OutboundCourier};
pub use pool::{ContextPool, PooledContext};
pub use scheduler::{InferenceScheduler, SchedulerConfig, SchedulerHandle};
pub use session::{Session, SessionRegistry};
pub use speech::{SpeechParams, SpeechState, SpeechTracker};
