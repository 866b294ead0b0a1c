//! Real-time capture-encode-buffer-mux pipeline with instant-replay semantics.
//!
//! This crate owns the hot path only: multi-source audio capture and
//! mixing, a bounded ring of encoded video/audio samples, a GPU encoder
//! driver, a passthrough container muxer, and the health supervisor that
//! watches all of it. Device enumeration UI, settings persistence, CLI
//! parsing, and overlay/hotkey subsystems are host-application concerns
//! and live outside this crate.

pub mod audio;
pub mod config;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod health;
pub mod mux;
pub mod sample_ring;
pub mod save;

// Re-export the logging macros from one place so callers never need a
// direct dependency on `log` themselves.
pub use log::{debug, error, info, trace, warn};

pub use config::ReplayConfig;
pub use controller::{PipelineController, PipelineState};
pub use error::ReplayError;
pub use health::ThreadRole;

#[cfg(test)]
pub(crate) mod test_support;
