//! Crate-wide error type.
//!
//! Covers config validation, device/encoder/container failures, and
//! stall/permanent-failure notifications. `RingFull` has no variant here
//! -- the ring handles it internally by eviction and it is never
//! surfaced to a caller (see `sample_ring`).

use crate::health::StallKind;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReplayError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("device enumeration failed: {0}")]
    DeviceEnumerationFailed(String),

    #[error("audio device invalidated: {device_id}")]
    DeviceInvalidated { device_id: String },

    #[error("encoder initialization failed: {0}")]
    EncoderInitError(String),

    #[error("encoder submit failed: {0}")]
    EncoderSubmitError(String),

    #[error("container write failed: {0}")]
    ContainerWriteFailed(String),

    #[error("container finalize failed: {0}")]
    ContainerFinalizeFailed(String),

    #[error("pipeline stalled: {kind:?}")]
    Stalled { kind: StallKind },

    #[error("permanent failure after {recoveries} recoveries in the last {window_secs}s")]
    PermanentFailure { recoveries: u32, window_secs: u64 },

    #[error("a save is already in progress")]
    SaveAlreadyInProgress,

    #[error("pipeline is not capturing")]
    NotCapturing,
}
