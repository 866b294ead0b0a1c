//! The trait boundary standing in for the vendor encoder SDK.

use crate::error::ReplayError;
use crate::sample_ring::{VideoCodec, VideoPacket};

/// Session lifecycle:
/// `Uninitialized -> Creating -> Ready -> Encoding <-> Flushing -> Destroyed`,
/// with any step's failure moving to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Uninitialized,
    Creating,
    Ready,
    Encoding,
    Flushing,
    Destroyed,
    Failed,
}

/// One host-memory frame to submit: NV12 planes at session dimensions.
pub struct EncoderFrame<'a> {
    pub plane_y: &'a [u8],
    pub plane_uv: &'a [u8],
    pub linesize_y: usize,
    pub linesize_uv: usize,
    pub timestamp: i64,
}

pub enum SubmitOutcome {
    /// The encoder produced a packet for this (or an earlier, buffered) frame.
    Packet(VideoPacket),
    /// The encoder needs more input before it can emit a packet.
    NeedMoreInput,
}

/// The boundary a real vendor SDK driver -- or a fake, for tests -- sits
/// behind: submit a frame, get the sequence header, shut down. Nothing
/// here is specific to any one vendor.
pub trait VideoEncoderBackend: Send {
    fn state(&self) -> EncoderState;

    /// Create the session: allocate surfaces/bitstream slots, configure
    /// rate control and GOP length, per `EncoderConfig`.
    fn create(&mut self, config: &EncoderConfig) -> Result<(), ReplayError>;

    /// Submit one frame. `force_idr` is computed by the caller from the
    /// GOP cadence (`frameNumber mod (fps * gop_seconds) == 0`).
    fn submit(&mut self, frame: EncoderFrame<'_>, force_idr: bool) -> Result<SubmitOutcome, ReplayError>;

    /// The codec parameter set (SPS/PPS, or VPS/SPS/PPS for HEVC) for the
    /// muxer to attach to its video media type.
    fn sequence_header(&self) -> Option<Vec<u8>>;

    /// Send an end-of-stream picture and release resources in reverse
    /// order of acquisition.
    fn shutdown(&mut self) -> Result<(), ReplayError>;

    fn codec(&self) -> VideoCodec;
}
