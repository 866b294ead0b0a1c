//! Drives a `VideoEncoderBackend` through the create/submit/shutdown
//! sequence, tracking frame numbers and GOP cadence so the backend itself
//! stays a thin boundary over the vendor call shape.

use super::backend::{EncoderFrame, EncoderState, SubmitOutcome, VideoEncoderBackend};
use crate::error::ReplayError;
use crate::sample_ring::{VideoCodec, VideoPacket};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: VideoCodec,
    /// `G_s`: GOP length in seconds (typically 2s).
    pub gop_seconds: u32,
    /// Constant-QP value, or `None` to use the quality preset's bitrate.
    pub constant_qp: Option<u32>,
    pub bitrate_bps: Option<u32>,
}

impl EncoderConfig {
    pub fn gop_length_frames(&self) -> u64 {
        self.fps as u64 * self.gop_seconds as u64
    }
}

pub struct EncoderSession<B: VideoEncoderBackend> {
    backend: B,
    config: EncoderConfig,
    frame_number: u64,
}

impl<B: VideoEncoderBackend> EncoderSession<B> {
    pub fn create(mut backend: B, config: EncoderConfig) -> Result<Self, ReplayError> {
        backend.create(&config)?;
        Ok(Self {
            backend,
            config,
            frame_number: 0,
        })
    }

    pub fn state(&self) -> EncoderState {
        self.backend.state()
    }

    pub fn codec(&self) -> VideoCodec {
        self.config.codec
    }

    pub fn sequence_header(&self) -> Option<Vec<u8>> {
        self.backend.sequence_header()
    }

    /// Submit one frame, computing `FORCEIDR` from the GOP cadence
    /// (`frameNumber mod (fps * gopSeconds) == 0`).
    pub fn submit(&mut self, frame: EncoderFrame<'_>) -> Result<Option<VideoPacket>, ReplayError> {
        let gop_len = self.config.gop_length_frames().max(1);
        let force_idr = self.frame_number % gop_len == 0;
        let result = self.backend.submit(frame, force_idr);
        self.frame_number += 1;
        match result? {
            SubmitOutcome::Packet(packet) => Ok(Some(packet)),
            SubmitOutcome::NeedMoreInput => Ok(None),
        }
    }

    pub fn shutdown(mut self) -> Result<(), ReplayError> {
        self.backend.shutdown()
    }
}
