//! Fake backends shared by unit tests, so the keyframe-cadence and
//! stall/recovery properties can be exercised deterministically without a
//! GPU or real elapsed time.

use crate::encoder::{EncoderConfig, EncoderFrame, EncoderState, SubmitOutcome, VideoEncoderBackend};
use crate::error::ReplayError;
use crate::sample_ring::{VideoCodec, VideoPacket};

/// Best-effort logger init for tests that want to see `log` output;
/// safe to call more than once across the test binary.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct FakeVideoEncoderBackend {
    state: EncoderState,
    codec: VideoCodec,
    fps: u32,
}

impl FakeVideoEncoderBackend {
    pub fn new() -> Self {
        Self {
            state: EncoderState::Uninitialized,
            codec: VideoCodec::H264,
            fps: 60,
        }
    }
}

impl Default for FakeVideoEncoderBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoEncoderBackend for FakeVideoEncoderBackend {
    fn state(&self) -> EncoderState {
        self.state
    }

    fn create(&mut self, config: &EncoderConfig) -> Result<(), ReplayError> {
        self.codec = config.codec;
        self.fps = config.fps;
        self.state = EncoderState::Ready;
        Ok(())
    }

    fn submit(&mut self, frame: EncoderFrame<'_>, force_idr: bool) -> Result<SubmitOutcome, ReplayError> {
        self.state = EncoderState::Encoding;
        let duration = 10_000_000 / self.fps as i64;
        let data = vec![frame.plane_y.first().copied().unwrap_or(0), frame.plane_uv.first().copied().unwrap_or(0)];
        Ok(SubmitOutcome::Packet(VideoPacket::new(
            data,
            frame.timestamp,
            duration,
            force_idr,
            self.codec,
        )))
    }

    fn sequence_header(&self) -> Option<Vec<u8>> {
        Some(vec![0x00, 0x01, 0x02])
    }

    fn shutdown(&mut self) -> Result<(), ReplayError> {
        self.state = EncoderState::Destroyed;
        Ok(())
    }

    fn codec(&self) -> VideoCodec {
        self.codec
    }
}
