use super::SamplePacket;
use std::sync::Arc;

/// Codec tag carried by an encoded video packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Hevc,
}

/// An owned, encoded video sample.
#[derive(Clone)]
pub struct VideoPacket {
    pub data: Arc<[u8]>,
    pub timestamp: i64,
    pub duration: i64,
    pub keyframe: bool,
    pub codec: VideoCodec,
}

impl VideoPacket {
    pub fn new(data: Vec<u8>, timestamp: i64, duration: i64, keyframe: bool, codec: VideoCodec) -> Self {
        Self {
            data: super::arc_bytes(data),
            timestamp,
            duration,
            keyframe,
            codec,
        }
    }
}

impl SamplePacket for VideoPacket {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
    fn duration(&self) -> i64 {
        self.duration
    }
    fn is_keyframe(&self) -> bool {
        self.keyframe
    }
    fn memory_size(&self) -> usize {
        self.data.len()
    }
}

pub type VideoRing = super::SampleRing<VideoPacket>;
