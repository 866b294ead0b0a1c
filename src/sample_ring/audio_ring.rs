use super::SamplePacket;
use std::sync::Arc;

/// An owned, encoded audio sample. Codec is implicitly AAC; there is no
/// keyframe concept for audio so `is_keyframe` is always `false`.
#[derive(Clone)]
pub struct AudioPacket {
    pub data: Arc<[u8]>,
    pub timestamp: i64,
    pub duration: i64,
}

impl AudioPacket {
    pub fn new(data: Vec<u8>, timestamp: i64, duration: i64) -> Self {
        Self {
            data: super::arc_bytes(data),
            timestamp,
            duration,
        }
    }
}

impl SamplePacket for AudioPacket {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
    fn duration(&self) -> i64 {
        self.duration
    }
    fn is_keyframe(&self) -> bool {
        false
    }
    fn memory_size(&self) -> usize {
        self.data.len()
    }
}

pub type AudioRing = super::SampleRing<AudioPacket>;
