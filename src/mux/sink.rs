//! The `ContainerSink` boundary standing in for the platform media sink
//! writer: create, register a video stream, optionally register an audio
//! stream, begin writing, write one interleaved sample, and finalize.

use crate::error::ReplayError;
use crate::sample_ring::VideoCodec;

#[derive(Debug, Clone)]
pub struct VideoStreamConfig {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub average_bitrate_bps: u32,
    pub sequence_header: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct AudioStreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub decoder_config: Option<Vec<u8>>,
}

/// One packet handed to the sink during interleaving, tagged by stream
/// so `WriteSample` can branch on media type without the caller needing
/// to know the sink's internal stream indices.
pub struct MuxSample<'a> {
    pub is_video: bool,
    pub data: &'a [u8],
    pub timestamp: i64,
    pub duration: i64,
    pub keyframe: bool,
}

pub trait ContainerSink {
    /// Create the sink writer configured with hardware-transform
    /// passthrough and low-latency hints, targeting `path`.
    fn create(&mut self, path: &std::path::Path) -> Result<(), ReplayError>;

    /// Register the video stream; input type equals output type, which
    /// selects passthrough (no re-encode).
    fn add_video_stream(&mut self, config: VideoStreamConfig) -> Result<(), ReplayError>;

    /// Register the audio stream, only called when audio packets are present.
    fn add_audio_stream(&mut self, config: AudioStreamConfig) -> Result<(), ReplayError>;

    fn begin_writing(&mut self) -> Result<(), ReplayError>;

    /// Write one sample. Individual failures are logged and skipped by
    /// the caller (continue-on-error); this call reports the failure so
    /// the caller can do so.
    fn write_sample(&mut self, sample: MuxSample<'_>) -> Result<(), ReplayError>;

    /// Finalize (may block while the header/index is rewritten). Returns
    /// whether at least one video sample was written, which the caller
    /// combines with the `Finalize` return code for overall success.
    fn finalize(&mut self) -> Result<bool, ReplayError>;
}
