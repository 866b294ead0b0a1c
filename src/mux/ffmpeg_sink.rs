//! Concrete `ContainerSink` over `ffmpeg-next`'s output format writer,
//! configured for stream-copy passthrough: encoded packets go straight
//! into the container without a second encode pass.

use super::sink::{AudioStreamConfig, ContainerSink, MuxSample, VideoStreamConfig};
use crate::error::ReplayError;
use ffmpeg_next as ffmpeg;

fn video_codec_id(codec: crate::sample_ring::VideoCodec) -> ffmpeg::codec::Id {
    match codec {
        crate::sample_ring::VideoCodec::H264 => ffmpeg::codec::Id::H264,
        crate::sample_ring::VideoCodec::Hevc => ffmpeg::codec::Id::HEVC,
    }
}

/// Every sample timestamp/duration flowing through this sink is already in
/// the ring's fixed 100-ns unit (see `sample_ring::secs_to_100ns`), so every
/// stream this sink registers is declared in that same unit -- no rescale
/// is needed between the ring and the container.
const TIME_BASE_100NS: ffmpeg::Rational = ffmpeg::Rational(1, 10_000_000);

pub struct FfmpegContainerSink {
    output: Option<ffmpeg::format::context::Output>,
    video_stream_index: Option<usize>,
    audio_stream_index: Option<usize>,
    wrote_video_sample: bool,
}

impl FfmpegContainerSink {
    pub fn new() -> Self {
        Self {
            output: None,
            video_stream_index: None,
            audio_stream_index: None,
            wrote_video_sample: false,
        }
    }
}

impl Default for FfmpegContainerSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerSink for FfmpegContainerSink {
    fn create(&mut self, path: &std::path::Path) -> Result<(), ReplayError> {
        ffmpeg::init().map_err(|e| ReplayError::ContainerWriteFailed(e.to_string()))?;
        let output = ffmpeg::format::output(&path).map_err(|e| ReplayError::ContainerWriteFailed(e.to_string()))?;
        self.output = Some(output);
        Ok(())
    }

    fn add_video_stream(&mut self, config: VideoStreamConfig) -> Result<(), ReplayError> {
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| ReplayError::ContainerWriteFailed("sink not created".into()))?;

        let codec = ffmpeg::encoder::find(video_codec_id(config.codec))
            .ok_or_else(|| ReplayError::ContainerWriteFailed("no video codec descriptor".into()))?;
        let mut stream = output
            .add_stream(codec)
            .map_err(|e| ReplayError::ContainerWriteFailed(e.to_string()))?;

        stream.set_time_base(TIME_BASE_100NS);

        let params = stream.parameters_mut();
        unsafe {
            (*params.as_mut_ptr()).codec_id = video_codec_id(config.codec).into();
            (*params.as_mut_ptr()).width = config.width as i32;
            (*params.as_mut_ptr()).height = config.height as i32;
            (*params.as_mut_ptr()).bit_rate = config.average_bitrate_bps as i64;
            (*params.as_mut_ptr()).framerate = ffmpeg::Rational(config.fps as i32, 1).into();
            if let Some(header) = &config.sequence_header {
                let buf = ffmpeg::ffi::av_malloc(header.len()) as *mut u8;
                std::ptr::copy_nonoverlapping(header.as_ptr(), buf, header.len());
                (*params.as_mut_ptr()).extradata = buf;
                (*params.as_mut_ptr()).extradata_size = header.len() as i32;
            }
        }
        self.video_stream_index = Some(stream.index());
        Ok(())
    }

    fn add_audio_stream(&mut self, config: AudioStreamConfig) -> Result<(), ReplayError> {
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| ReplayError::ContainerWriteFailed("sink not created".into()))?;

        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::AAC)
            .ok_or_else(|| ReplayError::ContainerWriteFailed("no AAC codec descriptor".into()))?;
        let mut stream = output
            .add_stream(codec)
            .map_err(|e| ReplayError::ContainerWriteFailed(e.to_string()))?;
        stream.set_time_base(TIME_BASE_100NS);

        let params = stream.parameters_mut();
        unsafe {
            (*params.as_mut_ptr()).sample_rate = config.sample_rate as i32;
            (*params.as_mut_ptr()).ch_layout.nb_channels = config.channels as i32;
            (*params.as_mut_ptr()).bits_per_raw_sample = config.bits_per_sample as i32;
            if let Some(blob) = &config.decoder_config {
                let buf = ffmpeg::ffi::av_malloc(blob.len()) as *mut u8;
                std::ptr::copy_nonoverlapping(blob.as_ptr(), buf, blob.len());
                (*params.as_mut_ptr()).extradata = buf;
                (*params.as_mut_ptr()).extradata_size = blob.len() as i32;
            }
        }
        self.audio_stream_index = Some(stream.index());
        Ok(())
    }

    fn begin_writing(&mut self) -> Result<(), ReplayError> {
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| ReplayError::ContainerWriteFailed("sink not created".into()))?;
        output
            .write_header()
            .map_err(|e| ReplayError::ContainerWriteFailed(e.to_string()))
    }

    fn write_sample(&mut self, sample: MuxSample<'_>) -> Result<(), ReplayError> {
        let index = if sample.is_video {
            self.video_stream_index
        } else {
            self.audio_stream_index
        }
        .ok_or_else(|| ReplayError::ContainerWriteFailed("stream not registered".into()))?;

        let output = self
            .output
            .as_mut()
            .ok_or_else(|| ReplayError::ContainerWriteFailed("sink not created".into()))?;

        let mut packet = ffmpeg::Packet::copy(sample.data);
        packet.set_stream(index);
        packet.set_pts(Some(sample.timestamp));
        packet.set_dts(Some(sample.timestamp));
        packet.set_duration(sample.duration);
        if sample.keyframe {
            packet.set_flags(ffmpeg::packet::Flags::KEY);
        }
        packet
            .write_interleaved(output)
            .map_err(|e| ReplayError::ContainerWriteFailed(e.to_string()))?;

        if sample.is_video {
            self.wrote_video_sample = true;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<bool, ReplayError> {
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| ReplayError::ContainerFinalizeFailed("sink not created".into()))?;
        output
            .write_trailer()
            .map_err(|e| ReplayError::ContainerFinalizeFailed(e.to_string()))?;
        Ok(self.wrote_video_sample)
    }
}
