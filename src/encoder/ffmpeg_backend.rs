//! Concrete `VideoEncoderBackend` over `ffmpeg-next`'s hardware encoder
//! wrappers. Loading the vendor library and resolving function pointers
//! is `ffmpeg_next::init()` plus `codec::encoder::find_by_name`; the
//! input surface and output bitstream slot pools are the encoder
//! context's internal frame/packet pools, which `ffmpeg-next` manages
//! once the context is opened.

use super::backend::{EncoderFrame, EncoderState, SubmitOutcome, VideoEncoderBackend};
use super::session::EncoderConfig;
use crate::error::ReplayError;
use crate::sample_ring::{VideoCodec, VideoPacket};
use ffmpeg_next as ffmpeg;

fn encoder_name(codec: VideoCodec) -> &'static str {
    match codec {
        VideoCodec::H264 => "h264_nvenc",
        VideoCodec::Hevc => "hevc_nvenc",
    }
}

pub struct FfmpegEncoderBackend {
    state: EncoderState,
    encoder: Option<ffmpeg::encoder::Video>,
    codec: VideoCodec,
    frame: ffmpeg::util::frame::Video,
    sequence_header: Option<Vec<u8>>,
}

impl FfmpegEncoderBackend {
    pub fn new() -> Self {
        Self {
            state: EncoderState::Uninitialized,
            encoder: None,
            codec: VideoCodec::H264,
            frame: ffmpeg::util::frame::Video::empty(),
            sequence_header: None,
        }
    }
}

impl Default for FfmpegEncoderBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoEncoderBackend for FfmpegEncoderBackend {
    fn state(&self) -> EncoderState {
        self.state
    }

    fn create(&mut self, config: &EncoderConfig) -> Result<(), ReplayError> {
        self.state = EncoderState::Creating;
        ffmpeg::init().map_err(|e| ReplayError::EncoderInitError(e.to_string()))?;

        let codec = ffmpeg::encoder::find_by_name(encoder_name(config.codec))
            .ok_or_else(|| ReplayError::EncoderInitError(format!("{} not available", encoder_name(config.codec))))?;

        let context = ffmpeg::codec::Context::new_with_codec(codec);
        let mut video = context
            .encoder()
            .video()
            .map_err(|e| ReplayError::EncoderInitError(e.to_string()))?;

        video.set_width(config.width);
        video.set_height(config.height);
        video.set_format(ffmpeg::util::format::Pixel::NV12);
        video.set_time_base(ffmpeg::Rational(1, config.fps as i32));
        video.set_frame_rate(Some(ffmpeg::Rational(config.fps as i32, 1)));
        video.set_gop(config.gop_length_frames() as u32);
        video.set_max_b_frames(0);

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("tune", "ull"); // ultra-low-latency preset.
        opts.set("rc", if config.constant_qp.is_some() { "constqp" } else { "cbr" });
        if let Some(qp) = config.constant_qp {
            opts.set("qp", &qp.to_string());
        }
        if let Some(bitrate) = config.bitrate_bps {
            video.set_bit_rate(bitrate as usize);
        }
        opts.set("delay", "0");
        opts.set("zerolatency", "1");

        let opened = video
            .open_with(opts)
            .map_err(|e| ReplayError::EncoderInitError(e.to_string()))?;

        self.sequence_header = opened.extradata().map(|d| d.to_vec());
        self.encoder = Some(opened);
        self.codec = config.codec;
        self.frame = ffmpeg::util::frame::Video::new(ffmpeg::util::format::Pixel::NV12, config.width, config.height);
        self.state = EncoderState::Ready;
        Ok(())
    }

    fn submit(&mut self, frame: EncoderFrame<'_>, force_idr: bool) -> Result<SubmitOutcome, ReplayError> {
        self.state = EncoderState::Encoding;
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| ReplayError::EncoderSubmitError("encoder not created".into()))?;

        {
            let dst_y = self.frame.data_mut(0);
            let rows = frame.plane_y.len() / frame.linesize_y.max(1);
            for row in 0..rows {
                let src = &frame.plane_y[row * frame.linesize_y..row * frame.linesize_y + frame.linesize_y.min(dst_y.len())];
                let dst_start = row * self.frame.stride(0);
                let len = src.len().min(dst_y.len().saturating_sub(dst_start));
                dst_y[dst_start..dst_start + len].copy_from_slice(&src[..len]);
            }
        }
        {
            let dst_uv = self.frame.data_mut(1);
            let rows = frame.plane_uv.len() / frame.linesize_uv.max(1);
            for row in 0..rows {
                let src = &frame.plane_uv[row * frame.linesize_uv..row * frame.linesize_uv + frame.linesize_uv.min(dst_uv.len())];
                let dst_start = row * self.frame.stride(1);
                let len = src.len().min(dst_uv.len().saturating_sub(dst_start));
                dst_uv[dst_start..dst_start + len].copy_from_slice(&src[..len]);
            }
        }
        self.frame.set_pts(Some(frame.timestamp));
        if force_idr {
            self.frame.set_kind(ffmpeg::picture::Type::I);
        }

        encoder
            .send_frame(&self.frame)
            .map_err(|e| ReplayError::EncoderSubmitError(e.to_string()))?;

        let mut packet = ffmpeg::Packet::empty();
        match encoder.receive_packet(&mut packet) {
            Ok(()) => {
                let data = packet.data().unwrap_or(&[]).to_vec();
                let keyframe = packet.is_key();
                let timestamp = packet.pts().unwrap_or(frame.timestamp);
                let duration = packet.duration();
                Ok(SubmitOutcome::Packet(VideoPacket::new(
                    data,
                    timestamp,
                    duration,
                    keyframe,
                    self.codec,
                )))
            }
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
                Ok(SubmitOutcome::NeedMoreInput)
            }
            Err(e) => Err(ReplayError::EncoderSubmitError(e.to_string())),
        }
    }

    fn sequence_header(&self) -> Option<Vec<u8>> {
        self.sequence_header.clone()
    }

    fn shutdown(&mut self) -> Result<(), ReplayError> {
        self.state = EncoderState::Flushing;
        if let Some(encoder) = self.encoder.as_mut() {
            encoder
                .send_eof()
                .map_err(|e| ReplayError::EncoderInitError(e.to_string()))?;
            let mut packet = ffmpeg::Packet::empty();
            while encoder.receive_packet(&mut packet).is_ok() {}
        }
        self.encoder = None;
        self.state = EncoderState::Destroyed;
        Ok(())
    }

    fn codec(&self) -> VideoCodec {
        self.codec
    }
}
