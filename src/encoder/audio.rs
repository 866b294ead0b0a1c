//! Supplemental: an AAC audio encoder sitting behind the mixer's single
//! reader contract, turning the canonical PCM stream into the compressed
//! audio packets the container muxer and audio sample ring expect. The
//! muxer boundary only names a raw-payload AAC media type and a
//! decoder-specific config blob, never who produces that bitstream --
//! this fills the gap the same way the GPU driver fills the video one,
//! using `ffmpeg-next`'s software AAC encoder since there is no hardware
//! audio encode path in scope.

use crate::error::ReplayError;
use crate::sample_ring::AudioPacket;
use ffmpeg_next as ffmpeg;

pub struct AacEncoderConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate_bps: u32,
}

pub struct AacAudioEncoder {
    encoder: ffmpeg::encoder::Audio,
    frame: ffmpeg::util::frame::Audio,
    frame_number: u64,
    sample_rate: u32,
}

impl AacAudioEncoder {
    pub fn create(config: AacEncoderConfig) -> Result<Self, ReplayError> {
        ffmpeg::init().map_err(|e| ReplayError::EncoderInitError(e.to_string()))?;
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::AAC)
            .ok_or_else(|| ReplayError::EncoderInitError("AAC encoder not available".into()))?;
        let context = ffmpeg::codec::Context::new_with_codec(codec);
        let mut audio = context
            .encoder()
            .audio()
            .map_err(|e| ReplayError::EncoderInitError(e.to_string()))?;

        audio.set_rate(config.sample_rate as i32);
        audio.set_format(ffmpeg::util::format::Sample::F32(ffmpeg::util::format::sample::Type::Packed));
        audio.set_bit_rate(config.bitrate_bps as usize);
        audio.set_channel_layout(if config.channels == 1 {
            ffmpeg::util::channel_layout::ChannelLayout::MONO
        } else {
            ffmpeg::util::channel_layout::ChannelLayout::STEREO
        });

        let opened = audio
            .open()
            .map_err(|e| ReplayError::EncoderInitError(e.to_string()))?;

        let frame_size = opened.frame_size();
        let frame = ffmpeg::util::frame::Audio::new(opened.format(), frame_size as usize, opened.channel_layout());

        Ok(Self {
            encoder: opened,
            frame,
            frame_number: 0,
            sample_rate: config.sample_rate,
        })
    }

    /// `decoder_config`: the codec-specific config blob (AudioSpecificConfig)
    /// the muxer attaches to its AAC media type.
    pub fn decoder_config(&self) -> Option<Vec<u8>> {
        self.encoder.extradata().map(|d| d.to_vec())
    }

    /// Encode one canonical-PCM chunk (stereo 16-bit LE) into zero or more
    /// AAC packets, same "push in, drain what's ready" shape as the video path.
    pub fn encode(&mut self, pcm16: &[u8]) -> Result<Vec<AudioPacket>, ReplayError> {
        let samples = pcm16.chunks_exact(4).map(|c| {
            let l = i16::from_le_bytes([c[0], c[1]]) as f32 / i16::MAX as f32;
            let r = i16::from_le_bytes([c[2], c[3]]) as f32 / i16::MAX as f32;
            (l, r)
        });

        let plane = self.frame.data_mut(0);
        let mut written = 0usize;
        for (i, (l, r)) in samples.enumerate() {
            if i * 8 + 8 > plane.len() {
                break;
            }
            plane[i * 8..i * 8 + 4].copy_from_slice(&l.to_le_bytes());
            plane[i * 8 + 4..i * 8 + 8].copy_from_slice(&r.to_le_bytes());
            written += 1;
        }
        if written == 0 {
            return Ok(Vec::new());
        }

        let timestamp = (self.frame_number * 10_000_000) / self.sample_rate as u64 * self.frame.samples() as u64;
        self.frame.set_pts(Some(timestamp as i64));
        self.frame_number += 1;

        self.encoder
            .send_frame(&self.frame)
            .map_err(|e| ReplayError::EncoderSubmitError(e.to_string()))?;

        let mut packets = Vec::new();
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            let data = packet.data().unwrap_or(&[]).to_vec();
            let pts = packet.pts().unwrap_or(timestamp as i64);
            let duration = packet.duration().max(1);
            packets.push(AudioPacket::new(data, pts, duration));
        }
        Ok(packets)
    }
}
