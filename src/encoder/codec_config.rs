//! Shared slot for the out-of-band codec configuration blobs (H.264/HEVC
//! sequence header, AAC `AudioSpecificConfig`) that the video and audio
//! encoders only learn once, at `create()` time, but that the muxer needs
//! at save time -- long after the encoder itself has moved into its own
//! worker thread.
//!
//! Each blob is written at most once per pipeline run, right after the
//! owning encoder opens, so a `OnceLock` is enough: no reader ever races a
//! writer for "is it set yet", it only ever transitions none -> some.

use std::sync::OnceLock;

#[derive(Default)]
pub struct CodecConfig {
    video_sequence_header: OnceLock<Vec<u8>>,
    audio_decoder_config: OnceLock<Vec<u8>>,
}

impl CodecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// No-op if the header is empty or already set (an encoder that never
    /// produces one leaves the slot permanently unset).
    pub fn set_video_sequence_header(&self, header: Option<Vec<u8>>) {
        if let Some(header) = header {
            let _ = self.video_sequence_header.set(header);
        }
    }

    pub fn set_audio_decoder_config(&self, config: Option<Vec<u8>>) {
        if let Some(config) = config {
            let _ = self.audio_decoder_config.set(config);
        }
    }

    pub fn video_sequence_header(&self) -> Option<Vec<u8>> {
        self.video_sequence_header.get().cloned()
    }

    pub fn audio_decoder_config(&self) -> Option<Vec<u8>> {
        self.audio_decoder_config.get().cloned()
    }
}
