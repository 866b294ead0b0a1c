//! Component E: GPU video encoder driver.
//!
//! The vendor encoder SDK (NVENC et al.) is an external collaborator --
//! out of scope to reimplement -- so it is modeled as a `VideoEncoderBackend`
//! trait at the session create/destroy, per-frame `submit`, and
//! `sequence_header()` boundary. `FfmpegEncoderBackend` is the concrete
//! implementation, driving `ffmpeg-next`'s hardware encoder wrappers
//! (`h264_nvenc` / `hevc_nvenc`); a `FakeVideoEncoderBackend` for
//! deterministic tests lives in `crate::test_support`.

mod audio;
mod backend;
mod codec_config;
mod ffmpeg_backend;
mod session;

pub use audio::{AacAudioEncoder, AacEncoderConfig};
pub use backend::{EncoderFrame, EncoderState, SubmitOutcome, VideoEncoderBackend};
pub use codec_config::CodecConfig;
pub use ffmpeg_backend::FfmpegEncoderBackend;
pub use session::{EncoderConfig, EncoderSession};
