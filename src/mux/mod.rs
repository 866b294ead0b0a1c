//! Component F: container muxer. A pure function from (video packet
//! sequence, optional audio packet sequence, config) to a file on disk.
//! The platform media sink writer is, like the encoder, an external
//! collaborator; it is modeled as a `ContainerSink` trait with an
//! `ffmpeg-next` backed concrete sink behind it.

mod ffmpeg_sink;
mod interleave;
mod sink;

pub use ffmpeg_sink::FfmpegContainerSink;
pub use interleave::write_replay;
pub use sink::{AudioStreamConfig, ContainerSink, MuxSample, VideoStreamConfig};
