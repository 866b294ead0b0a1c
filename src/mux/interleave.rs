//! Two-cursor interleaving and atomic finalize-by-rename.
//!
//! Precondition: the first emitted video packet should be a keyframe for
//! decodability -- logged as a warning, not an error, if it isn't; the
//! muxer still writes it.

use super::sink::{AudioStreamConfig, ContainerSink, MuxSample, VideoStreamConfig};
use crate::error::ReplayError;
use crate::sample_ring::{AudioPacket, VideoPacket};
use crate::{error, warn};
use std::path::Path;

/// Writes `video`/`audio` (already time-ordered within each stream, as
/// ring snapshots are) into `path`, via a temp file in the same
/// directory that is renamed into place only once `Finalize` succeeds --
/// a reader never observes a partially-written file at `path`.
#[allow(clippy::too_many_arguments)]
pub fn write_replay(
    sink: &mut dyn ContainerSink,
    video: &[VideoPacket],
    audio: &[AudioPacket],
    path: &Path,
    width: u32,
    height: u32,
    fps: u32,
    average_bitrate_bps: u32,
    sequence_header: Option<Vec<u8>>,
    decoder_config: Option<Vec<u8>>,
) -> Result<(), ReplayError> {
    let tmp_path = tmp_path_for(path);

    sink.create(&tmp_path)?;

    let codec = video
        .first()
        .map(|p| p.codec)
        .unwrap_or(crate::sample_ring::VideoCodec::H264);
    sink.add_video_stream(VideoStreamConfig {
        codec,
        width,
        height,
        fps,
        average_bitrate_bps,
        sequence_header,
    })?;
    if !audio.is_empty() {
        sink.add_audio_stream(AudioStreamConfig {
            sample_rate: 48_000,
            channels: 2,
            bits_per_sample: 16,
            decoder_config,
        })?;
    }

    sink.begin_writing()?;

    if let Some(first) = video.first() {
        if !first.is_keyframe() {
            warn!("first video packet in replay is not a keyframe");
        }
    }

    let mut vi = 0usize;
    let mut ai = 0usize;
    let mut samples_written = 0u64;

    while vi < video.len() || ai < audio.len() {
        let take_video = match (video.get(vi), audio.get(ai)) {
            (Some(v), Some(a)) => v.timestamp <= a.timestamp, // ties prefer video
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };

        let result = if take_video {
            let p = &video[vi];
            vi += 1;
            sink.write_sample(MuxSample {
                is_video: true,
                data: &p.data,
                timestamp: p.timestamp,
                duration: p.duration,
                keyframe: p.keyframe,
            })
        } else {
            let p = &audio[ai];
            ai += 1;
            sink.write_sample(MuxSample {
                is_video: false,
                data: &p.data,
                timestamp: p.timestamp,
                duration: p.duration,
                keyframe: false,
            })
        };

        match result {
            Ok(()) => samples_written += 1,
            Err(e) => error!("dropping sample during mux: {e}"), // continue-on-error
        }
    }

    if samples_written == 0 {
        return Err(ReplayError::ContainerWriteFailed("zero samples written".into()));
    }

    let wrote_video = sink.finalize()?;
    if !wrote_video {
        return Err(ReplayError::ContainerFinalizeFailed(
            "no video sample was written".into(),
        ));
    }

    std::fs::rename(&tmp_path, path).map_err(|e| ReplayError::ContainerFinalizeFailed(e.to_string()))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    tmp.set_file_name(format!(".{file_name}.tmp"));
    tmp
}
