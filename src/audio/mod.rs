//! Multi-source audio capture and mix engine (components A and B).
//!
//! Each configured device gets its own dedicated OS thread isolating its
//! `cpal::Stream` (which is not `Send`/`Sync`), keeping that non-`Send`
//! resource off any thread but the one that owns its handle. A single
//! mixer thread combines all source PCM rings with per-source gain into
//! one canonical-format output ring.

mod convert;
mod cpal_backend;
mod device;
mod mixer;
mod ring;
mod source;

pub use convert::{downmix_to_stereo, interpolate_rate, mix_frame, samples_to_pcm16};
pub use device::{DeviceKind, NativeFormat, RawChunk, RawSample, SampleFormatKind};
pub use mixer::{AudioMixer, MixerConfig, MixerHandle};
pub use ring::PcmRing;
pub use source::{AudioSourceHandle, AudioSourceWorker, SourceConfig};

/// `N_max`: the maximum number of simultaneously configured audio sources.
pub const N_MAX_AUDIO_SOURCES: usize = 3;

/// Canonical PCM sample rate, `R_pcm`, unless overridden by configuration.
pub const DEFAULT_PCM_RATE: u32 = 48_000;

/// Canonical PCM format is always stereo 16-bit signed LE: 4 bytes/frame.
pub const PCM_FRAME_BYTES: usize = 4;

/// `P_a`: audio source polling period.
pub const SOURCE_POLL_PERIOD_MS: u64 = 10;

/// `E_max`: consecutive recoverable errors before a source worker exits.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 100;

/// `D`: an audio source is dormant once it has produced at least one
/// packet but none within this many milliseconds.
pub const DEFAULT_DORMANCY_MS: u64 = 100;

/// `P_m`: mixer loop cadence cap.
pub const MIXER_POLL_PERIOD_MS: u64 = 2;

pub fn bytes_per_sec(pcm_rate: u32) -> u64 {
    pcm_rate as u64 * PCM_FRAME_BYTES as u64
}
