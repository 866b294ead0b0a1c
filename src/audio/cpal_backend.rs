//! Concrete `cpal`-backed device capture, adapting cpal's callback-push
//! model to a WASAPI-style "ask how many frames are available, then pull"
//! polling loop: the stream callback pushes raw chunks into an `mpsc`
//! channel, and `AudioSourceWorker` (component A) drains the channel on
//! its own `P_a`-period polling loop, so no lock is ever held across the
//! cpal audio thread boundary.

use super::device::{DeviceKind, NativeFormat, RawChunk, RawSample, SampleFormatKind};
use crate::error::ReplayError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// Owns the live `cpal::Stream`. Not `Send`; must stay on the thread
/// that created it.
pub struct CpalCapture {
    _stream: cpal::Stream,
    pub native_format: NativeFormat,
    /// Set by the stream's error callback when cpal reports the device
    /// itself gone (unplugged, disabled) rather than a transient glitch.
    /// `AudioSourceWorker` polls this and exits the moment it flips,
    /// instead of folding it into the transient-error retry count.
    pub device_invalidated: Arc<AtomicBool>,
}

/// Whether a `cpal::StreamError` means the device is gone for good, as
/// opposed to a transient buffer glitch the worker can just retry past.
fn is_invalidating(err: &cpal::StreamError) -> bool {
    matches!(err, cpal::StreamError::DeviceNotAvailable)
}

pub fn enumerate_devices(kind: DeviceKind) -> Result<Vec<String>, ReplayError> {
    let host = cpal::default_host();
    let devices = match kind {
        DeviceKind::Capture => host.input_devices(),
        DeviceKind::Loopback => host.output_devices(),
    }
    .map_err(|e| ReplayError::DeviceEnumerationFailed(e.to_string()))?;

    devices
        .map(|d| d.name().map_err(|e| ReplayError::DeviceEnumerationFailed(e.to_string())))
        .collect()
}

fn find_device(host: &cpal::Host, kind: DeviceKind, device_id: &str) -> Result<cpal::Device, ReplayError> {
    let mut devices = match kind {
        DeviceKind::Capture => host.input_devices(),
        DeviceKind::Loopback => host.output_devices(),
    }
    .map_err(|e| ReplayError::DeviceEnumerationFailed(e.to_string()))?;

    devices
        .find(|d| d.name().map(|n| n == device_id).unwrap_or(false))
        .ok_or_else(|| ReplayError::DeviceInvalidated {
            device_id: device_id.to_string(),
        })
}

fn sample_format_kind(fmt: cpal::SampleFormat) -> SampleFormatKind {
    match fmt {
        cpal::SampleFormat::I16 => SampleFormatKind::I16,
        cpal::SampleFormat::F32 => SampleFormatKind::F32,
        // cpal has no dedicated 24-bit variant; anything else we treat as
        // the widest integer path and decode through i32 sign-extension.
        _ => SampleFormatKind::I24,
    }
}

/// Open `device_id` for capture (or loopback) and start streaming raw
/// chunks into the returned channel. The stream itself stays alive as
/// long as the returned `CpalCapture` isn't dropped.
pub fn open_stream(
    kind: DeviceKind,
    device_id: &str,
) -> Result<(CpalCapture, mpsc::Receiver<RawChunk>), ReplayError> {
    let host = cpal::default_host();
    let device = find_device(&host, kind, device_id)?;
    let config = device
        .default_input_config()
        .map_err(|e| ReplayError::DeviceEnumerationFailed(e.to_string()))?;

    let native_format = NativeFormat {
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
        sample_format: sample_format_kind(config.sample_format()),
    };

    let (tx, rx) = mpsc::channel::<RawChunk>();
    let channels = native_format.channels;
    let err_tx = tx.clone();
    let device_invalidated = Arc::new(AtomicBool::new(false));
    let device_invalidated_cb = device_invalidated.clone();

    let stream = match config.sample_format() {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.clone().into(),
            move |data: &[i16], _| {
                let _ = tx.send(RawChunk {
                    samples: RawSample::I16(data.to_vec()),
                    channels,
                    silent: false,
                });
            },
            move |err| {
                if is_invalidating(&err) {
                    device_invalidated_cb.store(true, Ordering::Release);
                    return;
                }
                let _ = err_tx.send(RawChunk {
                    samples: RawSample::I16(Vec::new()),
                    channels,
                    silent: true,
                });
            },
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.clone().into(),
            move |data: &[f32], _| {
                let _ = tx.send(RawChunk {
                    samples: RawSample::F32(data.to_vec()),
                    channels,
                    silent: false,
                });
            },
            move |err| {
                if is_invalidating(&err) {
                    device_invalidated_cb.store(true, Ordering::Release);
                    return;
                }
                let _ = err_tx.send(RawChunk {
                    samples: RawSample::F32(Vec::new()),
                    channels,
                    silent: true,
                });
            },
            None,
        ),
        other => {
            return Err(ReplayError::DeviceEnumerationFailed(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    }
    .map_err(|e| ReplayError::DeviceEnumerationFailed(e.to_string()))?;

    stream
        .play()
        .map_err(|e| ReplayError::DeviceEnumerationFailed(e.to_string()))?;

    Ok((
        CpalCapture {
            _stream: stream,
            native_format,
            device_invalidated,
        },
        rx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_not_available_is_invalidating() {
        assert!(is_invalidating(&cpal::StreamError::DeviceNotAvailable));
    }

    #[test]
    fn backend_specific_error_is_not_invalidating() {
        let err = cpal::StreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "buffer underrun".to_string(),
            },
        };
        assert!(!is_invalidating(&err));
    }
}
