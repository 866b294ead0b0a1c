//! Sample-format decode, rate conversion, downmix, and clamp: decode
//! source samples, linearly interpolate to the canonical sample rate,
//! downmix or duplicate to stereo, clamp to [-1, 1], and write as
//! 16-bit signed PCM.

use super::device::{NativeFormat, RawSample};

/// Decode one raw sample buffer to normalized `f32` in `[-1.0, 1.0]`,
/// per-channel interleaved, honoring the detected sample format.
fn decode_to_f32(samples: &RawSample) -> Vec<f32> {
    match samples {
        RawSample::I16(v) => v.iter().map(|&s| s as f32 / i16::MAX as f32).collect(),
        // 24-bit sign-extended into i32; full-scale magnitude is 2^23.
        RawSample::I24(v) => v
            .iter()
            .map(|&s| s as f32 / 8_388_608.0)
            .collect(),
        RawSample::F32(v) => v.clone(),
    }
}

/// Linear interpolation from `src_rate` to `dst_rate`, preserving channel
/// interleaving. A source rate below the target still produces valid
/// output: fewer source frames simply produce fewer output frames at the
/// lower input rate, upsampled to fill the target rate.
pub fn interpolate_rate(interleaved: &[f32], channels: u16, src_rate: u32, dst_rate: u32) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    let src_frames = interleaved.len() / channels;
    if src_frames == 0 {
        return Vec::new();
    }
    if src_rate == dst_rate {
        return interleaved.to_vec();
    }

    let dst_frames = ((src_frames as u64 * dst_rate as u64) / src_rate as u64).max(1) as usize;
    let mut out = Vec::with_capacity(dst_frames * channels);
    for i in 0..dst_frames {
        // Position in source-frame space for this output frame.
        let src_pos = i as f64 * (src_frames.saturating_sub(1)) as f64 / (dst_frames.max(1) - 1).max(1) as f64;
        let lo = src_pos.floor() as usize;
        let hi = (lo + 1).min(src_frames - 1);
        let frac = (src_pos - lo as f64) as f32;
        for ch in 0..channels {
            let a = interleaved[lo * channels + ch];
            let b = interleaved[hi * channels + ch];
            out.push(a + (b - a) * frac);
        }
    }
    out
}

/// Downmix (or duplicate) an interleaved buffer of `channels` channels to
/// stereo. Mono is duplicated to both channels; two or more channels use
/// the first two as left/right (extra channels are dropped).
pub fn downmix_to_stereo(interleaved: &[f32], channels: u16) -> Vec<(f32, f32)> {
    let channels = channels.max(1) as usize;
    let frames = interleaved.len() / channels;
    let mut out = Vec::with_capacity(frames);
    for i in 0..frames {
        let base = i * channels;
        if channels == 1 {
            let s = interleaved[base];
            out.push((s, s));
        } else {
            out.push((interleaved[base], interleaved[base + 1]));
        }
    }
    out
}

/// Clamp to `[-1, 1]` and pack as interleaved 16-bit signed little-endian
/// stereo bytes -- the canonical PCM format.
pub fn samples_to_pcm16(stereo: &[(f32, f32)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(stereo.len() * 4);
    for &(l, r) in stereo {
        let l16 = (l.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        let r16 = (r.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&l16.to_le_bytes());
        out.extend_from_slice(&r16.to_le_bytes());
    }
    out
}

/// Full conversion pipeline for one raw chunk: decode, resample,
/// downmix, clamp, pack. If `silent`, returns zero-filled canonical PCM
/// of equivalent target-rate length instead of decoding.
pub fn convert_chunk(
    raw: &RawSample,
    silent: bool,
    native: NativeFormat,
    target_rate: u32,
) -> Vec<u8> {
    if silent {
        let channels = native.channels.max(1) as usize;
        let src_frames = raw.len() / channels;
        let dst_frames = ((src_frames as u64 * target_rate as u64) / native.sample_rate.max(1) as u64).max(1) as usize;
        return vec![0u8; dst_frames * super::PCM_FRAME_BYTES];
    }
    let f32s = decode_to_f32(raw);
    let resampled = interpolate_rate(&f32s, native.channels, native.sample_rate, target_rate);
    let stereo = downmix_to_stereo(&resampled, native.channels);
    samples_to_pcm16(&stereo)
}

/// `L = sum(pcm_i.left * gain_i/100)`, `R = sum(pcm_i.right * gain_i/100)`,
/// computed in 64-bit arithmetic then clamped to `i16` range.
pub fn mix_frame(sources: &[(i16, i16)], gains: &[u8]) -> (i16, i16) {
    let mut l: i64 = 0;
    let mut r: i64 = 0;
    for (&(sl, sr), &gain) in sources.iter().zip(gains.iter()) {
        l += (sl as i64 * gain as i64) / 100;
        r += (sr as i64 * gain as i64) / 100;
    }
    (
        l.clamp(i16::MIN as i64, i16::MAX as i64) as i16,
        r.clamp(i16::MIN as i64, i16::MAX as i64) as i16,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::SampleFormatKind;

    #[test]
    fn i16_roundtrip_identity_at_canonical_format() {
        let raw = RawSample::I16(vec![1000, -1000, 2000, -2000]);
        let native = NativeFormat {
            sample_rate: 48_000,
            channels: 2,
            sample_format: SampleFormatKind::I16,
        };
        let pcm = convert_chunk(&raw, false, native, 48_000);
        // Already-stereo, already-48kHz input round-trips modulo clamping.
        assert_eq!(pcm.len(), 8);
        let l0 = i16::from_le_bytes([pcm[0], pcm[1]]);
        assert_eq!(l0, 1000);
    }

    #[test]
    fn mono_duplicates_to_both_channels() {
        let raw = RawSample::F32(vec![0.5, -0.5]);
        let native = NativeFormat {
            sample_rate: 48_000,
            channels: 1,
            sample_format: SampleFormatKind::F32,
        };
        let pcm = convert_chunk(&raw, false, native, 48_000);
        assert_eq!(pcm.len(), 8); // 2 frames * 4 bytes
        let l0 = i16::from_le_bytes([pcm[0], pcm[1]]);
        let r0 = i16::from_le_bytes([pcm[2], pcm[3]]);
        assert_eq!(l0, r0);
    }

    #[test]
    fn silence_produces_zero_filled_canonical_pcm() {
        let raw = RawSample::I16(vec![0; 480]); // unused, silent path ignores values
        let native = NativeFormat {
            sample_rate: 48_000,
            channels: 2,
            sample_format: SampleFormatKind::I16,
        };
        let pcm = convert_chunk(&raw, true, native, 48_000);
        assert!(pcm.iter().all(|&b| b == 0));
        assert_eq!(pcm.len(), 480);
    }

    #[test]
    fn clamping_saturates_out_of_range_values() {
        let (l, r) = mix_frame(&[(i16::MAX, i16::MIN), (i16::MAX, i16::MIN)], &[100, 100]);
        assert_eq!(l, i16::MAX);
        assert_eq!(r, i16::MIN);
    }

    #[test]
    fn gain_zero_contributes_silence() {
        let (l, r) = mix_frame(&[(12_345, -12_345)], &[0]);
        assert_eq!((l, r), (0, 0));
    }

    #[test]
    fn downsampling_from_higher_source_rate_shrinks_frame_count() {
        let interleaved: Vec<f32> = (0..200).map(|i| i as f32 / 200.0).collect(); // 100 stereo frames
        let out = interpolate_rate(&interleaved, 2, 96_000, 48_000);
        assert!(out.len() / 2 < 100);
    }

    #[test]
    fn upsampling_from_lower_source_rate_grows_frame_count() {
        let interleaved: Vec<f32> = vec![0.0, 0.0, 1.0, 1.0]; // 2 stereo frames at 24kHz
        let out = interpolate_rate(&interleaved, 2, 24_000, 48_000);
        assert!(out.len() / 2 > 2);
    }
}
