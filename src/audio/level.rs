//! Per-frame energy measurement

use super::frame::AudioFrame;

/// RMS energy of a frame's normalized samples
///
/// `sqrt(sum((s / 32768)^2) / len)`. Cheap proxy for perceived loudness,
/// used for speech/silence classification. Empty input returns 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn frame_energy(frame: &AudioFrame) -> f32 {
    if frame.samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = frame
        .samples
        .iter()
        .map(|&s| {
            let normalized = f32::from(s) / 32768.0;
            normalized * normalized
        })
        .sum();
    (sum_squares / frame.samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(samples: Vec<i16>) -> AudioFrame {
        AudioFrame { seq: 0, samples }
    }

    #[test]
    fn silence_has_zero_energy() {
        assert!(frame_energy(&frame_of(vec![0; 320])) < 1e-6);
    }

    #[test]
    fn empty_frame_is_zero() {
        assert!(frame_energy(&frame_of(vec![])).abs() < f32::EPSILON);
    }

    #[test]
    fn constant_amplitude_matches_expected_rms() {
        // All samples at half scale: RMS is exactly 0.5
        let frame = frame_of(vec![16384; 320]);
        let energy = frame_energy(&frame);
        assert!((energy - 0.5).abs() < 1e-4);
    }

    #[test]
    fn louder_frames_have_higher_energy() {
        let quiet = frame_of(vec![100; 320]);
        let loud = frame_of(vec![10000; 320]);
        assert!(frame_energy(&loud) > frame_energy(&quiet));
    }
}
