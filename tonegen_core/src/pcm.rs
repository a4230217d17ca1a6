//! Sample conversions shared by the sinks.

use dasp::Sample;

/// Percent volume to linear gain in `[0.0, 1.0]`.
#[inline]
pub fn volume_to_gain(volume: u32) -> f32 {
    volume.min(100) as f32 / 100.0
}

/// i16 PCM to a gain-scaled float in `[-1.0, 1.0]`.
#[inline]
pub fn scale(sample: i16, gain: f32) -> f32 {
    sample.to_sample::<f32>() * gain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_to_gain() {
        assert_eq!(volume_to_gain(0), 0.0);
        assert_eq!(volume_to_gain(50), 0.5);
        assert_eq!(volume_to_gain(100), 1.0);
        assert_eq!(volume_to_gain(150), 1.0);
    }

    #[test]
    fn test_scale_limits() {
        assert_eq!(scale(i16::MIN, 1.0), -1.0);
        assert_eq!(scale(0, 1.0), 0.0);
        assert_eq!(scale(i16::MIN, 0.5), -0.5);
        assert_eq!(scale(i16::MAX, 0.0), 0.0);
    }
}
