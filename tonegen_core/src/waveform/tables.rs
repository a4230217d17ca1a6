use std::f64::consts::PI;
use std::ops::Index;

/// One full cycle of a waveform as signed 16-bit PCM.
///
/// The length is fixed when the table is built; there is no way to grow or
/// shrink it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformTable {
    samples: Box<[i16]>,
}

impl WaveformTable {
    pub fn from_samples(samples: Vec<i16>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }
}

impl Index<usize> for WaveformTable {
    type Output = i16;

    #[inline]
    fn index(&self, index: usize) -> &i16 {
        &self.samples[index]
    }
}

/// Round and saturate into the i16 range.
#[inline]
fn to_pcm(value: f64) -> i16 {
    // float -> int casts saturate
    value.round() as i16
}

/// Sine table, inverted (starts heading towards `i16::MIN`).
pub fn generate_sine(len: usize) -> WaveformTable {
    let min = i16::MIN as f64;
    WaveformTable::from_samples(
        (0..len)
            .map(|i| to_pcm(min * (2.0 * PI * i as f64 / len as f64).sin()))
            .collect(),
    )
}

/// Linear ramp from `i16::MIN` at the first entry to `i16::MAX` at the last.
pub fn generate_sawtooth(len: usize) -> WaveformTable {
    let min = i16::MIN as f64;
    let span = i16::MAX as f64 - min;
    let last = len.saturating_sub(1).max(1) as f64;
    WaveformTable::from_samples(
        (0..len)
            .map(|i| to_pcm(min + span * i as f64 / last))
            .collect(),
    )
}

/// `i16::MAX` for the first half, `i16::MIN` for the second.
pub fn generate_square(len: usize) -> WaveformTable {
    let half = len / 2;
    WaveformTable::from_samples(
        (0..len)
            .map(|i| if i < half { i16::MAX } else { i16::MIN })
            .collect(),
    )
}

/// Triangle starting at zero: peak at a quarter cycle, trough at three quarters.
pub fn generate_triangle(len: usize) -> WaveformTable {
    let max = i16::MAX as f64;
    WaveformTable::from_samples(
        (0..len)
            .map(|i| {
                let ramp = 4.0 * max * i as f64 / len as f64;
                // breakpoints at exact quarters of the cycle, whatever `len % 4`
                let value = if 4 * i < len {
                    ramp
                } else if 4 * i < 3 * len {
                    2.0 * max - ramp
                } else {
                    ramp - 4.0 * max
                };
                to_pcm(value)
            })
            .collect(),
    )
}
