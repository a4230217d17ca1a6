//! Fixed-point phase accumulator.
//!
//! The cursor is kept in table-index units with 32 fractional bits, so the
//! per-sample step `frequency * table_len / sample_rate` keeps its sub-sample
//! part. When the table length equals the sample rate the step is a whole
//! number of entries and the output matches a plain integer cursor exactly.

use serde::{Deserialize, Serialize};

use crate::waveform::WaveformTable;

const FRAC_BITS: u32 = 32;
const FRAC_MASK: u64 = (1 << FRAC_BITS) - 1;

/// How a table is read at a fractional cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Take the entry at the integer part of the cursor.
    #[default]
    Nearest,
    /// Blend the two neighbouring entries.
    Linear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseAccumulator {
    phase: u64,
    increment: u64,
    table_len: usize,
    wrap: u64,
}

impl PhaseAccumulator {
    pub fn new(table_len: usize) -> Self {
        let table_len = table_len.max(1);
        Self {
            phase: 0,
            increment: 0,
            table_len,
            wrap: (table_len as u64) << FRAC_BITS,
        }
    }

    /// Recompute the step for `frequency` Hz at `sample_rate`.
    pub fn set_frequency(&mut self, frequency: u32, sample_rate: u32) {
        self.increment = phase_increment(frequency, self.table_len, sample_rate);
    }

    #[inline]
    pub fn increment(&self) -> u64 {
        self.increment
    }

    /// Integer table index of the cursor.
    #[inline]
    pub fn position(&self) -> usize {
        (self.phase >> FRAC_BITS) as usize
    }

    /// Sub-entry part of the cursor in `[0, 1)`.
    #[inline]
    pub fn fraction(&self) -> f64 {
        (self.phase & FRAC_MASK) as f64 / (1u64 << FRAC_BITS) as f64
    }

    #[inline]
    pub fn table_len(&self) -> usize {
        self.table_len
    }

    #[inline]
    pub fn advance(&mut self) {
        self.phase = (self.phase + self.increment) % self.wrap;
    }

    /// Read `table` at the cursor without moving it.
    #[inline]
    pub fn sample(&self, table: &WaveformTable, interpolation: Interpolation) -> i16 {
        debug_assert_eq!(table.len(), self.table_len);
        let index = self.position();
        match interpolation {
            Interpolation::Nearest => table[index],
            Interpolation::Linear => {
                let a = table[index] as f64;
                let b = table[(index + 1) % self.table_len] as f64;
                (a + self.fraction() * (b - a)).round() as i16
            }
        }
    }
}

/// Fixed-point step per output sample.
#[inline]
pub fn phase_increment(frequency: u32, table_len: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    let scaled = ((frequency as u128) * (table_len as u128)) << FRAC_BITS;
    (scaled / sample_rate as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::tables::{generate_sawtooth, generate_square};

    #[test]
    fn test_integer_step_when_table_matches_rate() {
        let mut phase = PhaseAccumulator::new(44_100);
        phase.set_frequency(440, 44_100);
        assert_eq!(phase.increment(), 440 << FRAC_BITS);
        phase.advance();
        assert_eq!(phase.position(), 440);
        assert_eq!(phase.fraction(), 0.0);
    }

    #[test]
    fn test_wraps_after_one_table_at_one_hz() {
        let mut phase = PhaseAccumulator::new(44_100);
        phase.set_frequency(1, 44_100);
        for _ in 0..44_100 {
            phase.advance();
        }
        assert_eq!(phase.position(), 0);
        assert_eq!(phase.fraction(), 0.0);
    }

    #[test]
    fn test_wraps_steps_larger_than_table() {
        let mut phase = PhaseAccumulator::new(100);
        phase.set_frequency(250, 100);
        phase.advance();
        assert_eq!(phase.position(), 50);
    }

    #[test]
    fn test_decoupled_table_keeps_fraction() {
        // 1000 entry table played at 48 kHz, 480 Hz -> 10 entries per sample
        let mut phase = PhaseAccumulator::new(1000);
        phase.set_frequency(480, 48_000);
        phase.advance();
        assert_eq!(phase.position(), 10);

        // 1 Hz -> 1/48 entry per sample
        let mut slow = PhaseAccumulator::new(1000);
        slow.set_frequency(1, 48_000);
        slow.advance();
        assert_eq!(slow.position(), 0);
        assert!((slow.fraction() - 1000.0 / 48_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_linear_interpolation_midpoint() {
        let table = generate_sawtooth(4);
        let mut phase = PhaseAccumulator::new(4);
        // half an entry per sample
        phase.set_frequency(1, 8);
        phase.advance();
        let expected = ((table[0] as f64 + table[1] as f64) / 2.0).round() as i16;
        assert_eq!(phase.sample(&table, Interpolation::Linear), expected);
        assert_eq!(phase.sample(&table, Interpolation::Nearest), table[0]);
    }

    #[test]
    fn test_linear_interpolation_wraps_to_first_entry() {
        let table = generate_square(2);
        let mut phase = PhaseAccumulator::new(2);
        // cursor at 1.5
        phase.set_frequency(3, 4);
        phase.advance();
        assert_eq!(phase.position(), 1);
        let blended = phase.sample(&table, Interpolation::Linear);
        assert!(blended.abs() <= 1);
    }

    #[test]
    fn test_zero_sample_rate_is_silent_step() {
        assert_eq!(phase_increment(440, 44_100, 0), 0);
    }
}
