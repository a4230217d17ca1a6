pub mod tables;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use tables::WaveformTable;

/// Waveform selection. Indices follow picker order: 0 sine, 1 sawtooth,
/// 2 square, 3 triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Sawtooth,
    Square,
    Triangle,
}

impl Waveform {
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Sawtooth,
        Waveform::Square,
        Waveform::Triangle,
    ];

    /// 0=sine, 1=sawtooth, 2=square, 3=triangle; anything else falls back to sine.
    pub fn from_index(index: i32) -> Self {
        match index {
            1 => Waveform::Sawtooth,
            2 => Waveform::Square,
            3 => Waveform::Triangle,
            _ => Waveform::Sine,
        }
    }

    pub fn index(self) -> i32 {
        match self {
            Waveform::Sine => 0,
            Waveform::Sawtooth => 1,
            Waveform::Square => 2,
            Waveform::Triangle => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Square => "square",
            Waveform::Triangle => "triangle",
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown waveform `{0}` (expected sine, sawtooth, square, triangle or 0-3)")]
pub struct ParseWaveformError(String);

impl FromStr for Waveform {
    type Err = ParseWaveformError;

    /// Accepts a name (`"saw"` is short for sawtooth) or a picker index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(index) = trimmed.parse::<i32>() {
            return Ok(Waveform::from_index(index));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "sine" | "sin" => Ok(Waveform::Sine),
            "sawtooth" | "saw" => Ok(Waveform::Sawtooth),
            "square" | "sqr" => Ok(Waveform::Square),
            "triangle" | "tri" => Ok(Waveform::Triangle),
            _ => Err(ParseWaveformError(trimmed.to_string())),
        }
    }
}

/// All four tables, built once and kept side by side so switching is a lookup.
#[derive(Debug, Clone)]
pub struct WaveTables {
    sine: WaveformTable,
    sawtooth: WaveformTable,
    square: WaveformTable,
    triangle: WaveformTable,
}

impl WaveTables {
    pub fn new(len: usize) -> Self {
        log::debug!("generating waveform tables of {} samples", len);
        Self {
            sine: tables::generate_sine(len),
            sawtooth: tables::generate_sawtooth(len),
            square: tables::generate_square(len),
            triangle: tables::generate_triangle(len),
        }
    }

    #[inline]
    pub fn get(&self, waveform: Waveform) -> &WaveformTable {
        match waveform {
            Waveform::Sine => &self.sine,
            Waveform::Sawtooth => &self.sawtooth,
            Waveform::Square => &self.square,
            Waveform::Triangle => &self.triangle,
        }
    }

    /// Shared length of every table in the bank.
    pub fn table_len(&self) -> usize {
        self.sine.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_index_falls_back_to_sine() {
        assert_eq!(Waveform::from_index(0), Waveform::Sine);
        assert_eq!(Waveform::from_index(1), Waveform::Sawtooth);
        assert_eq!(Waveform::from_index(2), Waveform::Square);
        assert_eq!(Waveform::from_index(3), Waveform::Triangle);
        assert_eq!(Waveform::from_index(4), Waveform::Sine);
        assert_eq!(Waveform::from_index(-1), Waveform::Sine);
    }

    #[test]
    fn test_index_matches_from_index() {
        for waveform in Waveform::ALL {
            assert_eq!(Waveform::from_index(waveform.index()), waveform);
        }
    }

    #[test]
    fn test_parse_names_and_indices() {
        assert_eq!("square".parse::<Waveform>(), Ok(Waveform::Square));
        assert_eq!(" Saw ".parse::<Waveform>(), Ok(Waveform::Sawtooth));
        assert_eq!("3".parse::<Waveform>(), Ok(Waveform::Triangle));
        assert_eq!("9".parse::<Waveform>(), Ok(Waveform::Sine));
        assert!("noise".parse::<Waveform>().is_err());
    }

    #[test]
    fn test_bank_selects_matching_table() {
        let bank = WaveTables::new(64);
        assert_eq!(bank.table_len(), 64);
        assert_eq!(bank.get(Waveform::Square), &tables::generate_square(64));
        assert_eq!(bank.get(Waveform::Triangle), &tables::generate_triangle(64));
    }
}
