//! Audio output contract.
//!
//! An [`AudioOutput`] opens [`AudioSink`] handles. Every sink method takes
//! `&self` so one handle can be shared between the control thread (gain,
//! pause, release) and the streaming worker (write).

pub mod memory;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SinkResult;

pub use memory::{MemoryOutput, MemorySink};

/// Lifecycle of a sink handle. `Released` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Uninitialized,
    Ready,
    Playing,
    Paused,
    Released,
}

impl SinkState {
    /// States in which blocks may be written.
    #[inline]
    pub fn is_writable(self) -> bool {
        matches!(self, SinkState::Ready | SinkState::Playing)
    }

    /// States in which the handle must be reopened before use.
    #[inline]
    pub fn needs_reopen(self) -> bool {
        matches!(self, SinkState::Uninitialized | SinkState::Released)
    }
}

impl fmt::Display for SinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SinkState::Uninitialized => "uninitialized",
            SinkState::Ready => "ready",
            SinkState::Playing => "playing",
            SinkState::Paused => "paused",
            SinkState::Released => "released",
        };
        f.write_str(name)
    }
}

/// What the engine asks for when opening a sink, and what the sink reports
/// back once opened. Samples are always signed 16-bit PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per block. `None` asks for the device minimum.
    pub buffer_frames: Option<usize>,
}

impl StreamSpec {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            buffer_frames: None,
        }
    }

    pub fn with_buffer_frames(mut self, frames: usize) -> Self {
        self.buffer_frames = Some(frames);
        self
    }

    /// Playback time of `frames` frames at this rate.
    pub fn duration_of(&self, frames: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

impl fmt::Display for StreamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ch @ {}Hz, i16", self.channels, self.sample_rate)?;
        match self.buffer_frames {
            Some(frames) => write!(f, ", {} frames", frames),
            None => write!(f, ", device minimum"),
        }
    }
}

pub trait AudioSink: Send + Sync + 'static {
    /// The configuration actually in effect. `buffer_frames` is always set.
    fn spec(&self) -> StreamSpec;

    fn state(&self) -> SinkState;

    /// Queue one block of mono samples. Blocks until the sink accepts it.
    fn write(&self, block: &[i16]) -> SinkResult<usize>;

    /// Linear gain in `[0.0, 1.0]`, applied in real time.
    fn set_gain(&self, gain: f32);

    fn gain(&self) -> f32;

    fn play(&self) -> SinkResult<()>;

    fn pause(&self) -> SinkResult<()>;

    /// Drop everything queued but not yet played.
    fn flush(&self) -> SinkResult<()>;

    /// Close the handle. Releasing twice is a no-op.
    fn release(&self);
}

pub trait AudioOutput: Send + Sync + 'static {
    type Sink: AudioSink;

    /// Smallest block the output can stream without underrunning. Only
    /// consulted when an opened sink does not report its own block size.
    fn min_buffer_size(&self, spec: &StreamSpec) -> usize;

    fn open(&self, spec: &StreamSpec) -> SinkResult<Self::Sink>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writable_states() {
        assert!(SinkState::Ready.is_writable());
        assert!(SinkState::Playing.is_writable());
        assert!(!SinkState::Paused.is_writable());
        assert!(!SinkState::Released.is_writable());
        assert!(!SinkState::Uninitialized.is_writable());
    }

    #[test]
    fn test_reopen_states() {
        assert!(SinkState::Released.needs_reopen());
        assert!(SinkState::Uninitialized.needs_reopen());
        assert!(!SinkState::Paused.needs_reopen());
    }

    #[test]
    fn test_duration_of_block() {
        let spec = StreamSpec::mono(44_100);
        assert_eq!(spec.duration_of(44_100), Duration::from_secs(1));
        assert_eq!(StreamSpec::mono(0).duration_of(10), Duration::ZERO);
    }
}
