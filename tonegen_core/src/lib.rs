//! Device-independent building blocks of the tone generator: waveform
//! tables, the phase accumulator, block rendering and the sink contract.

pub mod buffer_filler;
pub mod config;
pub mod error;
pub mod pcm;
pub mod phase;
pub mod sink;
pub mod waveform;

pub use buffer_filler::{BufferFiller, fill_block};
pub use config::EngineConfig;
pub use error::{ConfigError, EngineError, SinkError};
pub use phase::{Interpolation, PhaseAccumulator};
pub use sink::{AudioOutput, AudioSink, SinkState, StreamSpec};
pub use waveform::{WaveTables, Waveform, WaveformTable};
