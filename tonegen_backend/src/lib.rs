//! Device-facing half of the tone generator: the cpal output and the
//! engine that streams blocks into any `AudioOutput`.

pub mod audio_device;
pub mod rt_processing;

pub use audio_device::{CpalOutput, CpalSink, DeviceEnumerator};
pub use rt_processing::engine::{OscillatorEngine, PlaybackState};
pub use rt_processing::performance::{StreamMonitor, StreamSnapshot};
