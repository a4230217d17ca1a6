pub mod cpal_sink;
pub mod enumeration;
pub mod negotiation;

pub use cpal_sink::{CpalOutput, CpalSink};
pub use enumeration::{DeviceEnumerator, DeviceInfo};
