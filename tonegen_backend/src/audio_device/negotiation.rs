use crate::audio_device::enumeration::{ConfigRange, DeviceInfo};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use std::cmp::Reverse;
use std::fmt;
use tonegen_core::StreamSpec;

/// Block size when the host does not report a buffer range.
pub const FALLBACK_BUFFER_FRAMES: u32 = 512;
/// Floor applied to reported minimums; some hosts advertise a minimum of 1.
pub const MIN_BUFFER_FRAMES: u32 = 64;

/// Formats the output callback can convert into.
pub const CALLBACK_FORMATS: [SampleFormat; 3] = [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRatePriority {
    /// Fail unless the device runs at the requested rate.
    Exact,
    /// Take the closest rate the chosen config supports.
    Closest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSizePriority {
    /// Smallest block the device reports; the requested size is ignored.
    DeviceMinimum,
    /// Requested size, clamped into the device range.
    Requested,
}

#[derive(Debug, Clone)]
pub struct ConfigurationRequest {
    pub sample_rate: u32,
    pub sample_rate_priority: SampleRatePriority,

    pub channels: u16,

    pub buffer_size: Option<u32>,
    pub buffer_size_priority: BufferSizePriority,

    pub sample_format: SampleFormat,
    pub allow_format_conversion: bool,
}

impl ConfigurationRequest {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            sample_rate_priority: SampleRatePriority::Closest,
            channels: 1,
            buffer_size: None,
            buffer_size_priority: BufferSizePriority::DeviceMinimum,
            sample_format: SampleFormat::I16,
            allow_format_conversion: true,
        }
    }

    /// Mono i16 at the stream's rate; an explicit block size is honoured,
    /// otherwise the device minimum is used.
    pub fn from_stream_spec(spec: &StreamSpec) -> Self {
        let request = Self::new(spec.sample_rate).with_channels(spec.channels.max(1));
        match spec.buffer_frames {
            Some(frames) => request
                .with_buffer_size(frames as u32)
                .with_buffer_size_priority(BufferSizePriority::Requested),
            None => request,
        }
    }

    pub fn with_sample_rate_priority(mut self, priority: SampleRatePriority) -> Self {
        self.sample_rate_priority = priority;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_buffer_size(mut self, size: u32) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub fn with_buffer_size_priority(mut self, priority: BufferSizePriority) -> Self {
        self.buffer_size_priority = priority;
        self
    }

    pub fn allow_format_conversion(mut self, allow: bool) -> Self {
        self.allow_format_conversion = allow;
        self
    }
}

#[derive(Debug, Clone)]
pub struct NegotiatedConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: BufferSize,
    /// Frames per block the engine should render.
    pub buffer_frames: u32,
    pub sample_format: SampleFormat,
    pub stream_config: StreamConfig,

    pub sample_rate_matched: bool,
    pub channels_matched: bool,
    pub format_matched: bool,
}

impl NegotiatedConfig {
    /// What the engine writes: always mono i16, at the device rate.
    pub fn stream_spec(&self) -> StreamSpec {
        StreamSpec::mono(self.sample_rate).with_buffer_frames(self.buffer_frames as usize)
    }
}

impl fmt::Display for NegotiatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch @ {}Hz, buffer: {} frames ({:.1} ms), format: {:?}",
            self.channels,
            self.sample_rate,
            self.buffer_frames,
            ConfigNegotiator::calculate_latency_ms(self.sample_rate, self.buffer_frames),
            self.sample_format
        )
    }
}

#[derive(Debug, Clone)]
pub enum NegotiationError {
    SampleRateNotSupported { requested: u32, available: Vec<u32> },
    FormatNotSupported { requested: SampleFormat, available: Vec<SampleFormat> },
    NoCompatibleConfiguration,
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SampleRateNotSupported { requested, available } => {
                write!(f, "device cannot run at {} Hz (supports {:?})", requested, available)
            }
            Self::FormatNotSupported { requested, available } => {
                write!(f, "no usable sample format for {:?} output (device offers {:?})", requested, available)
            }
            Self::NoCompatibleConfiguration => {
                write!(f, "device reports no usable output configuration")
            }
        }
    }
}

impl std::error::Error for NegotiationError {}

pub type NegotiationResult<T> = Result<T, NegotiationError>;

pub struct ConfigNegotiator;
impl ConfigNegotiator {
    pub fn negotiate(
        device_info: &DeviceInfo,
        request: &ConfigurationRequest,
    ) -> NegotiationResult<NegotiatedConfig> {
        let range = Self::pick_range(device_info, request)?;

        let sample_rate = Self::negotiate_sample_rate(device_info, &range, request)?;
        let (buffer_size, buffer_frames) = Self::negotiate_buffer_size(device_info, request);

        let stream_config = StreamConfig {
            channels: range.channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size,
        };

        Ok(NegotiatedConfig {
            sample_rate,
            channels: range.channels,
            buffer_size,
            buffer_frames,
            sample_format: range.sample_format,
            stream_config,
            sample_rate_matched: sample_rate == request.sample_rate,
            channels_matched: range.channels == request.channels,
            format_matched: range.sample_format == request.sample_format,
        })
    }

    /// Best config range: rate support first, then format, then channel count,
    /// preferring fewer channels among equals.
    fn pick_range(device_info: &DeviceInfo, request: &ConfigurationRequest) -> NegotiationResult<ConfigRange> {
        let defaults = [ConfigRange {
            channels: device_info.default_channels,
            min_sample_rate: device_info.default_sample_rate,
            max_sample_rate: device_info.default_sample_rate,
            sample_format: device_info.default_sample_format,
        }];
        let ranges: &[ConfigRange] = if device_info.config_ranges.is_empty() {
            &defaults
        } else {
            &device_info.config_ranges
        };

        let usable: Vec<&ConfigRange> = ranges
            .iter()
            .filter(|r| CALLBACK_FORMATS.contains(&r.sample_format))
            .filter(|r| request.allow_format_conversion || r.sample_format == request.sample_format)
            .collect();

        if usable.is_empty() {
            return Err(NegotiationError::FormatNotSupported {
                requested: request.sample_format,
                available: device_info.supported_sample_formats.clone(),
            });
        }

        usable
            .into_iter()
            .max_by_key(|r| {
                let score = (r.contains_rate(request.sample_rate) as u8) << 2
                    | ((r.sample_format == request.sample_format) as u8) << 1
                    | (r.channels == request.channels) as u8;
                (score, Reverse(r.channels))
            })
            .copied()
            .ok_or(NegotiationError::NoCompatibleConfiguration)
    }

    fn negotiate_sample_rate(
        device_info: &DeviceInfo,
        range: &ConfigRange,
        request: &ConfigurationRequest,
    ) -> NegotiationResult<u32> {
        if range.contains_rate(request.sample_rate) {
            return Ok(request.sample_rate);
        }
        match request.sample_rate_priority {
            SampleRatePriority::Exact => Err(NegotiationError::SampleRateNotSupported {
                requested: request.sample_rate,
                available: device_info.supported_sample_rates.clone(),
            }),
            SampleRatePriority::Closest => {
                Ok(request.sample_rate.clamp(range.min_sample_rate, range.max_sample_rate))
            }
        }
    }

    fn negotiate_buffer_size(device_info: &DeviceInfo, request: &ConfigurationRequest) -> (BufferSize, u32) {
        let range = device_info.min_buffer_frames.zip(device_info.max_buffer_frames);
        let requested = match request.buffer_size_priority {
            BufferSizePriority::Requested => request.buffer_size,
            BufferSizePriority::DeviceMinimum => None,
        };

        match (requested, range) {
            (Some(frames), Some((min, max))) => {
                let frames = frames.clamp(min, max.max(min));
                (BufferSize::Fixed(frames), frames)
            }
            // without a reported range a fixed size may be refused; let the
            // host pick and render in the requested block size
            (Some(frames), None) => (BufferSize::Default, frames.max(1)),
            (None, Some((min, max))) => {
                let frames = min.max(MIN_BUFFER_FRAMES).min(max.max(min));
                (BufferSize::Fixed(frames), frames)
            }
            (None, None) => (BufferSize::Default, FALLBACK_BUFFER_FRAMES),
        }
    }

    /// Block size used when nothing is requested.
    pub fn device_minimum_frames(device_info: &DeviceInfo) -> u32 {
        Self::negotiate_buffer_size(device_info, &ConfigurationRequest::new(device_info.default_sample_rate)).1
    }

    pub fn calculate_latency_ms(sample_rate: u32, buffer_size: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_device::enumeration::DeviceEnumerator;

    fn device(ranges: Vec<ConfigRange>, buffer: (Option<u32>, Option<u32>)) -> DeviceInfo {
        DeviceEnumerator::summarize(
            "test device".into(),
            cpal::default_host().id(),
            true,
            (48_000, 2, SampleFormat::F32),
            buffer,
            ranges,
            0,
        )
    }

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> ConfigRange {
        ConfigRange { channels, min_sample_rate: min, max_sample_rate: max, sample_format: format }
    }

    #[test]
    fn test_exact_mono_i16_match() {
        let info = device(
            vec![range(2, 44_100, 48_000, SampleFormat::F32), range(1, 8_000, 96_000, SampleFormat::I16)],
            (Some(32), Some(8192)),
        );
        let config = ConfigNegotiator::negotiate(&info, &ConfigurationRequest::new(44_100)).unwrap();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.channels, 1);
        assert_eq!(config.sample_format, SampleFormat::I16);
        assert!(config.sample_rate_matched && config.channels_matched && config.format_matched);
        // device minimum, floored
        assert_eq!(config.buffer_frames, MIN_BUFFER_FRAMES);
        assert_eq!(config.buffer_size, BufferSize::Fixed(MIN_BUFFER_FRAMES));
    }

    #[test]
    fn test_falls_back_to_stereo_float() {
        let info = device(vec![range(2, 48_000, 48_000, SampleFormat::F32)], (Some(256), Some(4096)));
        let config = ConfigNegotiator::negotiate(&info, &ConfigurationRequest::new(44_100)).unwrap();
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_format, SampleFormat::F32);
        assert!(!config.sample_rate_matched);
        assert_eq!(config.buffer_frames, 256);
        assert_eq!(config.stream_spec(), StreamSpec::mono(48_000).with_buffer_frames(256));
    }

    #[test]
    fn test_rate_support_beats_format() {
        let info = device(
            vec![range(1, 48_000, 48_000, SampleFormat::I16), range(2, 44_100, 44_100, SampleFormat::F32)],
            (None, None),
        );
        let config = ConfigNegotiator::negotiate(&info, &ConfigurationRequest::new(44_100)).unwrap();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.sample_format, SampleFormat::F32);
    }

    #[test]
    fn test_exact_rate_priority_fails() {
        let info = device(vec![range(2, 48_000, 48_000, SampleFormat::F32)], (None, None));
        let request = ConfigurationRequest::new(44_100).with_sample_rate_priority(SampleRatePriority::Exact);
        assert!(matches!(
            ConfigNegotiator::negotiate(&info, &request),
            Err(NegotiationError::SampleRateNotSupported { requested: 44_100, .. })
        ));
    }

    #[test]
    fn test_unusable_formats_rejected() {
        let info = device(vec![range(2, 48_000, 48_000, SampleFormat::I32)], (None, None));
        assert!(matches!(
            ConfigNegotiator::negotiate(&info, &ConfigurationRequest::new(48_000)),
            Err(NegotiationError::FormatNotSupported { .. })
        ));

        let float_only = device(vec![range(1, 44_100, 44_100, SampleFormat::F32)], (None, None));
        let strict = ConfigurationRequest::new(44_100).allow_format_conversion(false);
        assert!(ConfigNegotiator::negotiate(&float_only, &strict).is_err());
    }

    #[test]
    fn test_requested_buffer_is_clamped() {
        let info = device(vec![range(1, 44_100, 44_100, SampleFormat::I16)], (Some(128), Some(1024)));
        let spec = StreamSpec::mono(44_100).with_buffer_frames(4096);
        let config = ConfigNegotiator::negotiate(&info, &ConfigurationRequest::from_stream_spec(&spec)).unwrap();
        assert_eq!(config.buffer_frames, 1024);
        assert_eq!(config.buffer_size, BufferSize::Fixed(1024));
    }

    #[test]
    fn test_unknown_buffer_range() {
        let info = device(vec![range(1, 44_100, 44_100, SampleFormat::I16)], (None, None));
        assert_eq!(ConfigNegotiator::device_minimum_frames(&info), FALLBACK_BUFFER_FRAMES);

        let spec = StreamSpec::mono(44_100).with_buffer_frames(300);
        let config = ConfigNegotiator::negotiate(&info, &ConfigurationRequest::from_stream_spec(&spec)).unwrap();
        assert_eq!(config.buffer_size, BufferSize::Default);
        assert_eq!(config.buffer_frames, 300);
    }

    #[test]
    fn test_no_ranges_uses_default_config() {
        let info = device(Vec::new(), (None, None));
        let config = ConfigNegotiator::negotiate(&info, &ConfigurationRequest::new(44_100)).unwrap();
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.channels, 2);
    }

    #[test]
    fn test_latency() {
        assert!((ConfigNegotiator::calculate_latency_ms(48_000, 480) - 10.0).abs() < 1e-4);
        assert_eq!(ConfigNegotiator::calculate_latency_ms(0, 480), 0.0);
    }
}
