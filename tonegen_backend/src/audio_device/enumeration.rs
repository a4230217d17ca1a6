use cpal::traits::{DeviceTrait, HostTrait};
use std::fmt;
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub id: cpal::HostId,
    pub name: String,
    pub is_available: bool,
    pub is_default: bool,
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default {
            write!(f, "{}*", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// One supported configuration range as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRange {
    pub channels: u16,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    pub sample_format: cpal::SampleFormat,
}

impl ConfigRange {
    pub fn contains_rate(&self, rate: u32) -> bool {
        rate >= self.min_sample_rate && rate <= self.max_sample_rate
    }
}

#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub host_id: cpal::HostId,
    pub is_default: bool,

    pub supported_sample_rates: Vec<u32>,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    pub default_sample_rate: u32,

    pub supported_channels: Vec<u16>,
    pub max_channels: u16,
    pub default_channels: u16,

    pub supported_sample_formats: Vec<cpal::SampleFormat>,
    pub default_sample_format: cpal::SampleFormat,

    /// Buffer range of the default config, when the host reports one.
    pub min_buffer_frames: Option<u32>,
    pub max_buffer_frames: Option<u32>,

    pub config_ranges: Vec<ConfigRange>,

    pub(crate) device_index: usize,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}{} ({}: {}ch, {} Hz, {:?})",
            self.device_index,
            self.name,
            if self.is_default { " *" } else { "" },
            self.host_id.name(),
            self.default_channels,
            self.default_sample_rate,
            self.default_sample_format
        )
    }
}

pub type EnumResult<T> = Result<T, EnumError>;

#[derive(Debug)]
pub enum EnumError {
    NoDevicesFound,
    DeviceNotFound(String),
    QueryFailed(String),
    InvalidDeviceIndex(usize),
}

impl fmt::Display for EnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevicesFound => write!(f, "no audio output devices found"),
            Self::DeviceNotFound(name) => write!(f, "no output device matching '{}'", name),
            Self::QueryFailed(msg) => write!(f, "device query failed: {}", msg),
            Self::InvalidDeviceIndex(idx) => write!(f, "device #{} is not known to this enumerator", idx),
        }
    }
}

impl std::error::Error for EnumError {}

/// Output devices across every available host, scanned once on creation.
pub struct DeviceEnumerator {
    hosts: Vec<HostInfo>,
    devices: Vec<(cpal::Device, DeviceInfo)>,
}

impl DeviceEnumerator {
    pub fn new() -> EnumResult<Self> {
        let hosts = Self::enumerate_hosts();
        let devices = Self::scan_output_devices(&hosts)?;

        Ok(Self { hosts, devices })
    }

    pub fn enumerate_hosts() -> Vec<HostInfo> {
        let default_host_id = cpal::default_host().id();
        let available = cpal::available_hosts();

        cpal::ALL_HOSTS
            .iter()
            .map(|&host_id| HostInfo {
                id: host_id,
                name: host_id.name().to_string(),
                is_available: available.contains(&host_id),
                is_default: host_id == default_host_id,
            })
            .collect()
    }

    fn scan_output_devices(hosts: &[HostInfo]) -> EnumResult<Vec<(cpal::Device, DeviceInfo)>> {
        let mut all_devices = Vec::new();
        let mut device_index = 0;

        // default host first so its devices win name lookups
        let mut ordered: Vec<&HostInfo> = hosts.iter().filter(|h| h.is_available).collect();
        ordered.sort_by_key(|h| !h.is_default);

        for host_info in ordered {
            let host = match cpal::host_from_id(host_info.id) {
                Ok(h) => h,
                Err(_) => continue,
            };

            let default_name = host.default_output_device().and_then(|d| d.name().ok());

            let devices = match host.output_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    log::warn!("{}: failed to list output devices: {}", host_info.name, e);
                    continue;
                }
            };

            for device in devices {
                let device_name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
                let is_default = host_info.is_default
                    && default_name.as_deref() == Some(device_name.as_str());

                match Self::query_device_info(&device, host_info.id, is_default, device_index) {
                    Ok(info) => {
                        all_devices.push((device, info));
                        device_index += 1;
                    }
                    Err(e) => log::debug!("skipping {}: {}", device_name, e),
                }
            }
        }

        if all_devices.is_empty() {
            return Err(EnumError::NoDevicesFound);
        }

        Ok(all_devices)
    }

    fn query_device_info(
        device: &cpal::Device,
        host_id: cpal::HostId,
        is_default: bool,
        device_index: usize,
    ) -> EnumResult<DeviceInfo> {
        let query = |what: &str, e: &dyn fmt::Display| EnumError::QueryFailed(format!("{}: {}", what, e));

        let name = device.name().map_err(|e| query("name", &e))?;
        let default_config = device.default_output_config().map_err(|e| query("default output config", &e))?;
        let (min_buffer_frames, max_buffer_frames) = match default_config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => (Some(*min), Some(*max)),
            cpal::SupportedBufferSize::Unknown => (None, None),
        };

        let configs = device.supported_output_configs().map_err(|e| query("supported output configs", &e))?;
        let config_ranges: Vec<ConfigRange> = configs
            .map(|range| ConfigRange {
                channels: range.channels(),
                min_sample_rate: range.min_sample_rate().0,
                max_sample_rate: range.max_sample_rate().0,
                sample_format: range.sample_format(),
            })
            .collect();

        Ok(Self::summarize(
            name,
            host_id,
            is_default,
            (default_config.sample_rate().0, default_config.channels(), default_config.sample_format()),
            (min_buffer_frames, max_buffer_frames),
            config_ranges,
            device_index,
        ))
    }

    /// Fold the config ranges into the aggregate fields of a `DeviceInfo`.
    pub(crate) fn summarize(
        name: String,
        host_id: cpal::HostId,
        is_default: bool,
        (default_sample_rate, default_channels, default_sample_format): (u32, u16, cpal::SampleFormat),
        (min_buffer_frames, max_buffer_frames): (Option<u32>, Option<u32>),
        config_ranges: Vec<ConfigRange>,
        device_index: usize,
    ) -> DeviceInfo {
        let mut sample_rates = Vec::new();
        let mut min_sample_rate = u32::MAX;
        let mut max_sample_rate = 0u32;
        let mut supported_channels = Vec::new();
        let mut max_channels = 0u16;
        let mut sample_formats = Vec::new();

        for range in &config_ranges {
            min_sample_rate = min_sample_rate.min(range.min_sample_rate);
            max_sample_rate = max_sample_rate.max(range.max_sample_rate);

            // Add common sample rates within this range
            for &rate in &[8000, 11025, 16000, 22050, 32000, 44100, 48000, 88200, 96000, 176400, 192000] {
                if range.contains_rate(rate) {
                    sample_rates.push(rate);
                }
            }

            if !supported_channels.contains(&range.channels) {
                supported_channels.push(range.channels);
            }
            max_channels = max_channels.max(range.channels);

            if !sample_formats.contains(&range.sample_format) {
                sample_formats.push(range.sample_format);
            }
        }

        if config_ranges.is_empty() {
            min_sample_rate = default_sample_rate;
            max_sample_rate = default_sample_rate;
        }

        sample_rates.sort_unstable();
        sample_rates.dedup();
        supported_channels.sort_unstable();

        DeviceInfo {
            name,
            host_id,
            is_default,
            supported_sample_rates: sample_rates,
            min_sample_rate,
            max_sample_rate,
            default_sample_rate,
            supported_channels,
            max_channels: max_channels.max(default_channels),
            default_channels,
            supported_sample_formats: sample_formats,
            default_sample_format,
            min_buffer_frames,
            max_buffer_frames,
            config_ranges,
            device_index,
        }
    }

    pub fn available_hosts(&self) -> Vec<&HostInfo> {
        self.hosts.iter().filter(|h| h.is_available).collect()
    }

    pub fn output_devices(&self) -> Vec<&DeviceInfo> {
        self.devices.iter().map(|(_, info)| info).collect()
    }

    /// The default host's default output, or the first device found.
    pub fn default_output_device(&self) -> EnumResult<&DeviceInfo> {
        self.devices
            .iter()
            .map(|(_, info)| info)
            .find(|info| info.is_default)
            .or_else(|| self.devices.first().map(|(_, info)| info))
            .ok_or(EnumError::NoDevicesFound)
    }

    /// Case-insensitive lookup: an exact name beats a prefix, which beats a
    /// substring. Earlier devices win ties.
    pub fn find_device_by_name(&self, name: &str) -> EnumResult<&DeviceInfo> {
        let wanted = name.to_lowercase();
        let rank = |info: &DeviceInfo| {
            let candidate = info.name.to_lowercase();
            if candidate == wanted {
                Some(0)
            } else if candidate.starts_with(&wanted) {
                Some(1)
            } else if candidate.contains(&wanted) {
                Some(2)
            } else {
                None
            }
        };

        self.output_devices()
            .into_iter()
            .filter_map(|info| rank(info).map(|r| (r, info)))
            .min_by_key(|(r, _)| *r)
            .map(|(_, info)| info)
            .ok_or_else(|| EnumError::DeviceNotFound(name.to_string()))
    }

    /// `name` if given, otherwise the default output.
    pub fn resolve(&self, name: Option<&str>) -> EnumResult<&DeviceInfo> {
        match name {
            Some(name) => self.find_device_by_name(name),
            None => self.default_output_device(),
        }
    }

    /// The cpal handle behind a `DeviceInfo` from this enumerator.
    pub fn select_device(&self, device_info: &DeviceInfo) -> EnumResult<&cpal::Device> {
        match self.devices.get(device_info.device_index) {
            Some((device, info)) if info.name == device_info.name => Ok(device),
            _ => Err(EnumError::InvalidDeviceIndex(device_info.device_index)),
        }
    }

    /// Human-readable listing for `--list-devices`.
    pub fn write_device_list<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let hosts: Vec<String> = self.available_hosts().iter().map(|h| h.to_string()).collect();
        writeln!(out, "hosts: {}", hosts.join(", "))?;

        for info in self.output_devices() {
            writeln!(out, "{}", info)?;
            writeln!(
                out,
                "    rates {}-{} Hz, up to {} channels, formats {:?}",
                info.min_sample_rate, info.max_sample_rate, info.max_channels, info.supported_sample_formats
            )?;
            let mono_i16 = info
                .config_ranges
                .iter()
                .any(|r| r.channels == 1 && r.sample_format == cpal::SampleFormat::I16);
            let buffer = match (info.min_buffer_frames, info.max_buffer_frames) {
                (Some(min), Some(max)) => format!("{}-{} frames", min, max),
                _ => "host default".to_string(),
            };
            writeln!(out, "    buffer {}, native mono i16: {}", buffer, if mono_i16 { "yes" } else { "no" })?;
        }
        Ok(())
    }
}
