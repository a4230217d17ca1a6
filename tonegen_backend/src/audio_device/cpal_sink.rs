//! `AudioOutput` backed by a cpal output stream.
//!
//! cpal streams are not `Send` on every host, so each sink owns a device
//! thread that builds the stream, keeps it alive and executes play/pause
//! commands. Audio reaches the stream callback through a [`PlaybackSlot`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::SampleFormat;
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam::atomic::AtomicCell;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tonegen_core::error::{SinkError, SinkResult};
use tonegen_core::{AudioOutput, AudioSink, SinkState, StreamSpec};

use crate::audio_device::enumeration::DeviceEnumerator;
use crate::audio_device::negotiation::{
    ConfigNegotiator, ConfigurationRequest, FALLBACK_BUFFER_FRAMES, NegotiatedConfig,
};
use crate::rt_processing::callback::{PlaybackSlot, PushError};

/// Audio that may wait ahead of the block playing. The writer is an ordinary
/// thread, so small device periods get a deeper queue.
const MIN_QUEUED: Duration = Duration::from_millis(30);
/// Fewest blocks queued whatever the block length.
const MIN_QUEUE_BLOCKS: usize = 2;
/// Shortest time a write waits for the device before giving up.
const MIN_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

enum Command {
    Play(Sender<SinkResult<()>>),
    Pause(Sender<SinkResult<()>>),
    Release,
}

/// Opens sinks on a named output device, or the default one.
#[derive(Debug, Clone, Default)]
pub struct CpalOutput {
    device_name: Option<String>,
}

impl CpalOutput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }
}

impl AudioOutput for CpalOutput {
    type Sink = CpalSink;

    fn min_buffer_size(&self, _spec: &StreamSpec) -> usize {
        let frames = DeviceEnumerator::new().and_then(|enumerator| {
            enumerator
                .resolve(self.device_name.as_deref())
                .map(ConfigNegotiator::device_minimum_frames)
        });
        match frames {
            Ok(frames) => frames as usize,
            Err(e) => {
                log::warn!("could not query minimum buffer size ({}), using {}", e, FALLBACK_BUFFER_FRAMES);
                FALLBACK_BUFFER_FRAMES as usize
            }
        }
    }

    fn open(&self, spec: &StreamSpec) -> SinkResult<CpalSink> {
        CpalSink::open(self.device_name.clone(), spec)
    }
}

pub struct CpalSink {
    spec: StreamSpec,
    slot: Arc<PlaybackSlot>,
    state: AtomicCell<SinkState>,
    commands: Sender<Command>,
    device_thread: Mutex<Option<JoinHandle<()>>>,
    write_timeout: Duration,
}

impl CpalSink {
    fn open(device_name: Option<String>, spec: &StreamSpec) -> SinkResult<Self> {
        let (command_tx, command_rx) = channel::unbounded();
        let (ready_tx, ready_rx) = channel::bounded(1);

        let requested = *spec;
        let handle = thread::Builder::new()
            .name("tonegen-device".into())
            .spawn(move || run_device(device_name, requested, command_rx, ready_tx))
            .map_err(|e| SinkError::Open(format!("failed to spawn device thread: {}", e)))?;

        let (negotiated, slot) = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(SinkError::Disconnected);
            }
        };

        let spec = negotiated.stream_spec();
        let queued = spec.duration_of(negotiated.buffer_frames as usize * queue_blocks(&negotiated));
        Ok(Self {
            spec,
            slot,
            state: AtomicCell::new(SinkState::Ready),
            commands: command_tx,
            device_thread: Mutex::new(Some(handle)),
            write_timeout: (queued * 4).max(MIN_WRITE_TIMEOUT),
        })
    }

    fn request(&self, make: fn(Sender<SinkResult<()>>) -> Command) -> SinkResult<()> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.commands.send(make(reply_tx)).map_err(|_| SinkError::Disconnected)?;
        reply_rx.recv().map_err(|_| SinkError::Disconnected)?
    }

    fn transition(&self, make: fn(Sender<SinkResult<()>>) -> Command, to: SinkState) -> SinkResult<()> {
        let current = self.state.load();
        if current == SinkState::Released {
            return Err(SinkError::Released);
        }
        self.request(make)?;
        // only `release` races with us here
        self.state
            .compare_exchange(current, to)
            .map(|_| ())
            .map_err(|_| SinkError::Released)
    }
}

impl AudioSink for CpalSink {
    fn spec(&self) -> StreamSpec {
        self.spec
    }

    fn state(&self) -> SinkState {
        self.state.load()
    }

    fn write(&self, block: &[i16]) -> SinkResult<usize> {
        match self.state.load() {
            SinkState::Released => return Err(SinkError::Released),
            s if !s.is_writable() => return Err(SinkError::NotReady(s)),
            _ => {}
        }

        self.slot.push(block, self.write_timeout).map_err(|e| match e {
            PushError::Timeout => SinkError::Device(format!(
                "device did not consume audio within {:?}",
                self.write_timeout
            )),
            PushError::Disconnected => SinkError::Disconnected,
        })?;
        Ok(block.len())
    }

    fn set_gain(&self, gain: f32) {
        self.slot.set_gain(gain);
    }

    fn gain(&self) -> f32 {
        self.slot.gain()
    }

    fn play(&self) -> SinkResult<()> {
        self.transition(Command::Play, SinkState::Playing)
    }

    fn pause(&self) -> SinkResult<()> {
        self.transition(Command::Pause, SinkState::Paused)
    }

    fn flush(&self) -> SinkResult<()> {
        if self.state.load() == SinkState::Released {
            return Err(SinkError::Released);
        }
        self.slot.flush();
        Ok(())
    }

    fn release(&self) {
        if self.state.swap(SinkState::Released) == SinkState::Released {
            return;
        }
        let _ = self.commands.send(Command::Release);
        if let Some(handle) = self.device_thread.lock().take() {
            if handle.join().is_err() {
                log::error!("audio device thread panicked");
            }
        }
        log::debug!(
            "audio sink released after {} frames, {} underruns",
            self.slot.frame_count(),
            self.slot.underruns()
        );
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.release();
    }
}

/// Blocks the slot may hold so that at least `MIN_QUEUED` of audio fits.
fn queue_blocks(config: &NegotiatedConfig) -> usize {
    let min_frames = (config.sample_rate as u128 * MIN_QUEUED.as_millis()).div_ceil(1000) as usize;
    let block = (config.buffer_frames as usize).max(1);
    min_frames.div_ceil(block).max(MIN_QUEUE_BLOCKS)
}

type Ready = SinkResult<(NegotiatedConfig, Arc<PlaybackSlot>)>;

fn run_device(device_name: Option<String>, spec: StreamSpec, commands: Receiver<Command>, ready: Sender<Ready>) {
    let stream = match build_stream(device_name.as_deref(), &spec) {
        Ok((stream, negotiated, slot)) => {
            let _ = ready.send(Ok((negotiated, slot)));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    for command in commands.iter() {
        match command {
            Command::Play(reply) => {
                let _ = reply.send(stream.play().map_err(|e| SinkError::Device(e.to_string())));
            }
            Command::Pause(reply) => {
                let _ = reply.send(stream.pause().map_err(|e| SinkError::Device(e.to_string())));
            }
            Command::Release => break,
        }
    }

    drop(stream);
    log::debug!("audio device thread finished");
}

fn build_stream(
    device_name: Option<&str>,
    spec: &StreamSpec,
) -> SinkResult<(cpal::Stream, NegotiatedConfig, Arc<PlaybackSlot>)> {
    let open_err = |e: &dyn std::fmt::Display| SinkError::Open(e.to_string());

    let enumerator = DeviceEnumerator::new().map_err(|e| open_err(&e))?;
    let info = enumerator.resolve(device_name).map_err(|e| open_err(&e))?;
    let device = enumerator.select_device(info).map_err(|e| open_err(&e))?;

    let request = ConfigurationRequest::from_stream_spec(spec);
    let negotiated = ConfigNegotiator::negotiate(info, &request).map_err(|e| open_err(&e))?;
    let depth = queue_blocks(&negotiated);
    log::info!("opening '{}': {}, {} blocks queued", info.name, negotiated, depth);

    let slot = Arc::new(PlaybackSlot::new(depth));
    let callback_slot = Arc::clone(&slot);
    let stream = match negotiated.sample_format {
        SampleFormat::I16 => build_typed::<i16>(device, &negotiated, callback_slot),
        SampleFormat::F32 => build_typed::<f32>(device, &negotiated, callback_slot),
        SampleFormat::U16 => build_typed::<u16>(device, &negotiated, callback_slot),
        other => Err(SinkError::Open(format!("unsupported sample format {:?}", other))),
    }?;

    Ok((stream, negotiated, slot))
}

fn build_typed<T>(device: &cpal::Device, config: &NegotiatedConfig, slot: Arc<PlaybackSlot>) -> SinkResult<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    device
        .build_output_stream(
            &config.stream_config,
            move |output: &mut [T], _: &cpal::OutputCallbackInfo| {
                slot.process_realtime(output, channels);
            },
            |err| log::error!("audio stream error: {}", err),
            None,
        )
        .map_err(|e| SinkError::Open(e.to_string()))
}
