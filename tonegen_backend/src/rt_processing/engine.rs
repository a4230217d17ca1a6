//! Oscillator engine: playback state machine, sink lifecycle and the
//! streaming worker's thread.
//!
//! Control calls (`play`, `pause`, `stop`, setters) may come from any thread.
//! Transitions are serialized through one transport lock; the worker itself
//! never takes that lock, so joining it while holding the lock cannot deadlock.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tonegen_core::pcm::volume_to_gain;
use tonegen_core::{
    AudioOutput, AudioSink, BufferFiller, EngineConfig, EngineError, PhaseAccumulator, SinkState,
    WaveTables, Waveform, config::MAX_VOLUME,
};

use crate::rt_processing::performance::{StreamMonitor, StreamSnapshot};
use crate::rt_processing::streaming::{SharedParams, StreamingWorker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

struct Transport<S: AudioSink> {
    state: PlaybackState,
    sink: Option<Arc<S>>,
    worker: Option<JoinHandle<PhaseAccumulator>>,
    /// Present whenever no worker is running.
    parked_phase: Option<PhaseAccumulator>,
}

pub struct OscillatorEngine<O: AudioOutput> {
    output: O,
    config: EngineConfig,
    tables: Arc<WaveTables>,
    params: Arc<SharedParams>,
    monitor: Arc<StreamMonitor>,
    transport: Mutex<Transport<O::Sink>>,
    /// The open sink, reachable for gain changes without the transport lock,
    /// which `play` holds across the priming write.
    gain_target: Mutex<Option<Arc<O::Sink>>>,
}

impl<O: AudioOutput> OscillatorEngine<O> {
    /// Build the tables and initial state. No device is touched until `play`.
    pub fn new(output: O, config: EngineConfig) -> Self {
        let tables = Arc::new(WaveTables::new(config.table_len()));
        let frequency = clamp_frequency(&config, config.default_frequency);
        let params = Arc::new(SharedParams::new(
            frequency,
            config.default_volume.min(MAX_VOLUME),
            config.default_waveform,
        ));
        let parked_phase = Some(PhaseAccumulator::new(tables.table_len()));

        Self {
            output,
            config,
            tables,
            params,
            monitor: Arc::new(StreamMonitor::default()),
            transport: Mutex::new(Transport {
                state: PlaybackState::Stopped,
                sink: None,
                worker: None,
                parked_phase,
            }),
            gain_target: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    // ---------------------------
    // Parameters
    // ---------------------------

    /// Clamped to the configured frequency range.
    pub fn set_frequency(&self, hz: u32) {
        let hz = clamp_frequency(&self.config, hz);
        self.params.set_frequency(hz);
    }

    pub fn frequency(&self) -> u32 {
        self.params.frequency()
    }

    /// Clamped to 100. Pushed to the sink immediately when one is open.
    pub fn set_volume(&self, pct: u32) {
        let pct = pct.min(MAX_VOLUME);
        self.params.set_volume(pct);
        if let Some(sink) = self.gain_target.lock().as_ref() {
            sink.set_gain(volume_to_gain(pct));
        }
    }

    pub fn volume(&self) -> u32 {
        self.params.volume()
    }

    /// Picker index: 0=sine, 1=sawtooth, 2=square, 3=triangle, else sine.
    pub fn set_waveform(&self, index: i32) {
        self.set_waveform_kind(Waveform::from_index(index));
    }

    pub fn set_waveform_kind(&self, waveform: Waveform) {
        self.params.set_waveform(waveform);
    }

    pub fn waveform(&self) -> Waveform {
        self.params.waveform()
    }

    // ---------------------------
    // Transport
    // ---------------------------

    /// True while a worker is streaming. Cleared by the worker itself if the
    /// sink fails.
    pub fn is_playing(&self) -> bool {
        self.params.is_playing()
    }

    /// A stream whose worker stopped after an output failure reads as
    /// `Stopped` even before the next control call cleans it up.
    pub fn state(&self) -> PlaybackState {
        match self.transport.lock().state {
            PlaybackState::Playing if !self.params.is_playing() => PlaybackState::Stopped,
            state => state,
        }
    }

    pub fn sink_state(&self) -> SinkState {
        self.transport
            .lock()
            .sink
            .as_ref()
            .map_or(SinkState::Uninitialized, |sink| sink.state())
    }

    /// Parked cursor position; `None` while the worker owns the phase.
    pub fn phase_position(&self) -> Option<usize> {
        self.transport.lock().parked_phase.as_ref().map(|p| p.position())
    }

    pub fn stats(&self) -> StreamSnapshot {
        self.monitor.snapshot(false)
    }

    /// Stopped or Paused -> Playing. Opens the sink if there is none (or it
    /// was released), primes one block and starts the worker.
    pub fn play(&self) -> Result<(), EngineError> {
        let mut transport = self.transport.lock();
        if transport.state == PlaybackState::Playing && self.params.is_playing() {
            return Ok(());
        }
        self.discard_failed_stream(&mut transport);
        self.reap_worker(&mut transport);

        let sink = match self.ensure_sink(&mut transport) {
            Ok(sink) => sink,
            Err(e) => {
                transport.state = PlaybackState::Stopped;
                return Err(e);
            }
        };

        let spec = sink.spec();
        let block_len = spec
            .buffer_frames
            .unwrap_or_else(|| self.output.min_buffer_size(&spec));
        self.monitor.set_stream_format(block_len, spec.sample_rate);

        let phase = transport
            .parked_phase
            .take()
            .unwrap_or_else(|| PhaseAccumulator::new(self.tables.table_len()));
        let mut worker = StreamingWorker::new(
            Arc::clone(&sink),
            Arc::clone(&self.params),
            Arc::clone(&self.tables),
            Arc::clone(&self.monitor),
            phase,
            BufferFiller::new(block_len, self.config.interpolation),
        );

        if let Err(e) = start_sink(sink.as_ref(), &mut worker) {
            log::error!("failed to start audio output: {}", e);
            transport.parked_phase = Some(worker.into_phase());
            if let Some(sink) = self.detach_sink(&mut transport) {
                if sink.state() != SinkState::Released {
                    sink.release();
                }
            }
            transport.state = PlaybackState::Stopped;
            return Err(e.into());
        }

        self.params.set_playing(true);
        let handle = thread::Builder::new()
            .name("tonegen-stream".into())
            .spawn(move || worker.run());
        match handle {
            Ok(handle) => transport.worker = Some(handle),
            Err(e) => {
                log::error!("failed to spawn streaming worker: {}", e);
                self.params.set_playing(false);
                if let Some(sink) = self.detach_sink(&mut transport) {
                    sink.release();
                }
                transport.parked_phase = Some(PhaseAccumulator::new(self.tables.table_len()));
                transport.state = PlaybackState::Stopped;
                return Err(EngineError::Spawn(e));
            }
        }

        log::debug!("playing: {} Hz {} at {}%", self.frequency(), self.waveform(), self.volume());
        transport.state = PlaybackState::Playing;
        Ok(())
    }

    /// Playing -> Paused. The sink stays open for a fast resume.
    pub fn pause(&self) {
        let mut transport = self.transport.lock();
        self.discard_failed_stream(&mut transport);
        if transport.state != PlaybackState::Playing {
            return;
        }
        self.params.set_playing(false);
        self.reap_worker(&mut transport);

        if let Some(sink) = transport.sink.as_ref() {
            if let Err(e) = sink.pause() {
                log::warn!("failed to pause audio output: {}", e);
            }
            if let Err(e) = sink.flush() {
                log::warn!("failed to flush audio output: {}", e);
            }
        }
        transport.state = PlaybackState::Paused;
        log::debug!("paused");
    }

    /// Playing or Paused -> Stopped. Releases the sink; the phase is kept.
    pub fn stop(&self) {
        let mut transport = self.transport.lock();
        if transport.state == PlaybackState::Stopped {
            return;
        }
        self.params.set_playing(false);
        self.reap_worker(&mut transport);

        // taken first so the handle is released exactly once whatever fails below
        if let Some(sink) = self.detach_sink(&mut transport) {
            if sink.state() != SinkState::Released {
                if let Err(e) = sink.pause() {
                    log::warn!("failed to pause audio output: {}", e);
                }
                if let Err(e) = sink.flush() {
                    log::warn!("failed to flush audio output: {}", e);
                }
                sink.release();
            }
        }
        transport.state = PlaybackState::Stopped;
        log::debug!("stopped");
    }

    /// Render into `out` from the parked phase with the current frequency and
    /// waveform, without touching the sink.
    pub fn render_block(&self, out: &mut [i16]) -> Result<(), EngineError> {
        let mut transport = self.transport.lock();
        let phase = transport.parked_phase.as_mut().ok_or(EngineError::Busy)?;
        phase.set_frequency(self.params.frequency(), self.config.sample_rate);
        let table = self.tables.get(self.params.waveform());
        tonegen_core::fill_block(out, table, phase, self.config.interpolation);
        Ok(())
    }

    fn ensure_sink(&self, transport: &mut Transport<O::Sink>) -> Result<Arc<O::Sink>, EngineError> {
        if let Some(sink) = transport.sink.as_ref() {
            if !sink.state().needs_reopen() {
                return Ok(Arc::clone(sink));
            }
            log::info!("audio output was {}, reopening", sink.state());
            self.detach_sink(transport);
        }

        // without a configured block size the output picks its own minimum
        let sink = Arc::new(self.output.open(&self.config.stream_spec())?);
        {
            // under the lock so a concurrent `set_volume` lands after this
            let mut target = self.gain_target.lock();
            sink.set_gain(volume_to_gain(self.params.volume()));
            *target = Some(Arc::clone(&sink));
        }
        log::info!("audio output opened: {}", sink.spec());

        transport.sink = Some(Arc::clone(&sink));
        Ok(sink)
    }

    fn detach_sink(&self, transport: &mut Transport<O::Sink>) -> Option<Arc<O::Sink>> {
        *self.gain_target.lock() = None;
        transport.sink.take()
    }

    /// The worker clears `playing` and exits by itself when a write fails.
    /// That sink is not trusted again: it is released so the next `play`
    /// opens a fresh one.
    fn discard_failed_stream(&self, transport: &mut Transport<O::Sink>) {
        if transport.state != PlaybackState::Playing || self.params.is_playing() {
            return;
        }
        log::warn!("streaming stopped after an output failure, releasing the audio output");
        self.reap_worker(transport);
        if let Some(sink) = self.detach_sink(transport) {
            if sink.state() != SinkState::Released {
                let _ = sink.pause();
                let _ = sink.flush();
                sink.release();
            }
        }
        transport.state = PlaybackState::Stopped;
    }

    fn reap_worker(&self, transport: &mut Transport<O::Sink>) {
        let Some(handle) = transport.worker.take() else {
            return;
        };
        match handle.join() {
            Ok(phase) => transport.parked_phase = Some(phase),
            Err(_) => {
                log::error!("{}", EngineError::WorkerPanicked);
                transport.parked_phase = Some(PhaseAccumulator::new(self.tables.table_len()));
            }
        }
    }
}

impl<O: AudioOutput> Drop for OscillatorEngine<O> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn clamp_frequency(config: &EngineConfig, hz: u32) -> u32 {
    hz.clamp(config.min_frequency, config.max_frequency)
}

/// Prime one block and start playback. A paused sink is resumed first since
/// it only accepts writes once playing again.
fn start_sink<S: AudioSink>(sink: &S, worker: &mut StreamingWorker<S>) -> tonegen_core::error::SinkResult<()> {
    if sink.state() == SinkState::Paused {
        sink.play()?;
        worker.write_block()?;
    } else {
        worker.write_block()?;
        sink.play()?;
    }
    Ok(())
}
