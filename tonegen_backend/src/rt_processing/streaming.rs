//! The streaming worker: one thread that renders blocks and pushes them into
//! the sink for as long as the `playing` flag stays set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::atomic::AtomicCell;
use tonegen_core::error::SinkResult;
use tonegen_core::{AudioSink, BufferFiller, PhaseAccumulator, WaveTables, Waveform};

use crate::rt_processing::performance::StreamMonitor;

/// Scalars written by the control thread and read by the worker once per block.
pub struct SharedParams {
    frequency: AtomicCell<u32>,
    volume: AtomicCell<u32>,
    waveform: AtomicCell<Waveform>,
    playing: AtomicBool,
}

impl SharedParams {
    pub fn new(frequency: u32, volume: u32, waveform: Waveform) -> Self {
        Self {
            frequency: AtomicCell::new(frequency),
            volume: AtomicCell::new(volume),
            waveform: AtomicCell::new(waveform),
            playing: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn frequency(&self) -> u32 {
        self.frequency.load()
    }

    #[inline]
    pub fn set_frequency(&self, hz: u32) {
        self.frequency.store(hz);
    }

    #[inline]
    pub fn volume(&self) -> u32 {
        self.volume.load()
    }

    #[inline]
    pub fn set_volume(&self, pct: u32) {
        self.volume.store(pct);
    }

    #[inline]
    pub fn waveform(&self) -> Waveform {
        self.waveform.load()
    }

    #[inline]
    pub fn set_waveform(&self, waveform: Waveform) {
        self.waveform.store(waveform);
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }
}

pub(crate) struct StreamingWorker<S: AudioSink> {
    sink: Arc<S>,
    params: Arc<SharedParams>,
    tables: Arc<WaveTables>,
    monitor: Arc<StreamMonitor>,
    phase: PhaseAccumulator,
    filler: BufferFiller,
    sample_rate: u32,
}

impl<S: AudioSink> StreamingWorker<S> {
    pub(crate) fn new(
        sink: Arc<S>,
        params: Arc<SharedParams>,
        tables: Arc<WaveTables>,
        monitor: Arc<StreamMonitor>,
        phase: PhaseAccumulator,
        filler: BufferFiller,
    ) -> Self {
        let sample_rate = sink.spec().sample_rate;
        Self {
            sink,
            params,
            tables,
            monitor,
            phase,
            filler,
            sample_rate,
        }
    }

    /// Render one block from the current parameters and write it.
    pub(crate) fn write_block(&mut self) -> SinkResult<usize> {
        self.phase
            .set_frequency(self.params.frequency(), self.sample_rate);
        let table = self.tables.get(self.params.waveform());
        let block = self.filler.fill(table, &mut self.phase);

        let _timer = self.monitor.scoped_write();
        match self.sink.write(block) {
            Ok(written) => {
                self.monitor.add_frames_written(written as u64);
                Ok(written)
            }
            Err(e) => {
                self.monitor.increment_write_errors();
                Err(e)
            }
        }
    }

    /// Stream until `playing` is cleared or the sink stops accepting blocks.
    /// Hands the phase back so the next worker resumes mid-cycle.
    pub(crate) fn run(mut self) -> PhaseAccumulator {
        log::debug!(
            "streaming worker started ({} frames per block at {} Hz)",
            self.filler.block_len(),
            self.sample_rate
        );

        while self.params.is_playing() {
            let state = self.sink.state();
            if !state.is_writable() {
                log::warn!("sink is {}, streaming worker stopping", state);
                self.params.set_playing(false);
                break;
            }
            if let Err(e) = self.write_block() {
                log::error!("audio write failed: {}", e);
                self.params.set_playing(false);
                break;
            }
        }

        log::debug!("streaming worker finished");
        self.into_phase()
    }

    pub(crate) fn into_phase(self) -> PhaseAccumulator {
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonegen_core::sink::{MemoryOutput, SinkState};
    use tonegen_core::{AudioOutput, Interpolation, StreamSpec};

    fn worker(output: &MemoryOutput, params: Arc<SharedParams>, block: usize) -> StreamingWorker<tonegen_core::sink::MemorySink> {
        let sink = Arc::new(output.open(&StreamSpec::mono(100).with_buffer_frames(block)).unwrap());
        StreamingWorker::new(
            sink,
            params,
            Arc::new(WaveTables::new(100)),
            Arc::new(StreamMonitor::default()),
            PhaseAccumulator::new(100),
            BufferFiller::new(block, Interpolation::Nearest),
        )
    }

    #[test]
    fn test_write_block_follows_live_parameters() {
        let output = MemoryOutput::new(4).paced(false);
        let params = Arc::new(SharedParams::new(1, 50, Waveform::Square));
        let mut worker = worker(&output, Arc::clone(&params), 4);

        worker.write_block().unwrap();
        params.set_waveform(Waveform::Sawtooth);
        params.set_frequency(10);
        worker.write_block().unwrap();

        let tables = WaveTables::new(100);
        let saw = tables.get(Waveform::Sawtooth);
        let samples = output.log().samples;
        assert_eq!(&samples[..4], &[i16::MAX; 4]);
        assert_eq!(&samples[4..], &[saw[4], saw[14], saw[24], saw[34]]);
        assert_eq!(worker.into_phase().position(), 44);
    }

    #[test]
    fn test_run_exits_when_sink_not_writable() {
        let output = MemoryOutput::new(4).paced(false);
        let params = Arc::new(SharedParams::new(1, 50, Waveform::Sine));
        params.set_playing(true);
        let worker = worker(&output, Arc::clone(&params), 4);
        worker.sink.pause().unwrap();
        assert_eq!(worker.sink.state(), SinkState::Paused);

        let phase = worker.run();
        assert!(!params.is_playing());
        assert_eq!(phase.position(), 0);
        assert!(output.log().samples.is_empty());
    }

    #[test]
    fn test_run_exits_when_sink_released() {
        let output = MemoryOutput::new(4).paced(false);
        let params = Arc::new(SharedParams::new(1, 50, Waveform::Sine));
        params.set_playing(true);
        let worker = worker(&output, Arc::clone(&params), 4);
        worker.sink.release();

        worker.run();
        assert!(!params.is_playing());
        assert_eq!(output.log().rejected_writes, 0);
    }
}
