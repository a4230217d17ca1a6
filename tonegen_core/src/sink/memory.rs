//! In-memory sink used for tests and headless runs.
//!
//! Every sink opened by one [`MemoryOutput`] reports into the same
//! [`MemoryLog`], so the log outlives the handles and can be inspected after
//! release.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::Mutex;

use super::{AudioOutput, AudioSink, SinkState, StreamSpec};
use crate::error::{SinkError, SinkResult};

#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    pub opens: usize,
    pub releases: usize,
    /// `release` called on an already released handle.
    pub redundant_releases: usize,
    /// `write` called on a released handle.
    pub rejected_writes: usize,
    pub flushes: usize,
    /// Calls to `AudioOutput::min_buffer_size`.
    pub buffer_queries: usize,
    /// `write` calls failed by `fail_writes_after`.
    pub failed_writes: usize,
    pub samples: Vec<i16>,
    pub gains: Vec<f32>,
}

pub struct MemoryOutput {
    log: Arc<Mutex<MemoryLog>>,
    min_buffer: usize,
    paced: bool,
    fail_next_open: AtomicBool,
    /// Writes left before sinks start failing; `None` never fails.
    write_budget: Arc<Mutex<Option<usize>>>,
}

impl MemoryOutput {
    pub fn new(min_buffer: usize) -> Self {
        Self {
            log: Arc::new(Mutex::new(MemoryLog::default())),
            min_buffer: min_buffer.max(1),
            paced: true,
            fail_next_open: AtomicBool::new(false),
            write_budget: Arc::new(Mutex::new(None)),
        }
    }

    /// When paced (the default), `write` sleeps for the block's playback time
    /// like a device would.
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Make the next `open` fail, as if no device were available.
    pub fn fail_next_open(&self) {
        self.fail_next_open.store(true, Ordering::SeqCst);
    }

    /// Accept `writes` more blocks, then fail every write with a device
    /// error while the sink keeps reporting its state as before, the way a
    /// lost device does.
    pub fn fail_writes_after(&self, writes: usize) {
        *self.write_budget.lock() = Some(writes);
    }

    pub fn clear_write_failures(&self) {
        *self.write_budget.lock() = None;
    }

    /// Shared log, still readable after the output itself has been dropped.
    pub fn log_handle(&self) -> Arc<Mutex<MemoryLog>> {
        Arc::clone(&self.log)
    }

    /// Snapshot of everything recorded so far.
    pub fn log(&self) -> MemoryLog {
        self.log.lock().clone()
    }
}

impl Default for MemoryOutput {
    fn default() -> Self {
        Self::new(512)
    }
}

impl AudioOutput for MemoryOutput {
    type Sink = MemorySink;

    fn min_buffer_size(&self, _spec: &StreamSpec) -> usize {
        self.log.lock().buffer_queries += 1;
        self.min_buffer
    }

    fn open(&self, spec: &StreamSpec) -> SinkResult<MemorySink> {
        if self.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(SinkError::Open("no memory device available".to_string()));
        }

        let spec = StreamSpec {
            buffer_frames: Some(spec.buffer_frames.unwrap_or(self.min_buffer)),
            ..*spec
        };
        self.log.lock().opens += 1;
        log::debug!("memory sink opened: {}", spec);

        Ok(MemorySink {
            spec,
            log: Arc::clone(&self.log),
            write_budget: Arc::clone(&self.write_budget),
            state: Mutex::new(SinkState::Ready),
            gain: Mutex::new(1.0),
            paced: self.paced,
        })
    }
}

pub struct MemorySink {
    spec: StreamSpec,
    log: Arc<Mutex<MemoryLog>>,
    write_budget: Arc<Mutex<Option<usize>>>,
    state: Mutex<SinkState>,
    gain: Mutex<f32>,
    paced: bool,
}

impl MemorySink {
    fn transition(&self, to: SinkState) -> SinkResult<()> {
        let mut state = self.state.lock();
        if *state == SinkState::Released {
            return Err(SinkError::Released);
        }
        *state = to;
        Ok(())
    }
}

impl AudioSink for MemorySink {
    fn spec(&self) -> StreamSpec {
        self.spec
    }

    fn state(&self) -> SinkState {
        *self.state.lock()
    }

    fn write(&self, block: &[i16]) -> SinkResult<usize> {
        {
            let state = self.state.lock();
            let mut log = self.log.lock();
            match *state {
                SinkState::Released => {
                    log.rejected_writes += 1;
                    return Err(SinkError::Released);
                }
                s if !s.is_writable() => return Err(SinkError::NotReady(s)),
                _ => {}
            }
            let mut budget = self.write_budget.lock();
            match budget.as_mut() {
                Some(0) => {
                    log.failed_writes += 1;
                    return Err(SinkError::Device("memory device stopped accepting audio".to_string()));
                }
                Some(left) => *left -= 1,
                None => {}
            }
            log.samples.extend_from_slice(block);
        }

        if self.paced {
            thread::sleep(self.spec.duration_of(block.len()));
        }
        Ok(block.len())
    }

    fn set_gain(&self, gain: f32) {
        let gain = gain.clamp(0.0, 1.0);
        *self.gain.lock() = gain;
        self.log.lock().gains.push(gain);
    }

    fn gain(&self) -> f32 {
        *self.gain.lock()
    }

    fn play(&self) -> SinkResult<()> {
        self.transition(SinkState::Playing)
    }

    fn pause(&self) -> SinkResult<()> {
        self.transition(SinkState::Paused)
    }

    fn flush(&self) -> SinkResult<()> {
        if self.state() == SinkState::Released {
            return Err(SinkError::Released);
        }
        self.log.lock().flushes += 1;
        Ok(())
    }

    fn release(&self) {
        let mut state = self.state.lock();
        let mut log = self.log.lock();
        if *state == SinkState::Released {
            log.redundant_releases += 1;
            return;
        }
        *state = SinkState::Released;
        log.releases += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unpaced() -> MemoryOutput {
        MemoryOutput::new(64).paced(false)
    }

    #[test]
    fn test_open_fills_in_minimum_buffer() {
        let output = unpaced();
        let sink = output.open(&StreamSpec::mono(44_100)).unwrap();
        assert_eq!(sink.spec().buffer_frames, Some(64));
        assert_eq!(sink.state(), SinkState::Ready);
        assert_eq!(output.log().opens, 1);
    }

    #[test]
    fn test_write_after_release_is_rejected() {
        let output = unpaced();
        let sink = output.open(&StreamSpec::mono(44_100)).unwrap();
        assert_eq!(sink.write(&[1, 2, 3]).unwrap(), 3);
        sink.release();
        assert!(matches!(sink.write(&[4]), Err(SinkError::Released)));
        assert!(matches!(sink.play(), Err(SinkError::Released)));

        let log = output.log();
        assert_eq!(log.samples, vec![1, 2, 3]);
        assert_eq!(log.rejected_writes, 1);
    }

    #[test]
    fn test_write_while_paused_is_not_ready() {
        let output = unpaced();
        let sink = output.open(&StreamSpec::mono(44_100)).unwrap();
        sink.pause().unwrap();
        assert!(matches!(sink.write(&[1]), Err(SinkError::NotReady(SinkState::Paused))));
    }

    #[test]
    fn test_double_release_is_counted_not_applied() {
        let output = unpaced();
        let sink = output.open(&StreamSpec::mono(44_100)).unwrap();
        sink.release();
        sink.release();
        let log = output.log();
        assert_eq!(log.releases, 1);
        assert_eq!(log.redundant_releases, 1);
    }

    #[test]
    fn test_fail_next_open_only_once() {
        let output = unpaced();
        output.fail_next_open();
        assert!(matches!(output.open(&StreamSpec::mono(44_100)), Err(SinkError::Open(_))));
        assert!(output.open(&StreamSpec::mono(44_100)).is_ok());
    }

    #[test]
    fn test_write_failures_keep_state() {
        let output = unpaced();
        let sink = output.open(&StreamSpec::mono(44_100)).unwrap();
        sink.play().unwrap();
        output.fail_writes_after(1);

        assert!(sink.write(&[1]).is_ok());
        assert!(matches!(sink.write(&[2]), Err(SinkError::Device(_))));
        assert_eq!(sink.state(), SinkState::Playing);

        output.clear_write_failures();
        assert!(sink.write(&[3]).is_ok());
        let log = output.log();
        assert_eq!(log.samples, vec![1, 3]);
        assert_eq!(log.failed_writes, 1);
    }

    #[test]
    fn test_gain_is_clamped() {
        let output = unpaced();
        let sink = output.open(&StreamSpec::mono(44_100)).unwrap();
        sink.set_gain(1.5);
        assert_eq!(sink.gain(), 1.0);
        assert_eq!(output.log().gains, vec![1.0]);
    }
}
