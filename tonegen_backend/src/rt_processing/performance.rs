use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use quanta::{Clock, Instant as QuantaInstant};

/// Snapshot of streaming metrics suitable for logging/status output (non-RT).
#[derive(Debug, Clone)]
pub struct StreamSnapshot {
    /// Frames handed to the sink since creation or last reset.
    pub frames_written: u64,
    /// Blocks handed to the sink.
    pub blocks_written: u64,
    /// Writes the sink refused.
    pub write_errors: u64,
    /// Shortest write observed (ns).
    pub min_write_nanos: Option<u64>,
    /// Longest write observed (ns).
    pub max_write_nanos: Option<u64>,
    /// EMA of write duration in nanoseconds.
    pub ema_write_nanos: f64,
    /// Playback time of one block at the stream rate.
    pub expected_block_nanos: f64,
    /// EMA write time as a share of block playback time. Close to 100 means
    /// the worker is paced by the device; far below means the queue is filling.
    pub blocked_percent: f64,
    pub timestamp: Instant,
}

/// Lock-free counters for the streaming worker.
///
/// The worker only calls the `add_*`/`increment_*` methods and `scoped_write()`;
/// those touch atomics only. `snapshot` is meant for the control thread.
pub struct StreamMonitor {
    clock: Clock,
    block_frames: AtomicU64,
    sample_rate: AtomicU32,

    frames_written: AtomicU64,
    blocks_written: AtomicU64,
    write_errors: AtomicU64,

    min_write_nanos: AtomicU64,
    max_write_nanos: AtomicU64,
    /// EMA of write duration stored as f64 bits
    ema_write_bits: AtomicU64,

    ema_alpha: f64,
}

impl StreamMonitor {
    /// `ema_alpha` controls how quickly the write-time average follows new
    /// values; 0.05..0.2 works well.
    pub fn new(ema_alpha: f64) -> Self {
        Self {
            clock: Clock::new(),
            block_frames: AtomicU64::new(0),
            sample_rate: AtomicU32::new(0),
            frames_written: AtomicU64::new(0),
            blocks_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            min_write_nanos: AtomicU64::new(u64::MAX),
            max_write_nanos: AtomicU64::new(0),
            ema_write_bits: AtomicU64::new(0u64),
            ema_alpha: ema_alpha.clamp(f64::MIN_POSITIVE, 1.0),
        }
    }

    /// Record the block size and rate of a freshly opened sink.
    pub fn set_stream_format(&self, block_frames: usize, sample_rate: u32) {
        self.block_frames.store(block_frames as u64, Ordering::Relaxed);
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn add_frames_written(&self, n: u64) {
        self.frames_written.fetch_add(n, Ordering::Relaxed);
        self.blocks_written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn increment_write_errors(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write duration in nanoseconds. Updates min, max and EMA.
    #[inline(always)]
    pub fn record_write_nanos(&self, nanos: u64) {
        self.min_write_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.max_write_nanos.fetch_max(nanos, Ordering::Relaxed);

        // EMA_new = alpha * x + (1 - alpha) * EMA_old
        let alpha = self.ema_alpha;
        let mut old_bits = self.ema_write_bits.load(Ordering::Relaxed);
        loop {
            let old_f = f64::from_bits(old_bits);
            let new_f = alpha * (nanos as f64) + (1.0 - alpha) * old_f;
            match self.ema_write_bits.compare_exchange_weak(
                old_bits,
                new_f.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(found) => old_bits = found,
            }
        }
    }

    /// Guard that records the time until it is dropped:
    ///
    /// ```ignore
    /// let _g = monitor.scoped_write();
    /// sink.write(block)?;
    /// ```
    #[inline(always)]
    pub fn scoped_write(&self) -> WriteGuard<'_> {
        WriteGuard {
            monitor: self,
            start: self.clock.now(),
        }
    }

    /// Read the counters. With `reset_peaks`, min/max/EMA start over afterwards.
    pub fn snapshot(&self, reset_peaks: bool) -> StreamSnapshot {
        let min_raw = self.min_write_nanos.load(Ordering::Relaxed);
        let max_raw = self.max_write_nanos.load(Ordering::Relaxed);
        let ema_f = f64::from_bits(self.ema_write_bits.load(Ordering::Relaxed));

        let sample_rate = self.sample_rate.load(Ordering::Relaxed);
        let block_frames = self.block_frames.load(Ordering::Relaxed);
        let expected_block_nanos = if sample_rate > 0 {
            (block_frames as f64 / sample_rate as f64) * 1_000_000_000.0
        } else {
            0.0
        };
        let blocked_percent = if expected_block_nanos > 0.0 {
            (ema_f / expected_block_nanos) * 100.0
        } else {
            0.0
        };

        if reset_peaks {
            self.min_write_nanos.store(u64::MAX, Ordering::Relaxed);
            self.max_write_nanos.store(0, Ordering::Relaxed);
            self.ema_write_bits.store(0u64, Ordering::Relaxed);
        }

        StreamSnapshot {
            frames_written: self.frames_written.load(Ordering::Relaxed),
            blocks_written: self.blocks_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            min_write_nanos: (min_raw != u64::MAX).then_some(min_raw),
            max_write_nanos: (max_raw != 0).then_some(max_raw),
            ema_write_nanos: ema_f,
            expected_block_nanos,
            blocked_percent,
            timestamp: Instant::now(),
        }
    }
}

impl Default for StreamMonitor {
    fn default() -> Self {
        Self::new(0.1)
    }
}

/// Records elapsed write time on drop.
pub struct WriteGuard<'a> {
    monitor: &'a StreamMonitor,
    start: QuantaInstant,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.monitor.clock.now().saturating_duration_since(self.start);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.monitor.record_write_nanos(nanos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let monitor = StreamMonitor::default();
        let snap = monitor.snapshot(false);
        assert_eq!(snap.frames_written, 0);
        assert_eq!(snap.min_write_nanos, None);
        assert_eq!(snap.max_write_nanos, None);
        assert_eq!(snap.blocked_percent, 0.0);
    }

    #[test]
    fn test_counters_and_peaks() {
        let monitor = StreamMonitor::new(1.0);
        monitor.set_stream_format(441, 44_100);
        monitor.add_frames_written(441);
        monitor.add_frames_written(441);
        monitor.record_write_nanos(5_000_000);
        monitor.record_write_nanos(10_000_000);
        monitor.increment_write_errors();

        let snap = monitor.snapshot(true);
        assert_eq!(snap.frames_written, 882);
        assert_eq!(snap.blocks_written, 2);
        assert_eq!(snap.write_errors, 1);
        assert_eq!(snap.min_write_nanos, Some(5_000_000));
        assert_eq!(snap.max_write_nanos, Some(10_000_000));
        // alpha 1.0 -> EMA is the last value; block lasts 10ms
        assert!((snap.expected_block_nanos - 10_000_000.0).abs() < 1.0);
        assert!((snap.blocked_percent - 100.0).abs() < 1e-6);

        let after = monitor.snapshot(false);
        assert_eq!(after.min_write_nanos, None);
        assert_eq!(after.frames_written, 882);
    }

    #[test]
    fn test_scoped_write_records_once() {
        let monitor = StreamMonitor::default();
        {
            let _g = monitor.scoped_write();
        }
        assert!(monitor.snapshot(false).min_write_nanos.is_some());
    }
}
