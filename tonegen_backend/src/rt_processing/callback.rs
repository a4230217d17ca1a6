//! Lock-conscious hand-off between the streaming worker and the device callback.
//!
//! The worker pushes whole mono blocks into a bounded queue; the device
//! callback drains them sample by sample, fanning each sample out to every
//! output channel. The callback never blocks: if the pending block is locked
//! by a flush it plays silence for that period.
//!
//! Block allocations travel back to the writer through a recycle queue so the
//! audio thread does not free memory in the steady state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cpal::Sample;
use crossbeam::atomic::AtomicCell;
use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender, TryRecvError};
use spin::Mutex;
use tonegen_core::pcm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The callback did not make room within the timeout.
    Timeout,
    Disconnected,
}

/// The block currently being played and the read position inside it.
#[derive(Default)]
struct Pending {
    block: Vec<i16>,
    cursor: usize,
}

impl Pending {
    #[inline]
    fn next_sample(&mut self, blocks: &Receiver<Vec<i16>>, recycle: &Sender<Vec<i16>>) -> Option<i16> {
        while self.cursor >= self.block.len() {
            let next = blocks.try_recv().ok()?;
            let spent = std::mem::replace(&mut self.block, next);
            if spent.capacity() > 0 {
                let _ = recycle.try_send(spent);
            }
            self.cursor = 0;
        }
        let sample = self.block[self.cursor];
        self.cursor += 1;
        Some(sample)
    }

    fn clear(&mut self) {
        self.block.clear();
        self.cursor = 0;
    }
}

pub struct PlaybackSlot {
    pending: Mutex<Pending>,

    blocks_tx: Sender<Vec<i16>>,
    blocks_rx: Receiver<Vec<i16>>,
    recycle_tx: Sender<Vec<i16>>,
    recycle_rx: Receiver<Vec<i16>>,

    gain: AtomicCell<f32>,

    /// Frames handed to the device, silence included.
    frame_clock: AtomicU64,
    /// Callback periods that ran out of queued samples.
    underruns: AtomicU64,
}

impl PlaybackSlot {
    /// `queue_blocks` bounds how many blocks may wait ahead of the one playing.
    pub fn new(queue_blocks: usize) -> Self {
        let capacity = queue_blocks.max(1);
        let (blocks_tx, blocks_rx) = channel::bounded(capacity);
        // one extra for the block held in `pending`
        let (recycle_tx, recycle_rx) = channel::bounded(capacity + 1);
        Self {
            pending: Mutex::new(Pending::default()),
            blocks_tx,
            blocks_rx,
            recycle_tx,
            recycle_rx,
            gain: AtomicCell::new(1.0),
            frame_clock: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
        }
    }

    /// Copy `block` into the queue, waiting up to `timeout` for space.
    pub fn push(&self, block: &[i16], timeout: Duration) -> Result<(), PushError> {
        let mut buffer = self.recycle_rx.try_recv().unwrap_or_default();
        buffer.clear();
        buffer.extend_from_slice(block);

        self.blocks_tx.send_timeout(buffer, timeout).map_err(|e| match e {
            SendTimeoutError::Timeout(_) => PushError::Timeout,
            SendTimeoutError::Disconnected(_) => PushError::Disconnected,
        })
    }

    /// Discard the block in flight and everything queued behind it.
    pub fn flush(&self) {
        let mut pending = self.pending.lock();
        pending.clear();
        loop {
            match self.blocks_rx.try_recv() {
                Ok(block) => {
                    let _ = self.recycle_tx.try_send(block);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    #[inline]
    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.clamp(0.0, 1.0));
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain.load()
    }

    /// Blocks waiting behind the one playing.
    pub fn queued_blocks(&self) -> usize {
        self.blocks_rx.len()
    }

    /// Realtime entry called from the device callback.
    ///
    /// `output` is interleaved with `channels` channels. Returns `true` if
    /// every frame came from queued audio.
    ///
    /// **Important**: This method performs no heap allocation.
    pub fn process_realtime<T>(&self, output: &mut [T], channels: usize) -> bool
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = channels.max(1);
        let frames = match output.len() / channels {
            0 => return false,
            n => n,
        };
        self.frame_clock.fetch_add(frames as u64, Ordering::Relaxed);

        let Some(mut pending) = self.pending.try_lock() else {
            output.fill(T::EQUILIBRIUM);
            return false;
        };

        let gain = self.gain.load();
        let mut starved = false;
        for frame in output.chunks_mut(channels) {
            let value = match pending.next_sample(&self.blocks_rx, &self.recycle_tx) {
                Some(sample) => T::from_sample(pcm::scale(sample, gain)),
                None => {
                    starved = true;
                    T::EQUILIBRIUM
                }
            };
            frame.fill(value);
        }

        if starved {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
        !starved
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_clock.load(Ordering::Relaxed)
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}
