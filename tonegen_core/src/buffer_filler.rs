use crate::phase::{Interpolation, PhaseAccumulator};
use crate::waveform::WaveformTable;

/// Render `out.len()` samples of `table`, moving `phase` along as it goes.
#[inline]
pub fn fill_block(
    out: &mut [i16],
    table: &WaveformTable,
    phase: &mut PhaseAccumulator,
    interpolation: Interpolation,
) {
    for slot in out.iter_mut() {
        *slot = phase.sample(table, interpolation);
        phase.advance();
    }
}

/// Owns the block that is handed to the sink on every streaming iteration.
///
/// The block is allocated once; `fill` only overwrites it.
#[derive(Debug, Clone)]
pub struct BufferFiller {
    block: Vec<i16>,
    interpolation: Interpolation,
}

impl BufferFiller {
    pub fn new(block_len: usize, interpolation: Interpolation) -> Self {
        Self {
            block: vec![0; block_len.max(1)],
            interpolation,
        }
    }

    pub fn fill(&mut self, table: &WaveformTable, phase: &mut PhaseAccumulator) -> &[i16] {
        fill_block(&mut self.block, table, phase, self.interpolation);
        &self.block
    }

    pub fn block_len(&self) -> usize {
        self.block.len()
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }
}
