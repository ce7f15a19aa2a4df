//! Tape rewriting: re-synthesize a clean recording while a tape loads.
//!
//! As blocks are decoded from a worn source recording, the rewriter emits a
//! freshly timed copy to the output deck: calibrated silence, a new leader,
//! the sync byte, then the decoded bits at cell widths estimated from the
//! source. Leaders are re-generated rather than copied, so a long initial
//! leader and short inter-block leaders come out at fixed lengths.

use format_fsk::{CellTiming, Encoder, LEADER_BYTE, TapeError, TapeOutput};

/// Leader length for the first block after motor-on, in bytes.
const LONG_LEADER_BYTES: u32 = 128;
/// Leader length between consecutive blocks, in bytes.
const SHORT_LEADER_BYTES: u32 = 48;
/// Silence written at motor-on and at close, in ticks (about half a second).
const REWRITE_SILENCE_TICKS: u32 = 7_159_090;

/// Pulse widths retained for cell-width estimation.
const RING_CAPACITY: usize = 64;

/// Fixed-size ring of recently observed pulse widths.
#[derive(Debug, Clone)]
pub struct PulseRing {
    buf: [u32; RING_CAPACITY],
    head: usize,
    len: usize,
}

impl PulseRing {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0; RING_CAPACITY],
            head: 0,
            len: 0,
        }
    }

    /// Record one width, evicting the oldest once full.
    pub fn push(&mut self, width: u32) {
        self.buf[self.head] = width;
        self.head = (self.head + 1) % RING_CAPACITY;
        self.len = (self.len + 1).min(RING_CAPACITY);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The retained widths. Order is not meaningful.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u32> {
        self.buf[..self.len].to_vec()
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl Default for PulseRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Estimate nominal cell widths from observed pulse (half-cycle) widths.
///
/// The widths are split at the midpoint of their range: the low cluster
/// holds `1`-cell half-cycles, the high cluster `0`-cell half-cycles, and
/// each cluster's average doubles into a full cell width. An empty cluster
/// falls back to the machine default for that bit.
#[must_use]
pub fn estimate_cells(widths: &[u32], defaults: CellTiming) -> CellTiming {
    if widths.is_empty() {
        return defaults;
    }
    let min = *widths.iter().min().unwrap_or(&0);
    let max = *widths.iter().max().unwrap_or(&0);
    let midpoint = min + (max - min) / 2;

    let mut low = (0u64, 0u64);
    let mut high = (0u64, 0u64);
    for &w in widths {
        if w < midpoint {
            low = (low.0 + u64::from(w), low.1 + 1);
        } else {
            high = (high.0 + u64::from(w), high.1 + 1);
        }
    }
    let bit1_cell = if low.1 == 0 {
        defaults.bit1_cell
    } else {
        2 * (low.0 / low.1) as u32
    };
    let bit0_cell = if high.1 == 0 {
        defaults.bit0_cell
    } else {
        2 * (high.0 / high.1) as u32
    };
    CellTiming::new(bit0_cell, bit1_cell)
}

/// Rewrite bookkeeping for one output tape.
///
/// `synced` tracks whether a block body is being written; everything that
/// ends a block (block end, seek, motor off, close) funnels through
/// [`Rewriter::desync`], which pads the output to a byte boundary and is a
/// no-op when already desynced.
pub struct Rewriter {
    defaults: CellTiming,
    ring: PulseRing,
    synced: bool,
    /// Leader length for the next block.
    leader_bytes: u32,
    /// Bit phase within the current output byte, 0..8.
    bit_count: u32,
    /// Whether the output currently ends in silence.
    silence: bool,
}

impl Rewriter {
    #[must_use]
    pub fn new(defaults: CellTiming) -> Self {
        Self {
            defaults,
            ring: PulseRing::new(),
            synced: false,
            leader_bytes: LONG_LEADER_BYTES,
            bit_count: 0,
            silence: false,
        }
    }

    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Record the half-cycle widths of one decoded source cell.
    pub fn observe(&mut self, first: u32, second: u32) {
        self.ring.push(first);
        self.ring.push(second);
    }

    /// Motor switched on: close out any block in progress, write silence,
    /// and arm a long leader for the next block.
    pub fn motor_on<T: TapeOutput>(&mut self, enc: &mut Encoder<T>) -> Result<(), TapeError> {
        self.desync(enc)?;
        enc.silence(REWRITE_SILENCE_TICKS)?;
        self.silence = true;
        self.leader_bytes = LONG_LEADER_BYTES;
        Ok(())
    }

    /// Sync byte observed in the source: estimate cell widths from the
    /// leader just consumed, then write a fresh leader and sync byte.
    pub fn sync_observed<T: TapeOutput>(&mut self, enc: &mut Encoder<T>) -> Result<(), TapeError> {
        if self.synced {
            return Ok(());
        }
        let cells = estimate_cells(&self.ring.snapshot(), self.defaults);
        log::debug!(
            "rewrite sync: cells {}:{} over {} leader bytes",
            cells.bit0_cell,
            cells.bit1_cell,
            self.leader_bytes
        );
        enc.set_cells(cells);
        enc.leader(self.leader_bytes)?;
        enc.sync()?;
        self.synced = true;
        self.bit_count = 0;
        // The leader ended any silence the output was left in.
        self.silence = false;
        Ok(())
    }

    /// Re-emit one decoded block bit.
    pub fn bit<T: TapeOutput>(&mut self, enc: &mut Encoder<T>, bit: bool) -> Result<(), TapeError> {
        if !self.synced {
            // Bits arriving outside a block are a caller sequencing bug;
            // drop them rather than corrupt the output framing.
            log::debug!("rewrite bit with no sync, dropped");
            return Ok(());
        }
        enc.bit_out(bit)?;
        self.bit_count = (self.bit_count + 1) & 7;
        self.silence = false;
        Ok(())
    }

    /// End of a decoded block: close it out and arm a short leader.
    pub fn end_of_block<T: TapeOutput>(&mut self, enc: &mut Encoder<T>) -> Result<(), TapeError> {
        self.desync(enc)?;
        self.leader_bytes = SHORT_LEADER_BYTES;
        Ok(())
    }

    /// Leave the synced state: pad the current partial byte with the
    /// leader's alternating bit pattern, then one trailer byte unless the
    /// output already ends in silence. Idempotent.
    pub fn desync<T: TapeOutput>(&mut self, enc: &mut Encoder<T>) -> Result<(), TapeError> {
        if !self.synced {
            return Ok(());
        }
        while self.bit_count != 0 {
            // Leader bytes carry a 1 at even bit positions.
            enc.bit_out(self.bit_count & 1 == 0)?;
            self.bit_count = (self.bit_count + 1) & 7;
        }
        if !self.silence {
            enc.byte_out(LEADER_BYTE)?;
        }
        self.synced = false;
        Ok(())
    }

    /// Output tape ejected: close any block and end with silence.
    pub fn close<T: TapeOutput>(&mut self, enc: &mut Encoder<T>) -> Result<(), TapeError> {
        self.desync(enc)?;
        enc.silence(REWRITE_SILENCE_TICKS)?;
        self.silence = true;
        Ok(())
    }
}
