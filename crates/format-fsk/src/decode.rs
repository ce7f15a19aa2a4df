//! Pulse-stream decoding: bits, bytes, blocks.

use crate::block::{Block, SYNC_BYTE};
use crate::pulse::TapeInput;
use crate::timing::CellTiming;
use crate::TapeError;

/// Decodes a pulse stream into bits, bytes and framed blocks.
///
/// Bit decode is a pulse-pair threshold comparison: two consecutive pulses
/// form one cell, and the summed width classifies the bit. Cells outside the
/// plausible window are rejected and decoding retries from the next pulse
/// pair; implausible widths are recovered from, never surfaced as errors.
pub struct Decoder<T: TapeInput> {
    tape: T,
    timing: CellTiming,
    /// Widths of the two pulses of the last decoded cell. The rewrite
    /// engine samples these to estimate the source recording's widths.
    last_cell: (u32, u32),
}

impl<T: TapeInput> Decoder<T> {
    pub fn new(tape: T, timing: CellTiming) -> Self {
        Self {
            tape,
            timing,
            last_cell: (0, 0),
        }
    }

    #[must_use]
    pub fn timing(&self) -> CellTiming {
        self.timing
    }

    pub fn tape(&self) -> &T {
        &self.tape
    }

    pub fn tape_mut(&mut self) -> &mut T {
        &mut self.tape
    }

    pub fn into_inner(self) -> T {
        self.tape
    }

    /// Pulse widths of the most recently decoded cell.
    #[must_use]
    pub fn last_cell(&self) -> (u32, u32) {
        self.last_cell
    }

    /// Pull one pulse from the backing tape.
    pub fn pulse_in(&mut self) -> Result<crate::Pulse, TapeError> {
        self.tape.pulse_in()
    }

    /// Decode one bit from the next plausible pulse pair.
    pub fn bit_in(&mut self) -> Result<bool, TapeError> {
        loop {
            let first = self.tape.pulse_in()?;
            let second = self.tape.pulse_in()?;
            let width = first.duration + second.duration;
            if width < self.timing.min_width() || width > self.timing.max_width() {
                // Implausible cell: drop it and retry on the next pair.
                continue;
            }
            self.last_cell = (first.duration, second.duration);
            return Ok(width < self.timing.threshold());
        }
    }

    /// Assemble one byte, LSB first.
    pub fn byte_in(&mut self) -> Result<u8, TapeError> {
        let mut byte = 0u8;
        for bit in 0..8 {
            if self.bit_in()? {
                byte |= 1 << bit;
            }
        }
        Ok(byte)
    }

    /// Hunt for the end of a leader: shift decoded bits through a window
    /// until the sync byte appears. Returns the tape offset just past the
    /// sync byte; seeking back to that offset and calling [`Self::block_in`]
    /// re-reads the same block.
    pub fn sync_to_block(&mut self) -> Result<u64, TapeError> {
        let mut window = 0u8;
        loop {
            // Bytes arrive LSB first, so new bits shift in from the top.
            window >>= 1;
            if self.bit_in()? {
                window |= 0x80;
            }
            if window == SYNC_BYTE {
                return Ok(self.tape.tell());
            }
        }
    }

    /// Read one framed block. The sync byte must already have been consumed
    /// (normally via [`Self::sync_to_block`]).
    ///
    /// A checksum mismatch is reported through [`Block::residual`] and logged
    /// at debug verbosity; it does not abort the read.
    pub fn block_in(&mut self) -> Result<Block, TapeError> {
        let kind = self.byte_in()?;
        let length = self.byte_in()?;
        let mut sum = kind.wrapping_add(length);
        let mut data = Vec::with_capacity(usize::from(length));
        for _ in 0..length {
            let byte = self.byte_in()?;
            sum = sum.wrapping_add(byte);
            data.push(byte);
        }
        let trailing = self.byte_in()?;
        let residual = sum.wrapping_sub(trailing);
        if residual != 0 {
            log::debug!(
                "block checksum mismatch: kind {kind:#04x} length {length} residual {residual:#04x}"
            );
        }
        Ok(Block {
            kind,
            data,
            residual,
        })
    }
}
