//! CAS cassette image backend.
//!
//! CAS is the simplest cassette container: the decoded byte stream with no
//! pulse timing at all. Reading synthesizes pulses bit by bit (LSB first,
//! two half-cycles per bit) at nominal cell widths; writing thresholds
//! incoming pulse pairs back into bits and packs them into bytes. Offsets
//! are byte offsets into the image.

use std::io::SeekFrom;
use std::path::Path;

use format_fsk::{CellTiming, Pulse, TapeError, TapeInput, TapeOutput};

/// A CAS image with pulse-level read/write cursors.
pub struct CasTape {
    data: Vec<u8>,
    timing: CellTiming,
    /// Read cursor: byte index, bit index within the byte, and whether the
    /// second half-cycle of the current bit is still pending.
    pos: usize,
    bit: u8,
    second_half: bool,
    level: bool,
    /// Write state: first pulse of a pending pair, and the byte being
    /// assembled.
    pending: Option<u32>,
    wbyte: u8,
    wbits: u8,
}

impl CasTape {
    #[must_use]
    pub fn new(timing: CellTiming) -> Self {
        Self::from_bytes(Vec::new(), timing)
    }

    #[must_use]
    pub fn from_bytes(data: Vec<u8>, timing: CellTiming) -> Self {
        Self {
            data,
            timing,
            pos: 0,
            bit: 0,
            second_half: false,
            level: true,
            pending: None,
            wbyte: 0,
            wbits: 0,
        }
    }

    /// Load a CAS image from disk.
    ///
    /// # Errors
    ///
    /// Returns [`TapeError::Io`] if the file cannot be read.
    pub fn load(path: &Path, timing: CellTiming) -> Result<Self, TapeError> {
        let data = std::fs::read(path)?;
        Ok(Self::from_bytes(data, timing))
    }

    /// Flush any partial write byte and save the image to disk.
    ///
    /// # Errors
    ///
    /// Returns [`TapeError::Io`] if the file cannot be written.
    pub fn save(&mut self, path: &Path) -> Result<(), TapeError> {
        self.flush();
        std::fs::write(path, &self.data)?;
        Ok(())
    }

    /// Pad and emit a partially assembled write byte, if any.
    pub fn flush(&mut self) {
        if self.wbits > 0 {
            self.data.push(self.wbyte);
            self.wbyte = 0;
            self.wbits = 0;
        }
        self.pending = None;
    }

    /// Image bytes decoded so far.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl TapeInput for CasTape {
    fn pulse_in(&mut self) -> Result<Pulse, TapeError> {
        let Some(&byte) = self.data.get(self.pos) else {
            return Err(TapeError::NoPulses);
        };
        let bit = byte & (1 << self.bit) != 0;
        let cell = if bit {
            self.timing.bit1_cell
        } else {
            self.timing.bit0_cell
        };
        let half = cell / 2;
        let duration = if self.second_half { cell - half } else { half };
        let pulse = Pulse::new(self.level, duration);
        self.level = !self.level;

        if self.second_half {
            self.second_half = false;
            self.bit += 1;
            if self.bit == 8 {
                self.bit = 0;
                self.pos += 1;
            }
        } else {
            self.second_half = true;
        }
        Ok(pulse)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, TapeError> {
        let target = match pos {
            SeekFrom::Start(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => self.data.len() as i64 + delta,
        };
        if target < 0 || target > self.data.len() as i64 {
            return Err(TapeError::SeekRange { offset: target });
        }
        self.pos = target as usize;
        self.bit = 0;
        self.second_half = false;
        Ok(self.pos as u64)
    }

    fn tell(&self) -> u64 {
        self.pos as u64
    }
}

impl TapeOutput for CasTape {
    fn pulse_out(&mut self, pulse: Pulse) -> Result<(), TapeError> {
        let Some(first) = self.pending.take() else {
            self.pending = Some(pulse.duration);
            return Ok(());
        };
        let width = first + pulse.duration;
        if width < self.timing.min_width() || width > self.timing.max_width() {
            // Silence or a glitch: CAS stores no gaps, drop the cell.
            log::trace!("cas: dropping implausible cell of width {width}");
            return Ok(());
        }
        if width < self.timing.threshold() {
            self.wbyte |= 1 << self.wbits;
        }
        self.wbits += 1;
        if self.wbits == 8 {
            self.data.push(self.wbyte);
            self.wbyte = 0;
            self.wbits = 0;
        }
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.data.len() as u64
    }
}
