//! Pulse samples and the tape backend contract.

use std::io::SeekFrom;

use crate::TapeError;

/// One sample of the emulated tape signal: a level held for a duration.
///
/// Durations are integer ticks of the machine crystal. Values are copied
/// freely; nothing owns a pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// Signal level: `true` above the read threshold, `false` below.
    pub level: bool,
    /// Duration in ticks.
    pub duration: u32,
}

impl Pulse {
    #[must_use]
    pub const fn new(level: bool, duration: u32) -> Self {
        Self { level, duration }
    }
}

/// A readable tape: a stream of pulses with a seekable position.
///
/// Format-specific containers implement this plus [`TapeOutput`]; nothing
/// else about the container leaks through. Offset units are backend-defined
/// (pulse index for raw backends, byte offset for byte containers); callers
/// only ever seek to offsets previously returned by `tell` or `seek`.
pub trait TapeInput {
    /// Pull the next pulse, or [`TapeError::NoPulses`] at end of tape.
    fn pulse_in(&mut self) -> Result<Pulse, TapeError>;

    /// Reposition the stream. Returns the new offset.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, TapeError>;

    /// Current offset.
    fn tell(&self) -> u64;
}

/// A writable tape: accepts a stream of pulses.
pub trait TapeOutput {
    /// Append one pulse.
    fn pulse_out(&mut self, pulse: Pulse) -> Result<(), TapeError>;

    /// Current offset.
    fn tell(&self) -> u64;

    /// Hint: pulses until the matching `false` call are calibrated
    /// near-silence. Sample-oriented backends render them at near-zero
    /// amplitude; pulse-oriented backends ignore this.
    fn hint_silence(&mut self, _on: bool) {}

    /// Hint: input hysteresis for backends that re-read their own output.
    fn hint_hysteresis(&mut self, _percent: u8) {}
}

impl<T: TapeInput + ?Sized> TapeInput for Box<T> {
    fn pulse_in(&mut self) -> Result<Pulse, TapeError> {
        (**self).pulse_in()
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, TapeError> {
        (**self).seek(pos)
    }

    fn tell(&self) -> u64 {
        (**self).tell()
    }
}

impl<T: TapeOutput + ?Sized> TapeOutput for Box<T> {
    fn pulse_out(&mut self, pulse: Pulse) -> Result<(), TapeError> {
        (**self).pulse_out(pulse)
    }

    fn tell(&self) -> u64 {
        (**self).tell()
    }

    fn hint_silence(&mut self, on: bool) {
        (**self).hint_silence(on);
    }

    fn hint_hysteresis(&mut self, percent: u8) {
        (**self).hint_hysteresis(percent);
    }
}

/// In-memory raw pulse tape. Offsets are pulse indices.
///
/// The scratch backend: written through [`TapeOutput`], rewound, then read
/// back through [`TapeInput`]. Also the reference backend for tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryTape {
    pulses: Vec<Pulse>,
    pos: usize,
}

impl MemoryTape {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_pulses(pulses: Vec<Pulse>) -> Self {
        Self { pulses, pos: 0 }
    }

    /// All pulses recorded so far.
    #[must_use]
    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    /// Reposition to the start for reading back.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }
}

impl TapeInput for MemoryTape {
    fn pulse_in(&mut self) -> Result<Pulse, TapeError> {
        let pulse = self.pulses.get(self.pos).ok_or(TapeError::NoPulses)?;
        self.pos += 1;
        Ok(*pulse)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, TapeError> {
        let target = match pos {
            SeekFrom::Start(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => self.pulses.len() as i64 + delta,
        };
        if target < 0 || target > self.pulses.len() as i64 {
            return Err(TapeError::SeekRange { offset: target });
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    fn tell(&self) -> u64 {
        self.pos as u64
    }
}

impl TapeOutput for MemoryTape {
    fn pulse_out(&mut self, pulse: Pulse) -> Result<(), TapeError> {
        self.pulses.push(pulse);
        self.pos = self.pulses.len();
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pulses.len() as u64
    }
}
