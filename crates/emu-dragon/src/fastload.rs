//! Shadow execution of the firmware cassette-read routines.
//!
//! With fast loading enabled, breakpoints at the firmware entry points
//! divert execution here: each routine's effect is computed straight from
//! the pulse stream, the CPU-visible results land in the registers, and the
//! virtual time the real routine would have taken is accounted from the
//! consumed pulse durations plus a fixed per-routine overhead. On a signal
//! loss the routine aborts without committing any register state, leaving
//! the real firmware to run against normal playback.

use format_fsk::{CellTiming, Decoder, Pulse, TapeError, TapeInput};

use crate::registers::LoaderRegs;

/// Leader polarity detected by the sync hunt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Normal,
    Inverted,
}

/// One decoded bit together with the half-cycle widths that carried it.
#[derive(Debug, Clone, Copy)]
pub struct BitSample {
    pub bit: bool,
    pub first: u32,
    pub second: u32,
}

/// Crystal ticks per CPU cycle (the 6809/6801 E clock is crystal/16).
const TICKS_PER_CPU_CYCLE: u64 = 16;
/// Firmware motor spin-up delay, about half a second.
const MOTOR_DELAY_TICKS: u64 = 7_159_090;
/// Per-call firmware overhead outside the pulse waits, in CPU cycles.
const BIT_OVERHEAD_CYCLES: u64 = 28;
const BYTE_OVERHEAD_CYCLES: u64 = 46;
/// Consecutive consistent pulse pairs needed to lock onto a leader.
const LEADER_LOCK_PAIRS: i32 = 16;

/// Leader-hunt state. The four compare states read the closing half-cycle
/// of a pair whose opening polarity is known; the inverted flavors are
/// entered while an inverted-phase lock is in progress. All of them
/// converge on `Evaluate`, which folds the pair's verdict into the lock
/// counter.
enum SyncState {
    Hunt,
    CompareLow(u32),
    CompareHigh(u32),
    CompareLowInverted(u32),
    CompareHighInverted(u32),
    Evaluate { verdict: i32, first: u32, second: u32 },
}

/// Executes one firmware routine's worth of tape reading.
///
/// Borrowed fresh for each shadowed call; the accumulated elapsed time and
/// decoded bit samples are taken off it afterwards.
pub struct ShadowEngine<'a, T: TapeInput> {
    dec: &'a mut Decoder<T>,
    regs: &'a mut dyn LoaderRegs,
    timing: CellTiming,
    short_leader: bool,
    elapsed: u64,
    samples: Vec<BitSample>,
}

impl<'a, T: TapeInput> ShadowEngine<'a, T> {
    pub fn new(dec: &'a mut Decoder<T>, regs: &'a mut dyn LoaderRegs, short_leader: bool) -> Self {
        let timing = dec.timing();
        Self {
            dec,
            regs,
            timing,
            short_leader,
            elapsed: 0,
            samples: Vec::new(),
        }
    }

    /// Virtual time consumed so far, in ticks.
    #[must_use]
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// Decoded bits with their source widths, for the rewriter.
    pub fn take_samples(&mut self) -> Vec<BitSample> {
        std::mem::take(&mut self.samples)
    }

    fn pulse(&mut self) -> Result<Pulse, TapeError> {
        let pulse = self.dec.pulse_in()?;
        self.elapsed += u64::from(pulse.duration);
        Ok(pulse)
    }

    /// Decode the next plausible cell, recording it as a sample.
    fn sample_bit(&mut self) -> Result<BitSample, TapeError> {
        loop {
            let first = self.pulse()?;
            let second = self.pulse()?;
            let width = first.duration + second.duration;
            if width < self.timing.min_width() || width > self.timing.max_width() {
                continue;
            }
            let sample = BitSample {
                bit: width < self.timing.threshold(),
                first: first.duration,
                second: second.duration,
            };
            self.samples.push(sample);
            return Ok(sample);
        }
    }

    /// Half-cycle plausibility for leader pulses.
    fn leader_half(&self, width: u32) -> bool {
        width >= self.timing.bit1_cell / 4 && width <= self.timing.bit0_cell
    }

    /// Shadow the motor-on routine: consume tape covering the firmware's
    /// spin-up delay. Skipped for tapes with a leader too short to survive
    /// the delay.
    pub fn motor_on(&mut self) -> Result<(), TapeError> {
        if self.short_leader {
            return Ok(());
        }
        let target = self.elapsed + MOTOR_DELAY_TICKS;
        while self.elapsed < target {
            // Whole cells: stopping mid-cell would leave later bit decodes
            // pairing across cell boundaries.
            self.pulse()?;
            self.pulse()?;
        }
        Ok(())
    }

    /// Shadow the leader-sync routine: lock bit-cell phase against the
    /// leader tone.
    ///
    /// Each plausible pulse pair votes for normal phase (high half-cycle
    /// first) or inverted phase (low first). Consistent votes accumulate,
    /// an opposing vote restarts the count on the other side, and an
    /// implausible pair clears it. The counter reaching the lock threshold
    /// on either side ends the hunt.
    pub fn sync_leader(&mut self) -> Result<Phase, TapeError> {
        let mut counter: i32 = 0;
        let mut state = SyncState::Hunt;
        loop {
            state = match state {
                SyncState::Hunt => {
                    let pulse = self.pulse()?;
                    match (pulse.level, counter < 0) {
                        (true, false) => SyncState::CompareHigh(pulse.duration),
                        (false, false) => SyncState::CompareLow(pulse.duration),
                        (true, true) => SyncState::CompareHighInverted(pulse.duration),
                        (false, true) => SyncState::CompareLowInverted(pulse.duration),
                    }
                }
                SyncState::CompareHigh(first) | SyncState::CompareHighInverted(first) => {
                    let second = self.pulse()?;
                    let ok = !second.level
                        && self.leader_half(first)
                        && self.leader_half(second.duration);
                    SyncState::Evaluate {
                        verdict: i32::from(ok),
                        first,
                        second: second.duration,
                    }
                }
                SyncState::CompareLow(first) | SyncState::CompareLowInverted(first) => {
                    let second = self.pulse()?;
                    let ok = second.level
                        && self.leader_half(first)
                        && self.leader_half(second.duration);
                    SyncState::Evaluate {
                        verdict: -i32::from(ok),
                        first,
                        second: second.duration,
                    }
                }
                SyncState::Evaluate {
                    verdict,
                    first,
                    second,
                } => {
                    if verdict != 0 {
                        let width = first + second;
                        self.samples.push(BitSample {
                            bit: width < self.timing.threshold(),
                            first,
                            second,
                        });
                    }
                    counter = match verdict {
                        0 => 0,
                        v if (v > 0) == (counter >= 0) => counter + v,
                        v => v,
                    };
                    if counter >= LEADER_LOCK_PAIRS {
                        return Ok(Phase::Normal);
                    }
                    if counter <= -LEADER_LOCK_PAIRS {
                        return Ok(Phase::Inverted);
                    }
                    SyncState::Hunt
                }
            };
        }
    }

    /// Shadow the single-bit read: result in carry.
    pub fn bit_in(&mut self) -> Result<bool, TapeError> {
        let sample = self.sample_bit()?;
        self.elapsed += BIT_OVERHEAD_CYCLES * TICKS_PER_CPU_CYCLE;
        self.regs.set_carry(sample.bit);
        Ok(sample.bit)
    }

    /// Shadow the single-byte read: result in the accumulator, zero flag
    /// updated. Registers are only committed once all eight bits decoded.
    pub fn byte_in(&mut self) -> Result<u8, TapeError> {
        let mut byte = 0u8;
        for bit in 0..8 {
            if self.sample_bit()?.bit {
                byte |= 1 << bit;
            }
        }
        self.elapsed += BYTE_OVERHEAD_CYCLES * TICKS_PER_CPU_CYCLE;
        self.regs.set_a(byte);
        self.regs.set_zero(byte == 0);
        Ok(byte)
    }
}
