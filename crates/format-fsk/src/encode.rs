//! Pulse-stream synthesis: bits, bytes, blocks, leader, silence.

use crate::block::{LEADER_BYTE, SYNC_BYTE};
use crate::pulse::{Pulse, TapeOutput};
use crate::timing::CellTiming;
use crate::TapeError;

/// Fixed asymmetry, in ticks, between the two half-cycles of a synthesized
/// bit cell. The first pulse is narrowed and the second widened by this
/// amount, so the summed cell width the decoder sees stays exactly nominal.
pub const PULSE_SPREAD: u32 = 176;

/// Encodes bits, bytes and framed blocks onto a [`TapeOutput`] as freshly
/// synthesized pulses.
///
/// Cell widths default to the nominal profile but can be replaced with
/// measured widths (the rewrite engine does this after estimating the
/// source recording's timing).
pub struct Encoder<T: TapeOutput> {
    tape: T,
    cells: CellTiming,
    /// Polarity of the next pulse; alternates per pulse so the synthesized
    /// waveform stays a continuous square wave.
    level: bool,
}

impl<T: TapeOutput> Encoder<T> {
    pub fn new(tape: T, cells: CellTiming) -> Self {
        Self {
            tape,
            cells,
            level: true,
        }
    }

    #[must_use]
    pub fn cells(&self) -> CellTiming {
        self.cells
    }

    /// Replace the synthesis cell widths (e.g., with measured averages).
    pub fn set_cells(&mut self, cells: CellTiming) {
        self.cells = cells;
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

    fn pulse(&mut self, duration: u32) -> Result<(), TapeError> {
        let pulse = Pulse::new(self.level, duration);
        self.level = !self.level;
        self.tape.pulse_out(pulse)
    }

    /// Emit one bit as two opposite-polarity pulses summing to the nominal
    /// cell width.
    pub fn bit_out(&mut self, bit: bool) -> Result<(), TapeError> {
        let cell = if bit {
            self.cells.bit1_cell
        } else {
            self.cells.bit0_cell
        };
        let half = cell / 2;
        let first = half.saturating_sub(PULSE_SPREAD).max(1);
        self.pulse(first)?;
        self.pulse(cell - first)
    }

    /// Emit one byte, LSB first.
    pub fn byte_out(&mut self, byte: u8) -> Result<(), TapeError> {
        for bit in 0..8 {
            self.bit_out(byte & (1 << bit) != 0)?;
        }
        Ok(())
    }

    /// Emit `count` leader bytes (`$55`).
    pub fn leader(&mut self, count: u32) -> Result<(), TapeError> {
        for _ in 0..count {
            self.byte_out(LEADER_BYTE)?;
        }
        Ok(())
    }

    /// Emit the sync byte (`$3C`).
    pub fn sync(&mut self) -> Result<(), TapeError> {
        self.byte_out(SYNC_BYTE)
    }

    /// Emit one framed block: kind, length, data, trailing sum. The caller
    /// frames the surrounding leader and sync byte.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `data` exceeds the 255-byte block payload.
    pub fn block_out(&mut self, kind: u8, data: &[u8]) -> Result<(), TapeError> {
        debug_assert!(data.len() <= 255, "block payload too long");
        let length = data.len() as u8;
        self.byte_out(kind)?;
        self.byte_out(length)?;
        let mut sum = kind.wrapping_add(length);
        for &byte in data {
            sum = sum.wrapping_add(byte);
            self.byte_out(byte)?;
        }
        self.byte_out(sum)
    }

    /// Emit calibrated near-silence for `duration` ticks: the level held
    /// slightly above center for half the time, then slightly below, so the
    /// following leader's first bit is recognized cleanly.
    pub fn silence(&mut self, duration: u32) -> Result<(), TapeError> {
        let half = duration / 2;
        self.tape.hint_silence(true);
        self.tape.pulse_out(Pulse::new(true, half))?;
        self.tape.pulse_out(Pulse::new(false, duration - half))?;
        self.tape.hint_silence(false);
        // The next pulse starts a fresh cycle.
        self.level = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Half-sine sample rendering
// ---------------------------------------------------------------------------

/// Receives amplitude-resolved sample runs from the [`SineRenderer`].
pub trait SampleSink {
    /// One run of samples at a constant amplitude for `duration` ticks.
    fn sample(&mut self, amplitude: i16, duration: u32);
}

/// Half-sine amplitude profile, 64 steps.
const SINE_HALF: [i16; 64] = [
    785, 2354, 3917, 5471, 7011, 8535, 10038, 11517, //
    12968, 14388, 15773, 17120, 18426, 19687, 20902, 22065, //
    23176, 24231, 25227, 26163, 27035, 27843, 28583, 29255, //
    29856, 30385, 30841, 31222, 31529, 31759, 31913, 31990, //
    31990, 31913, 31759, 31529, 31222, 30841, 30385, 29856, //
    29255, 28583, 27843, 27035, 26163, 25227, 24231, 23176, //
    22065, 20902, 19687, 18426, 17120, 15773, 14388, 12968, //
    11517, 10038, 8535, 7011, 5471, 3917, 2354, 785,
];

/// Amplitude used while the silence hint is active: just off center, above
/// or below depending on level.
const SILENCE_AMPLITUDE: i16 = 256;

/// Renders each pulse as 64 half-sine amplitude steps for sample-oriented
/// backends (audio-style containers).
///
/// Step widths are `duration / 64`; the fractional remainder is spread
/// across the steps through an accumulator carried between pulses, so the
/// rendered steps of every pulse sum to exactly its duration and no
/// rounding error accumulates over a long recording.
pub struct SineRenderer<S: SampleSink> {
    sink: S,
    /// Subdivision remainder accumulator, in 64ths of a tick.
    frac: u32,
    silence: bool,
    rendered: u64,
}

impl<S: SampleSink> SineRenderer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            frac: 0,
            silence: false,
            rendered: 0,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

impl<S: SampleSink> TapeOutput for SineRenderer<S> {
    fn pulse_out(&mut self, pulse: Pulse) -> Result<(), TapeError> {
        let base = pulse.duration / 64;
        let rem = pulse.duration % 64;
        let sign: i32 = if pulse.level { 1 } else { -1 };
        for &step in &SINE_HALF {
            let mut duration = base;
            self.frac += rem;
            if self.frac >= 64 {
                self.frac -= 64;
                duration += 1;
            }
            if duration == 0 {
                continue;
            }
            let amplitude = if self.silence {
                SILENCE_AMPLITUDE * sign as i16
            } else {
                (i32::from(step) * sign) as i16
            };
            self.sink.sample(amplitude, duration);
            self.rendered += u64::from(duration);
        }
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.rendered
    }

    fn hint_silence(&mut self, on: bool) {
        self.silence = on;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::MemoryTape;

    #[test]
    fn bit_cells_sum_to_nominal_width() {
        let timing = CellTiming::dragon();
        let mut enc = Encoder::new(MemoryTape::new(), timing);
        enc.bit_out(false).expect("bit 0");
        enc.bit_out(true).expect("bit 1");
        let pulses = enc.into_inner();
        let pulses = pulses.pulses();
        assert_eq!(pulses.len(), 4);
        assert_eq!(pulses[0].duration + pulses[1].duration, timing.bit0_cell);
        assert_eq!(pulses[2].duration + pulses[3].duration, timing.bit1_cell);
        // Polarity alternates across the whole stream.
        assert!(pulses[0].level);
        assert!(!pulses[1].level);
        assert!(pulses[2].level);
        assert!(!pulses[3].level);
    }

    #[test]
    fn spread_offsets_the_half_cycles() {
        let timing = CellTiming::dragon();
        let mut enc = Encoder::new(MemoryTape::new(), timing);
        enc.bit_out(false).expect("bit");
        let tape = enc.into_inner();
        let half = timing.bit0_cell / 2;
        assert_eq!(tape.pulses()[0].duration, half - PULSE_SPREAD);
        assert_eq!(
            tape.pulses()[1].duration,
            timing.bit0_cell - (half - PULSE_SPREAD)
        );
    }

    #[test]
    fn silence_splits_duration_above_then_below() {
        let mut enc = Encoder::new(MemoryTape::new(), CellTiming::dragon());
        enc.silence(100_001).expect("silence");
        let tape = enc.into_inner();
        let pulses = tape.pulses();
        assert_eq!(pulses.len(), 2);
        assert!(pulses[0].level);
        assert!(!pulses[1].level);
        assert_eq!(pulses[0].duration + pulses[1].duration, 100_001);
    }

    struct Runs(Vec<(i16, u32)>);

    impl SampleSink for Runs {
        fn sample(&mut self, amplitude: i16, duration: u32) {
            self.0.push((amplitude, duration));
        }
    }

    #[test]
    fn rendered_steps_sum_exactly_to_pulse_width() {
        let mut renderer = SineRenderer::new(Runs(Vec::new()));
        // Widths with awkward remainders, over many pulses.
        let widths = [5965u32, 11931, 777, 64, 65, 6001];
        let mut total = 0u64;
        for (i, &w) in widths.iter().cycle().take(60).enumerate() {
            renderer
                .pulse_out(Pulse::new(i % 2 == 0, w))
                .expect("render");
            total += u64::from(w);
        }
        let rendered: u64 = renderer
            .sink()
            .0
            .iter()
            .map(|&(_, d)| u64::from(d))
            .sum();
        assert_eq!(rendered, total);
        assert_eq!(renderer.tell(), total);
    }

    #[test]
    fn render_follows_half_sine_and_level_sign() {
        let mut renderer = SineRenderer::new(Runs(Vec::new()));
        renderer.pulse_out(Pulse::new(false, 6400)).expect("render");
        let runs = &renderer.sink().0;
        assert_eq!(runs.len(), 64);
        // Negative polarity, rising to the mid-pulse peak then falling.
        assert!(runs.iter().all(|&(a, _)| a < 0));
        assert_eq!(runs[31].0, -SINE_HALF[31]);
        assert!(runs[0].0 > runs[31].0);
        assert_eq!(runs[0].0, runs[63].0);
    }

    #[test]
    fn silence_hint_renders_near_zero() {
        let mut renderer = SineRenderer::new(Runs(Vec::new()));
        renderer.hint_silence(true);
        renderer.pulse_out(Pulse::new(true, 6400)).expect("render");
        renderer.hint_silence(false);
        assert!(renderer.sink().0.iter().all(|&(a, _)| a == SILENCE_AMPLITUDE));
    }
}
