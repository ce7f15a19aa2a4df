//! FSK cassette pulse codec.
//!
//! Home-computer cassette interfaces store bytes as audio-frequency square
//! waves: each bit is a *cell* of two opposite-polarity pulses whose combined
//! width encodes the bit (a short cell at 2400 Hz is a `1`, a long cell at
//! 1200 Hz is a `0`). This crate converts between streams of
//! `(level, duration)` pulses and bits/bytes/blocks, in both directions:
//!
//! - [`Decoder`] pulls pulses from a [`TapeInput`] and assembles bits
//!   (pulse-pair threshold comparison), LSB-first bytes, and checksummed
//!   blocks, including name-block (directory) parsing.
//! - [`Encoder`] pushes bits/bytes/blocks to a [`TapeOutput`] as freshly
//!   synthesized pulses at configurable cell widths, plus leader, sync and
//!   calibrated-silence primitives.
//! - [`SineRenderer`] renders the pulse stream as half-sine amplitude steps
//!   for sample-oriented backends.
//!
//! Pulse durations are integer ticks of the machine crystal; the nominal
//! Dragon/CoCo timings at 14.31818 MHz are provided by
//! [`CellTiming::dragon`].

mod block;
mod crc;
mod decode;
mod encode;
mod error;
mod pulse;
mod timing;

pub use block::{Block, KIND_DATA, KIND_EOF, KIND_NAME, LEADER_BYTE, NameBlock, SYNC_BYTE};
pub use crc::crc16_ccitt;
pub use decode::Decoder;
pub use encode::{Encoder, PULSE_SPREAD, SampleSink, SineRenderer};
pub use error::TapeError;
pub use pulse::{MemoryTape, Pulse, TapeInput, TapeOutput};
pub use timing::CellTiming;
