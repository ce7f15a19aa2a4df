//! Dragon and MC-10 cassette subsystem.
//!
//! Ties the pulse codec to an emulated machine: a [`TapeDeck`] with input
//! and output tapes, file enumeration over name blocks, firmware fast
//! loading by shadow execution ([`fastload`]), and re-synthesis of a clean
//! recording while a tape loads ([`rewrite`]). [`CassetteMachine`] wires it
//! all to an event queue and a breakpoint session from `emu-core`.

pub mod config;
pub mod fastload;
pub mod machine;
pub mod registers;
pub mod rewrite;
pub mod tape;

pub use config::{MachineConfig, MachineVariant, RomHooks};
pub use fastload::{BitSample, Phase, ShadowEngine};
pub use machine::{CassetteMachine, TapeCore};
pub use registers::{LoaderRegs, Mc6801Regs, Mc6809Regs};
pub use rewrite::{Rewriter, estimate_cells};
pub use tape::{TapeDeck, TapeFileInfo};
