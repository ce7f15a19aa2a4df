//! Core traits and types for cycle-accurate emulation.
//!
//! Everything ticks at the master crystal frequency. All component timing
//! derives from this. No exceptions.
//!
//! Beyond the basic time and bus abstractions, this crate provides the two
//! pieces of machinery a machine needs to intercept its own execution: a
//! virtual-time [`EventQueue`] and a [`BreakpointSession`]. Both hand a
//! caller-supplied context to their callbacks, so machines stay free of
//! process-wide mutable state.

mod breakpoint;
mod bus;
mod scheduler;
mod tickable;
mod ticks;

pub use breakpoint::{BreakpointSession, Handler};
pub use bus::{Bus, FlatBus};
pub use scheduler::{EventId, EventQueue};
pub use tickable::Tickable;
pub use ticks::Ticks;
