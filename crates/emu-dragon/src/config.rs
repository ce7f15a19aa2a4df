//! Machine variants and cassette configuration.

use format_fsk::CellTiming;

/// Supported cassette host machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineVariant {
    /// Dragon 32/64 (MC6809, Microsoft Extended BASIC).
    Dragon64,
    /// Tandy MC-10 (MC6801, Micro Color BASIC).
    Mc10,
}

/// Firmware entry points the fast loader and rewriter hook.
#[derive(Debug, Clone, Copy)]
pub struct RomHooks {
    /// Motor-on routine: switches the relay and spins the tape up.
    pub motor_on: u16,
    /// Leader sync routine: locks bit-cell phase against the leader tone.
    pub sync_leader: u16,
    /// Single-bit read, result in carry.
    pub bit_in: u16,
    /// Single-byte read, result in the accumulator.
    pub byte_in: u16,
    /// Return point after a whole block has been consumed.
    pub block_end: u16,
}

/// Per-machine cassette configuration.
#[derive(Debug, Clone, Copy)]
pub struct MachineConfig {
    pub variant: MachineVariant,
    pub timing: CellTiming,
    /// Leader lengths (in bytes) below this skip the firmware motor-on
    /// delay during fast loading. Recordings made by older firmware carry
    /// leaders too short to survive the delay.
    pub short_leader_threshold: u32,
    pub hooks: RomHooks,
}

impl MachineConfig {
    #[must_use]
    pub const fn dragon64() -> Self {
        Self {
            variant: MachineVariant::Dragon64,
            timing: CellTiming::dragon(),
            short_leader_threshold: 114,
            hooks: RomHooks {
                motor_on: 0xBDC5,
                sync_leader: 0xBDE7,
                bit_in: 0xBDAD,
                byte_in: 0xBD99,
                block_end: 0xB94D,
            },
        }
    }

    #[must_use]
    pub const fn mc10() -> Self {
        Self {
            variant: MachineVariant::Mc10,
            timing: CellTiming::dragon(),
            short_leader_threshold: 80,
            hooks: RomHooks {
                motor_on: 0xFF38,
                sync_leader: 0xFF53,
                bit_in: 0xFF7C,
                byte_in: 0xFF8A,
                block_end: 0xFEE5,
            },
        }
    }

    #[must_use]
    pub const fn for_variant(variant: MachineVariant) -> Self {
        match variant {
            MachineVariant::Dragon64 => Self::dragon64(),
            MachineVariant::Mc10 => Self::mc10(),
        }
    }
}
