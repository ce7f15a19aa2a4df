//! CPU register access for loader shadow routines.
//!
//! The shadow routines only ever touch the accumulator, the program counter
//! and two condition-code flags, so that is all the trait exposes. Both
//! supported CPUs keep carry and zero at the same condition-code bit
//! positions.

use emu_core::Bus;

const CC_CARRY: u8 = 0x01;
const CC_ZERO: u8 = 0x04;

/// The register slice a shadowed firmware routine reads and writes.
pub trait LoaderRegs {
    fn a(&self) -> u8;
    fn set_a(&mut self, value: u8);
    fn pc(&self) -> u16;
    fn set_pc(&mut self, value: u16);
    fn carry(&self) -> bool;
    fn set_carry(&mut self, carry: bool);
    fn set_zero(&mut self, zero: bool);
    fn sp(&self) -> u16;
    fn set_sp(&mut self, value: u16);

    /// Pop the firmware return address off the stack and jump to it,
    /// completing the shadowed routine's RTS.
    fn return_from_sub(&mut self, bus: &mut dyn Bus);
}

/// MC6809 register file (Dragon 32/64, CoCo 1/2).
#[derive(Debug, Clone, Default)]
pub struct Mc6809Regs {
    pub a: u8,
    pub b: u8,
    pub dp: u8,
    pub x: u16,
    pub y: u16,
    pub u: u16,
    pub s: u16,
    pub pc: u16,
    pub cc: u8,
}

impl LoaderRegs for Mc6809Regs {
    fn a(&self) -> u8 {
        self.a
    }

    fn set_a(&mut self, value: u8) {
        self.a = value;
    }

    fn pc(&self) -> u16 {
        self.pc
    }

    fn set_pc(&mut self, value: u16) {
        self.pc = value;
    }

    fn carry(&self) -> bool {
        self.cc & CC_CARRY != 0
    }

    fn set_carry(&mut self, carry: bool) {
        if carry {
            self.cc |= CC_CARRY;
        } else {
            self.cc &= !CC_CARRY;
        }
    }

    fn set_zero(&mut self, zero: bool) {
        if zero {
            self.cc |= CC_ZERO;
        } else {
            self.cc &= !CC_ZERO;
        }
    }

    fn sp(&self) -> u16 {
        self.s
    }

    fn set_sp(&mut self, value: u16) {
        self.s = value;
    }

    fn return_from_sub(&mut self, bus: &mut dyn Bus) {
        // RTS: the hardware stack pointer addresses the last pushed byte,
        // the PC high byte.
        let high = bus.read(self.s);
        let low = bus.read(self.s.wrapping_add(1));
        self.s = self.s.wrapping_add(2);
        self.pc = u16::from(high) << 8 | u16::from(low);
    }
}

/// MC6801/6803 register file (MC-10, Alice).
#[derive(Debug, Clone, Default)]
pub struct Mc6801Regs {
    pub a: u8,
    pub b: u8,
    pub x: u16,
    pub sp: u16,
    pub pc: u16,
    pub ccr: u8,
}

impl LoaderRegs for Mc6801Regs {
    fn a(&self) -> u8 {
        self.a
    }

    fn set_a(&mut self, value: u8) {
        self.a = value;
    }

    fn pc(&self) -> u16 {
        self.pc
    }

    fn set_pc(&mut self, value: u16) {
        self.pc = value;
    }

    fn carry(&self) -> bool {
        self.ccr & CC_CARRY != 0
    }

    fn set_carry(&mut self, carry: bool) {
        if carry {
            self.ccr |= CC_CARRY;
        } else {
            self.ccr &= !CC_CARRY;
        }
    }

    fn set_zero(&mut self, zero: bool) {
        if zero {
            self.ccr |= CC_ZERO;
        } else {
            self.ccr &= !CC_ZERO;
        }
    }

    fn sp(&self) -> u16 {
        self.sp
    }

    fn set_sp(&mut self, value: u16) {
        self.sp = value;
    }

    fn return_from_sub(&mut self, bus: &mut dyn Bus) {
        // RTS: the 6801 stack pointer addresses the next free byte, one
        // below the pushed PC high byte.
        let high = bus.read(self.sp.wrapping_add(1));
        let low = bus.read(self.sp.wrapping_add(2));
        self.sp = self.sp.wrapping_add(2);
        self.pc = u16::from(high) << 8 | u16::from(low);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::FlatBus;

    #[test]
    fn condition_flags_set_and_clear() {
        let mut regs = Mc6809Regs::default();
        regs.set_carry(true);
        regs.set_zero(true);
        assert!(regs.carry());
        assert_eq!(regs.cc, CC_CARRY | CC_ZERO);
        regs.set_carry(false);
        assert!(!regs.carry());
        assert_eq!(regs.cc, CC_ZERO);
    }

    #[test]
    fn mc6809_rts_pops_big_endian() {
        let mut bus = FlatBus::new();
        bus.write(0x7FFE, 0xBD);
        bus.write(0x7FFF, 0xE7);
        let mut regs = Mc6809Regs {
            s: 0x7FFE,
            ..Mc6809Regs::default()
        };
        regs.return_from_sub(&mut bus);
        assert_eq!(regs.pc, 0xBDE7);
        assert_eq!(regs.s, 0x8000);
    }

    #[test]
    fn mc6801_rts_pops_above_stack_pointer() {
        let mut bus = FlatBus::new();
        bus.write(0x4FFF, 0xFF);
        bus.write(0x5000, 0x84);
        let mut regs = Mc6801Regs {
            sp: 0x4FFE,
            ..Mc6801Regs::default()
        };
        regs.return_from_sub(&mut bus);
        assert_eq!(regs.pc, 0xFF84);
        assert_eq!(regs.sp, 0x5000);
    }
}
