//! Memory and I/O bus interface.

/// Memory and I/O bus interface.
///
/// Components access memory and peripherals through this trait. The bus
/// handles address decoding and routing to the appropriate device. Loader
/// shadow routines use it to read and write emulated memory without going
/// through the CPU interpreter.
pub trait Bus {
    /// Read a byte from the given address.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);
}

/// Flat 64 KiB RAM bus with no address decoding.
///
/// Enough for machines whose loader routines only touch plain memory, and
/// for tests.
pub struct FlatBus {
    memory: Box<[u8; 0x10000]>,
}

impl FlatBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: vec![0u8; 0x10000]
                .into_boxed_slice()
                .try_into()
                .unwrap_or_else(|_| unreachable!("sized above")),
        }
    }
}

impl Default for FlatBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for FlatBus {
    fn read(&mut self, address: u16) -> u8 {
        self.memory[usize::from(address)]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[usize::from(address)] = value;
    }
}
