//! Bit-cell timing profiles.

/// Nominal bit-cell widths for one machine, in crystal ticks.
///
/// A bit cell is one full signal cycle (two pulses). The firmware
/// distinguishes bits by total cell width: below the threshold is a `1`
/// (the faster 2400 Hz cycle), at or above is a `0` (1200 Hz).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellTiming {
    /// Full cell width of a `0` bit (1200 Hz cycle).
    pub bit0_cell: u32,
    /// Full cell width of a `1` bit (2400 Hz cycle).
    pub bit1_cell: u32,
}

impl CellTiming {
    #[must_use]
    pub const fn new(bit0_cell: u32, bit1_cell: u32) -> Self {
        Self {
            bit0_cell,
            bit1_cell,
        }
    }

    /// Derive cell widths from a crystal frequency (1200/2400 Hz cells).
    #[must_use]
    pub const fn from_crystal(frequency_hz: u64) -> Self {
        Self {
            bit0_cell: (frequency_hz / 1200) as u32,
            bit1_cell: (frequency_hz / 2400) as u32,
        }
    }

    /// Dragon/CoCo timing at the 14.31818 MHz NTSC crystal.
    #[must_use]
    pub const fn dragon() -> Self {
        Self::from_crystal(14_318_180)
    }

    /// Decision threshold: a cell narrower than this is a `1`.
    #[must_use]
    pub const fn threshold(&self) -> u32 {
        (self.bit0_cell + self.bit1_cell) / 2
    }

    /// Narrowest plausible cell: half the shortest legal `1` cell.
    #[must_use]
    pub const fn min_width(&self) -> u32 {
        self.bit1_cell / 2
    }

    /// Widest plausible cell: twice the longest legal `0` cell.
    #[must_use]
    pub const fn max_width(&self) -> u32 {
        self.bit0_cell * 2
    }
}

impl Default for CellTiming {
    fn default() -> Self {
        Self::dragon()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dragon_profile() {
        let t = CellTiming::dragon();
        assert_eq!(t.bit0_cell, 11931);
        assert_eq!(t.bit1_cell, 5965);
        assert_eq!(t.threshold(), 8948);
        assert_eq!(t.min_width(), 2982);
        assert_eq!(t.max_width(), 23862);
    }

    #[test]
    fn nominal_cells_fall_inside_the_plausible_window() {
        let t = CellTiming::dragon();
        assert!(t.bit1_cell > t.min_width());
        assert!(t.bit0_cell < t.max_width());
        assert!(t.bit1_cell < t.threshold());
        assert!(t.bit0_cell >= t.threshold());
    }
}
