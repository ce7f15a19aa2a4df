//! Block framing and name-block (directory) metadata.
//!
//! A cassette block is framed as: sync byte `$3C`, kind byte, length byte,
//! `length` data bytes, and a trailing sum byte. The running sum is
//! `kind + length + Σdata` (wrapping); a valid block leaves a zero residual
//! after subtracting the trailing byte. Blocks are preceded by a leader of
//! `$55` bytes so the reader's clock recovery can lock on.

use crate::crc::crc16_ccitt;

/// Leader byte: alternating bit pattern transmitted before each block.
pub const LEADER_BYTE: u8 = 0x55;

/// Sync byte: ends the leader, starts block framing.
pub const SYNC_BYTE: u8 = 0x3C;

/// Block kind: name (directory) block.
pub const KIND_NAME: u8 = 0x00;
/// Block kind: file data.
pub const KIND_DATA: u8 = 0x01;
/// Block kind: end of file.
pub const KIND_EOF: u8 = 0xFF;

/// One decoded block: kind, payload, and checksum residual.
///
/// The residual is `sum - trailing_byte` (wrapping); zero means the block
/// checksummed correctly. Checksum failures are never fatal; scanners skip
/// the block and resynchronize at the next leader.
#[derive(Debug, Clone)]
pub struct Block {
    pub kind: u8,
    pub data: Vec<u8>,
    pub residual: u8,
}

impl Block {
    #[must_use]
    pub fn checksum_ok(&self) -> bool {
        self.residual == 0
    }
}

/// Metadata decoded from a name block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameBlock {
    /// File name, trailing spaces trimmed.
    pub name: String,
    /// File type byte (0 = BASIC, 1 = data, 2 = machine code).
    pub file_type: u8,
    /// ASCII (`true`) or binary (`false`) encoding.
    pub ascii: bool,
    /// Gapped (`true`) or continuous (`false`) data blocks follow.
    pub gapped: bool,
    /// Execution address for machine-code files.
    pub exec_addr: u16,
    /// Load address for machine-code files.
    pub load_addr: u16,
    /// CRC-16/CCITT over the whole block payload: a content fingerprint
    /// for autorun heuristics, not an integrity check.
    pub fingerprint: u16,
}

impl NameBlock {
    /// Minimum payload length of a name block.
    pub const MIN_LEN: usize = 15;

    /// Decode name-block metadata, or `None` if `block` is not a name block
    /// (wrong kind or short payload).
    #[must_use]
    pub fn parse(block: &Block) -> Option<Self> {
        if block.kind != KIND_NAME || block.data.len() < Self::MIN_LEN {
            return None;
        }
        let data = &block.data;
        let name: String = data[0..8]
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
            .collect();
        Some(Self {
            name: name.trim_end_matches(' ').to_string(),
            file_type: data[8],
            ascii: data[9] != 0,
            gapped: data[10] != 0,
            exec_addr: u16::from(data[11]) << 8 | u16::from(data[12]),
            load_addr: u16::from(data[13]) << 8 | u16::from(data[14]),
            fingerprint: crc16_ccitt(0xFFFF, data),
        })
    }
}
