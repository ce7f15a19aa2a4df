//! CRC-16/CCITT.

/// CRC-16/CCITT (polynomial `0x1021`, MSB-first, no final inversion) over
/// `data`, starting from `seed`.
///
/// Used as a fast content fingerprint over block payloads, not as an
/// integrity check; cassette blocks carry their own sum byte.
#[must_use]
pub fn crc16_ccitt(seed: u16, data: &[u8]) -> u16 {
    let mut crc = seed;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}
