//! CRC-16 guard over the payload header.
//!
//! Reflected CRC-16/ANSI (polynomial `0xA001`, register seeded with
//! `0xFFFF`, LSB first). Catches transcription errors before any signature
//! math runs.

/// Reflected CRC-16 polynomial.
pub const CRC16_POLY: u16 = 0xA001;

/// Initial register value.
pub const CRC16_INIT: u16 = 0xFFFF;

/// Compute the CRC-16 of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Check a header against its expected checksum.
pub fn verify(header: &[u8], expected: u16) -> bool {
    crc16(header) == expected
}
