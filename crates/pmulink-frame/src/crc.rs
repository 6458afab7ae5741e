//! CRC16 used by the frame trailer.

/// Seed for the frame checksum.
pub const CRC16_INIT: u16 = 0xFFFF;

/// Reflected form of the 0x8005 polynomial.
const POLY_REFLECTED: u16 = 0xA001;

/// Continue a CRC-16 (0x8005, reflected, no final xor) over `data`.
///
/// Seeded with [`CRC16_INIT`] this is CRC-16/MODBUS. Passing a previous
/// result as `seed` continues the computation, so a checksum can be built up
/// over non-contiguous pieces.
pub fn crc16(seed: u16, data: &[u8]) -> u16 {
    let mut crc = seed;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}
