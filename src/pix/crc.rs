//! CRC-16/CCITT-FALSE as used by the BR Code checksum field.
//!
//! Polynomial `0x1021`, initial register `0xFFFF`, no reflection, no final XOR.
//! The table-free byte-at-a-time form below swaps the register bytes, folds the
//! input byte into the low half and applies the feedback XORs directly.

const INITIAL: u16 = 0xFFFF;

/// Computes the checksum of `data`. Total over all inputs; the empty slice yields `0xFFFF`.
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(INITIAL, |crc, &byte| {
        let mut crc = crc.swap_bytes() ^ u16::from(byte);
        crc ^= (crc & 0x00FF) >> 4;
        crc ^= crc << 12;
        crc ^= (crc & 0x00FF) << 5;
        crc
    })
}

/// Renders a checksum the way the payload carries it: 4 uppercase hex digits.
pub fn to_hex(crc: u16) -> String {
    format!("{crc:04X}")
}
