//! MPEG-2 CRC-32 as used by `splice_info_section`.
//!
//! Polynomial 0x04C11DB7, initial value 0xFFFFFFFF, MSB first, no final XOR.

const POLY: u32 = 0x04C1_1DB7;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut reg = (n as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            reg = if reg & 0x8000_0000 != 0 {
                (reg << 1) ^ POLY
            } else {
                reg << 1
            };
            bit += 1;
        }
        table[n] = reg;
        n += 1;
    }
    table
}

pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    data.iter().fold(0xFFFF_FFFF, |reg, &b| {
        (reg << 8) ^ TABLE[((reg >> 24) as u8 ^ b) as usize]
    })
}
