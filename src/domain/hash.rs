//! Region name hashing
//!
//! Region hashes are CRC32C (Castagnoli) over the name, zero-padded to a
//! whole number of 64-bit words, starting from zero with no final inversion.
//! This matches the value the platform library computes in hardware.

const POLYNOMIAL: u32 = 0x82F6_3B78;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLYNOMIAL } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Hash of a region name
pub fn crc32_str(key: &str) -> u32 {
    let bytes = key.as_bytes();
    let padding = bytes.len().div_ceil(8) * 8 - bytes.len();
    bytes
        .iter()
        .copied()
        .chain(std::iter::repeat_n(0, padding))
        .fold(0u32, |crc, byte| TABLE[((crc ^ u32::from(byte)) & 0xff) as usize] ^ (crc >> 8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::REGION_HASH_UNMARKED;

    #[test]
    fn test_known_hashes() {
        assert_eq!(crc32_str(""), 0);
        assert_eq!(crc32_str("MPI_Barrier"), 0x7b56_1f45);
        assert_eq!(crc32_str("12345678"), 0xecaf_3210);
    }

    #[test]
    fn test_unmarked_sentinel_is_hash_of_its_name() {
        assert_eq!(
            f64::from(crc32_str("GEOPM_REGION_HASH_UNMARKED")),
            REGION_HASH_UNMARKED
        );
    }

    #[test]
    fn test_short_keys_are_zero_padded() {
        // "a" hashes as the 8-byte word "a\0\0\0\0\0\0\0"
        assert_eq!(crc32_str("a"), 0x5e3c_d38c);
        assert_ne!(crc32_str("a"), crc32_str("b"));
    }
}
