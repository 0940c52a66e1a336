/// CRC-32 with the reflected IEEE polynomial (0xEDB88320), as used by
/// zlib/gzip/PNG. Byte-at-a-time; share-token bodies are tiny.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

/// Fixed-width lowercase hex rendering used inside share tokens.
pub fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_vectors() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(
            crc32(b"The quick brown fox jumps over the lazy dog"),
            0x414F_A339
        );
    }

    #[test]
    fn test_crc32_hex_is_zero_padded() {
        assert_eq!(crc32_hex(b""), "00000000");
        assert_eq!(crc32_hex(b"123456789"), "cbf43926");
    }

    #[test]
    fn test_single_bit_flip_changes_crc() {
        let a = b"{\"v\":\"1\",\"count\":10}".to_vec();
        let mut b = a.clone();
        b[5] ^= 0x01;
        assert_ne!(crc32(&a), crc32(&b));
    }
}
