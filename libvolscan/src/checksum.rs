use crc::{Algorithm, CRC_32_ISO_HDLC, Crc};

/// CRC32 as used by LVM2 labels: the reflected 0x04C11DB7 polynomial
/// seeded with 0xF597A6CF and no final xor. `crc` reflects `init` for
/// reflected algorithms, hence the bit reversal.
const LVM2_CRC32: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04C11DB7,
    init: 0xF597A6CFu32.reverse_bits(),
    refin: true,
    refout: true,
    xorout: 0x00000000,
    check: 0x4991CF02,
    residue: 0x00000000,
};

/// EFI CRC32 (the ISO-HDLC variant), used by GPT headers.
pub fn efi_crc32(bytes: &[u8]) -> u32 {
    let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC);
    let mut digest = crc.digest();
    digest.update(bytes);

    return digest.finalize();
}

pub fn lvm2_crc32(bytes: &[u8]) -> u32 {
    let crc = Crc::<u32>::new(&LVM2_CRC32);
    let mut digest = crc.digest();
    digest.update(bytes);

    return digest.finalize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efi_check_value() {
        assert_eq!(efi_crc32(b"123456789"), 0xCBF43926);
        assert_ne!(efi_crc32(b"123456788"), 0xCBF43926);
    }

    #[test]
    fn lvm2_check_value() {
        assert_eq!(lvm2_crc32(b"123456789"), 0x4991CF02);
    }

    #[test]
    fn lvm2_empty_is_seed() {
        assert_eq!(lvm2_crc32(&[]), 0xF597A6CF);
    }
}
