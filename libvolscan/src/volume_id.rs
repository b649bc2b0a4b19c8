use core::fmt;

/// 32-bit volume serial as used by FAT. Displays as `XXXX-XXXX`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VolumeId32([u8; 4]);

/// 64-bit volume identifier as used by HFS+. Displays as 16 hex digits.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VolumeId64([u8; 8]);

impl VolumeId32 {
    /// Bytes in on-disk (little-endian) order.
    pub fn new(value: [u8; 4]) -> Self {
        VolumeId32(value)
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 4]
    }
}

impl VolumeId64 {
    pub fn from_u64(value: u64) -> VolumeId64 {
        VolumeId64(value.to_le_bytes())
    }

    /// Two big-endian words as stored in the HFS+ Finder info.
    pub fn from_words(high: u32, low: u32) -> VolumeId64 {
        VolumeId64::from_u64((u64::from(high) << 32) | u64::from(low))
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 8]
    }
}

impl fmt::Display for VolumeId32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}-{:02X}{:02X}", self.0[3], self.0[2], self.0[1], self.0[0])
    }
}

impl fmt::Display for VolumeId64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", u64::from_le_bytes(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fat_serial_format() {
        assert_eq!(VolumeId32::new([0x78, 0x56, 0x34, 0x12]).to_string(), "1234-5678");
        assert_eq!(VolumeId32::new([0xef, 0xbe, 0xad, 0xde]).to_string(), "DEAD-BEEF");
        assert!(VolumeId32::new([0; 4]).is_nil());
    }

    #[test]
    fn hfs_serial_format() {
        let id = VolumeId64::from_words(0x0123_4567, 0x89AB_CDEF);
        assert_eq!(id.to_string(), "0123456789abcdef");
        assert!(!id.is_nil());
    }
}
