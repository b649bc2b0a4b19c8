use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, Unaligned,
    byteorder::{U32, U64},
};

use crate::{
    ProbeError,
    checksum::lvm2_crc32,
    filesystems::set_used_size,
    source::LogicalSource,
    util::{decode_utf8_lossy_from, format_lvm_uuid},
    volume::Volume,
};

/*
Info from https://github.com/lvmteam/lvm2/blob/main/lib/format_text/layout.h
*/

pub const LVM2_LABEL_ID: [u8; 8] = *b"LABELONE";
const LVM2_SECTOR_SIZE: u64 = 512;
/// The label may live in any of the first four sectors.
const LVM2_LABEL_SCAN_SECTORS: u64 = 4;
/// The CRC covers the label from `offset_xl` to the end of the sector.
const LVM2_CRC_START: usize = 20;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct Lvm2LabelHeader {
    pub id: [u8; 8],
    pub sector_xl: U64<LittleEndian>,
    pub crc_xl: U32<LittleEndian>,
    pub offset_xl: U32<LittleEndian>,
    pub label_type: [u8; 8],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct Lvm2PvHeader {
    pub pv_uuid: [u8; 32],
    pub device_size_xl: U64<LittleEndian>,
}

/// Look for an LVM2 physical volume label and describe `volume` from it.
pub fn probe_lvm2(source: LogicalSource<'_>, volume: &mut Volume) -> Result<(), ProbeError> {
    let sectors = source.with_block_size(LVM2_SECTOR_SIZE);

    let mut result = Err(ProbeError::BadMagic("no LVM2 label"));

    for sector in 0..LVM2_LABEL_SCAN_SECTORS {
        let raw = match sectors.read_block(sector) {
            Ok(raw) => raw,
            Err(e) => {
                result = Err(e);
                break;
            }
        };

        match read_lvm2_label(&raw, sector) {
            Ok((label, pv)) => {
                describe_pv(volume, &label, &pv);
                return Ok(());
            }
            Err(ProbeError::BadMagic(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    return result;
}

fn read_lvm2_label(raw: &[u8], sector: u64) -> Result<(Lvm2LabelHeader, Lvm2PvHeader), ProbeError> {
    let short = ProbeError::ShortRead {
        offset: sector * LVM2_SECTOR_SIZE,
        length: LVM2_SECTOR_SIZE,
    };

    let (label, _) = Lvm2LabelHeader::read_from_prefix(raw).map_err(|_| short.clone())?;

    if label.id != LVM2_LABEL_ID {
        return Err(ProbeError::BadMagic("missing LABELONE"));
    }

    if label.sector_xl.get() != sector {
        return Err(ProbeError::BadMagic("LVM2 label records a different sector"));
    }

    let offset = label.offset_xl.get() as usize;
    if offset < size_of::<Lvm2LabelHeader>()
        || offset + size_of::<Lvm2PvHeader>() > LVM2_SECTOR_SIZE as usize
    {
        return Err(ProbeError::Inconsistent("LVM2 PV header does not fit the label sector"));
    }

    let body = raw.get(LVM2_CRC_START..).ok_or(short.clone())?;
    let got = lvm2_crc32(body);
    let expected = label.crc_xl.get();
    if got != expected {
        return Err(ProbeError::ChecksumFailed { expected, got });
    }

    let (pv, _) = Lvm2PvHeader::read_from_prefix(&raw[offset..]).map_err(|_| short)?;

    return Ok((label, pv));
}

fn describe_pv(volume: &mut Volume, label: &Lvm2LabelHeader, pv: &Lvm2PvHeader) {
    volume.description = Some("Linux LVM Physical Volume".to_string());
    volume.vendor = Some("Linux".to_string());
    volume.add_capability("lvm2", None);
    volume.set_attribute("type", decode_utf8_lossy_from(&label.label_type));

    let uuid = format_lvm_uuid(&pv.pv_uuid);
    if !uuid.is_empty() {
        volume.serial = Some(uuid);
    }

    let size = pv.device_size_xl.get() & !(LVM2_SECTOR_SIZE - 1);
    set_used_size(volume, size);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::volume::VolumeKind;

    pub(crate) const PV_UUID: &[u8; 32] = b"abcdefGHIJKLmnopQRSTuvwxYZ012345";

    /// Write a sealed LVM2 label into `sector` of `img`.
    pub(crate) fn write_lvm2_label(img: &mut [u8], sector: u64, device_size: u64) {
        let base = (sector * LVM2_SECTOR_SIZE) as usize;
        let raw = &mut img[base..base + 512];

        raw[0..8].copy_from_slice(&LVM2_LABEL_ID);
        raw[8..16].copy_from_slice(&sector.to_le_bytes());
        raw[20..24].copy_from_slice(&32u32.to_le_bytes());
        raw[24..32].copy_from_slice(b"LVM2 001");
        raw[32..64].copy_from_slice(PV_UUID);
        raw[64..72].copy_from_slice(&device_size.to_le_bytes());

        let crc = lvm2_crc32(&raw[20..]);
        raw[16..20].copy_from_slice(&crc.to_le_bytes());
    }

    fn probe(img: &Vec<u8>, capacity: u64) -> Result<Volume, ProbeError> {
        let mut v = Volume::new(VolumeKind::Volume);
        v.capacity = capacity;
        probe_lvm2(LogicalSource::new(img, Some(img.len() as u64)), &mut v)?;
        return Ok(v);
    }

    #[test]
    fn label_in_second_sector() {
        let mut img = vec![0u8; 8192];
        write_lvm2_label(&mut img, 1, 8000);

        let v = probe(&img, 8192).unwrap();

        assert_eq!(v.description.as_deref(), Some("Linux LVM Physical Volume"));
        assert_eq!(v.serial.as_deref(), Some("abcdef-GHIJ-KLmn-opQR-STuv-wxYZ-012345"));
        assert_eq!(v.attribute("type"), Some("LVM2 001"));
        assert!(v.is_capable("lvm2"));
        assert_eq!(v.size, 7680);
    }

    #[test]
    fn oversized_device_is_ignored() {
        let mut img = vec![0u8; 8192];
        write_lvm2_label(&mut img, 0, 1 << 40);

        let v = probe(&img, 8192).unwrap();
        assert_eq!(v.size, 0);
        assert_eq!(v.capacity, 8192);
    }

    #[test]
    fn corrupt_crc() {
        let mut img = vec![0u8; 8192];
        write_lvm2_label(&mut img, 2, 8192);
        img[2 * 512 + 100] ^= 0xff;

        assert!(matches!(
            probe(&img, 8192),
            Err(ProbeError::ChecksumFailed { .. })
        ));
    }

    #[test]
    fn wrong_sector_number() {
        let mut img = vec![0u8; 8192];
        write_lvm2_label(&mut img, 1, 8192);
        img.copy_within(512..1024, 1536);
        img[512..1024].fill(0);

        assert!(matches!(probe(&img, 8192), Err(ProbeError::BadMagic(_))));
    }

    #[test]
    fn pv_header_past_sector() {
        let mut img = vec![0u8; 8192];
        write_lvm2_label(&mut img, 0, 8192);
        img[20..24].copy_from_slice(&500u32.to_le_bytes());

        assert!(matches!(probe(&img, 8192), Err(ProbeError::Inconsistent(_))));
    }
}
