use bitflags::bitflags;
use zerocopy::{
    BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{U16, U32, U64},
};

use crate::{
    ProbeError,
    filesystems::{VolumeProbe, set_used_size},
    source::LogicalSource,
    util::{decode_utf8_lossy_from, format_unix_time, is_power_2},
    volume::Volume,
    volume_id::VolumeId64,
};

/*
Info from https://developer.apple.com/library/archive/technotes/tn/tn1150.html
*/

pub const HFSPLUS_MAGIC: [u8; 2] = *b"H+";
pub const HFSX_MAGIC: [u8; 2] = *b"HX";
const HFSX_VERSION: u16 = 5;

/// Seconds between 1904-01-01 and 1970-01-01.
const HFS_EPOCH_OFFSET: i64 = 2_082_844_800;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct HfsPlusVolumeHeader {
    pub signature: [u8; 2],
    pub version: U16<BigEndian>,
    pub attributes: U32<BigEndian>,
    pub last_mounted_version: [u8; 4],
    pub journal_info_block: U32<BigEndian>,
    pub create_date: U32<BigEndian>,
    pub modify_date: U32<BigEndian>,
    pub backup_date: U32<BigEndian>,
    pub checked_date: U32<BigEndian>,
    pub file_count: U32<BigEndian>,
    pub folder_count: U32<BigEndian>,
    pub block_size: U32<BigEndian>,
    pub total_blocks: U32<BigEndian>,
    pub free_blocks: U32<BigEndian>,
    pub next_allocation: U32<BigEndian>,
    pub rsrc_clump_size: U32<BigEndian>,
    pub data_clump_size: U32<BigEndian>,
    pub next_catalog_id: U32<BigEndian>,
    pub write_count: U32<BigEndian>,
    pub encodings_bitmap: U64<BigEndian>,
    pub finder_info: [U32<BigEndian>; 8],
}

bitflags! {
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
    pub struct HfsVolumeAttributes: u32 {
        const VOLUME_UNMOUNTED = 1 << 8;
        const BOOT_VOLUME_INCONSISTENT = 1 << 11;
        const VOLUME_JOURNALED = 1 << 13;
        const VOLUME_SOFTWARE_LOCK = 1 << 15;
    }
}

fn last_mounted_by(signature: &[u8; 4]) -> Option<&'static str> {
    return match signature {
        b"10.0" => Some("Mac OS X"),
        b"8.10" => Some("Mac OS 8.1"),
        b"HFSJ" => Some("Mac OS X (journaled)"),
        b"fsck" => Some("Mac OS X fsck"),
        b"H+Lx" => Some("Linux"),
        _ => None,
    };
}

fn hfs_time(secs: u32) -> Option<String> {
    if secs == 0 {
        return None;
    }
    return format_unix_time(i64::from(secs) - HFS_EPOCH_OFFSET);
}

pub(crate) struct HfsPlusProbe;

impl VolumeProbe for HfsPlusProbe {
    fn name(&self) -> &'static str {
        "hfsplus"
    }

    fn probe(&self, source: LogicalSource<'_>, volume: &mut Volume) -> Result<(), ProbeError> {
        return probe_hfsplus(source, volume);
    }
}

pub fn probe_hfsplus(source: LogicalSource<'_>, volume: &mut Volume) -> Result<(), ProbeError> {
    let header: HfsPlusVolumeHeader = source.with_block_size(1024).map_from_block(1)?;

    if header.signature != HFSPLUS_MAGIC && header.signature != HFSX_MAGIC {
        return Err(ProbeError::BadMagic("missing HFS+ signature"));
    }

    let block_size = u64::from(header.block_size.get());
    if !is_power_2(block_size) {
        return Err(ProbeError::Inconsistent("HFS+ block size is not a power of two"));
    }

    let version = header.version.get();
    let hfsx = version >= HFSX_VERSION;

    if hfsx {
        volume.description = Some("Apple HFSX volume".to_string());
        volume.set_attribute("filesystem", "hfsx");
        volume.add_capability("hfsx", None);
    } else {
        volume.description = Some("Apple HFS+ volume".to_string());
        volume.set_attribute("filesystem", "hfsplus");
    }
    volume.version = Some(version.to_string());

    let raw_mounted = header.last_mounted_version;
    match last_mounted_by(&raw_mounted) {
        Some(name) => {
            volume.vendor = Some(name.to_string());
            volume.set_attribute("lastmountedby", name);
        }
        None => {
            log::debug!("probe_hfsplus: unknown last mounted version {raw_mounted:x?}");
            volume.set_attribute("lastmountedby", decode_utf8_lossy_from(&raw_mounted));
        }
    }

    let attributes = HfsVolumeAttributes::from_bits_truncate(header.attributes.get());

    if attributes.contains(HfsVolumeAttributes::VOLUME_JOURNALED) {
        volume.add_capability("journaled", None);
    }
    if attributes.contains(HfsVolumeAttributes::VOLUME_SOFTWARE_LOCK) {
        volume.add_capability("ro", Some("read-only"));
    }
    if attributes.contains(HfsVolumeAttributes::BOOT_VOLUME_INCONSISTENT) {
        volume.add_capability("recover", Some("needs recovery"));
    }

    let state = if attributes.contains(HfsVolumeAttributes::VOLUME_UNMOUNTED) {
        "clean"
    } else {
        "unclean"
    };
    volume.set_attribute("state", state);

    for (key, time) in [
        ("created", header.create_date.get()),
        ("modified", header.modify_date.get()),
        ("checked", header.checked_date.get()),
    ] {
        if let Some(time) = hfs_time(time) {
            volume.set_attribute(key, time);
        }
    }

    let finder = header.finder_info.map(|word| word.get());

    if finder[0] != 0 {
        volume.add_capability("bootable", Some("Bootable volume"));
    }
    if finder[3] != 0 {
        volume.add_capability("macos", Some("Contains a bootable Mac OS installation"));
    }
    if finder[5] != 0 {
        volume.add_capability("osx", Some("Contains a bootable Mac OS X installation"));
    }

    let id = VolumeId64::from_words(finder[6], finder[7]);
    if !id.is_nil() {
        volume.serial = Some(id.to_string());
    }

    let size = block_size * u64::from(header.total_blocks.get());
    set_used_size(volume, size);

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::VolumeKind;

    fn hfs_image(magic: &[u8; 2], version: u16, attributes: u32) -> Vec<u8> {
        let mut img = vec![0u8; 64 * 1024];
        let h = &mut img[1024..2048];
        h[0..2].copy_from_slice(magic);
        h[2..4].copy_from_slice(&version.to_be_bytes());
        h[4..8].copy_from_slice(&attributes.to_be_bytes());
        h[8..12].copy_from_slice(b"H+Lx");
        h[16..20].copy_from_slice(&(HFS_EPOCH_OFFSET as u32 + 1_000_000_000).to_be_bytes());
        h[40..44].copy_from_slice(&4096u32.to_be_bytes());
        h[44..48].copy_from_slice(&16u32.to_be_bytes());
        // finder info words 0, 6 and 7
        h[80..84].copy_from_slice(&2u32.to_be_bytes());
        h[104..108].copy_from_slice(&0x0123_4567u32.to_be_bytes());
        h[108..112].copy_from_slice(&0x89ab_cdefu32.to_be_bytes());
        return img;
    }

    fn probe(img: &Vec<u8>) -> Result<Volume, ProbeError> {
        let mut v = Volume::new(VolumeKind::Volume);
        probe_hfsplus(LogicalSource::new(img, Some(img.len() as u64)), &mut v)?;
        return Ok(v);
    }

    #[test]
    fn hfsplus_volume() {
        let v = probe(&hfs_image(&HFSPLUS_MAGIC, 4, (1 << 8) | (1 << 13))).unwrap();

        assert_eq!(v.description.as_deref(), Some("Apple HFS+ volume"));
        assert_eq!(v.vendor.as_deref(), Some("Linux"));
        assert_eq!(v.attribute("state"), Some("clean"));
        assert_eq!(v.attribute("created"), Some("2001-09-09 01:46:40"));
        assert_eq!(v.serial.as_deref(), Some("0123456789abcdef"));
        assert!(v.is_capable("journaled"));
        assert!(v.is_capable("bootable"));
        assert!(!v.is_capable("hfsx"));
        assert!(!v.is_capable("osx"));
        assert_eq!(v.size, 16 * 4096);
    }

    #[test]
    fn hfsx_locked_volume() {
        let v = probe(&hfs_image(&HFSX_MAGIC, 5, 1 << 15)).unwrap();

        assert!(v.is_capable("hfsx"));
        assert!(v.is_capable("ro"));
        assert_eq!(v.attribute("state"), Some("unclean"));
        assert_eq!(v.attribute("filesystem"), Some("hfsx"));
    }

    #[test]
    fn zero_block_size() {
        let mut img = hfs_image(&HFSPLUS_MAGIC, 4, 0);
        img[1024 + 40..1024 + 44].copy_from_slice(&0u32.to_be_bytes());
        assert!(matches!(probe(&img), Err(ProbeError::Inconsistent(_))));
    }

    #[test]
    fn plain_hfs_is_not_hfsplus() {
        let mut img = vec![0u8; 4096];
        img[1024..1026].copy_from_slice(b"BD");
        assert!(matches!(probe(&img), Err(ProbeError::BadMagic(_))));
    }

    #[test]
    fn bootable_system_folders() {
        let mut img = hfs_image(&HFSPLUS_MAGIC, 4, 1 << 8);
        img[1024 + 92..1024 + 96].copy_from_slice(&17u32.to_be_bytes());
        img[1024 + 100..1024 + 104].copy_from_slice(&23u32.to_be_bytes());

        let v = probe(&img).unwrap();

        assert!(v.is_capable("macos"));
        assert!(v.is_capable("osx"));
        assert_eq!(
            v.capability("osx").unwrap().description.as_deref(),
            Some("Contains a bootable Mac OS X installation")
        );
    }
}
