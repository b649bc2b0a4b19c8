use bitflags::bitflags;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, Unaligned,
    byteorder::{U16, U32},
};

use crate::{
    ProbeError,
    filesystems::{VolumeProbe, set_used_size},
    source::LogicalSource,
    util::{decode_utf8_lossy_from, is_power_2},
    volume::Volume,
    volume_id::VolumeId32,
};

/*
Info from https://en.wikipedia.org/wiki/Design_of_the_FAT_file_system
*/

pub const FAT_BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Common DOS 3.31 BIOS parameter block, 36 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct FatBpb {
    pub ms_ignored: [u8; 3],
    pub ms_sysid: [u8; 8],
    pub ms_sector_size: U16<LittleEndian>,
    pub ms_cluster_size: u8,
    pub ms_reserved: U16<LittleEndian>,
    pub ms_fats: u8,
    pub ms_dir_entries: U16<LittleEndian>,
    pub ms_sectors: U16<LittleEndian>,
    pub ms_media: u8,
    pub ms_fat_length: U16<LittleEndian>,
    pub ms_secs_track: U16<LittleEndian>,
    pub ms_heads: U16<LittleEndian>,
    pub ms_hidden: U32<LittleEndian>,
    pub ms_total_sect: U32<LittleEndian>,
}

/// FAT12/16 extended BPB following [`FatBpb`].
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct MsDosExtBpb {
    pub ms_drive_number: u8,
    pub ms_boot_flags: u8,
    pub ms_ext_boot_sign: u8,
    pub ms_serno: [u8; 4],
    pub ms_label: [u8; 11],
    pub ms_magic: [u8; 8],
}

/// FAT32 extended BPB following [`FatBpb`].
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct VFatExtBpb {
    pub vs_fat32_length: U32<LittleEndian>,
    pub vs_flags: U16<LittleEndian>,
    pub vs_version: U16<LittleEndian>,
    pub vs_root_cluster: U32<LittleEndian>,
    pub vs_fsinfo_sector: U16<LittleEndian>,
    pub vs_backup_boot: U16<LittleEndian>,
    pub vs_reserved2: [u8; 12],
    pub vs_drive_number: u8,
    pub vs_boot_flags: u8,
    pub vs_ext_boot_sign: u8,
    pub vs_serno: [u8; 4],
    pub vs_label: [u8; 11],
    pub vs_magic: [u8; 8],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
struct VfatDirEntry {
    name: [u8; 11],
    attr: u8,
    reserved: u8,
    time_creat_ms: u8,
    time_creat: U16<LittleEndian>,
    date_creat: U16<LittleEndian>,
    date_acc: U16<LittleEndian>,
    cluster_high: U16<LittleEndian>,
    time_write: U16<LittleEndian>,
    date_write: U16<LittleEndian>,
    cluster_low: U16<LittleEndian>,
    size: U32<LittleEndian>,
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct FatAttr: u8 {
        const FAT_ATTR_VOLUME_ID = 0x08;
        const FAT_ATTR_DIR = 0x10;
        const FAT_ATTR_LONG_NAME = 0x0f;
        const FAT_ATTR_MASK = 0x3f;
    }
}

const FAT_ENTRY_FREE: u8 = 0xe5;
const FAT_DIR_ENTRY_SIZE: usize = 32;

/// Highest cluster count a FAT12 volume can carry.
const FAT12_MAX: u64 = 0xFF4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatVersion {
    Fat12,
    Fat16,
    Fat32,
}

impl FatVersion {
    fn as_str(self) -> &'static str {
        match self {
            FatVersion::Fat12 => "FAT12",
            FatVersion::Fat16 => "FAT16",
            FatVersion::Fat32 => "FAT32",
        }
    }
}

/// Parsed boot sector geometry, all sizes in sectors unless stated.
#[derive(Debug, Clone, Copy)]
struct FatGeometry {
    sector_size: u64,
    cluster_size: u64,
    reserved: u64,
    fat_size: u64,
    root_entries: u64,
    sectors: u64,
}

impl FatGeometry {
    fn from_bpb(bpb: &FatBpb, fat32_length: u32) -> Result<Self, ProbeError> {
        if bpb.ms_fats == 0 {
            return Err(ProbeError::Inconsistent("FAT volume has no FAT table"));
        }
        if bpb.ms_reserved.get() == 0 {
            return Err(ProbeError::Inconsistent("FAT reserved sector count is 0"));
        }

        let sector_size = u64::from(bpb.ms_sector_size.get());
        if !is_power_2(sector_size) || !(512..=4096).contains(&sector_size) {
            return Err(ProbeError::Inconsistent("FAT sector size is invalid"));
        }

        let cluster_size = u64::from(bpb.ms_cluster_size);
        if !is_power_2(cluster_size) {
            return Err(ProbeError::Inconsistent("FAT cluster size is not a power of two"));
        }

        let fat_length = match bpb.ms_fat_length.get() {
            0 => u64::from(fat32_length),
            len => u64::from(len),
        };

        let sectors = match bpb.ms_sectors.get() {
            0 => u64::from(bpb.ms_total_sect.get()),
            count => u64::from(count),
        };

        return Ok(Self {
            sector_size,
            cluster_size,
            reserved: u64::from(bpb.ms_reserved.get()),
            fat_size: fat_length * u64::from(bpb.ms_fats),
            root_entries: u64::from(bpb.ms_dir_entries.get()),
            sectors,
        });
    }

    fn root_dir_sectors(&self) -> u64 {
        return (self.root_entries * FAT_DIR_ENTRY_SIZE as u64).div_ceil(self.sector_size);
    }

    fn cluster_count(&self) -> Result<u64, ProbeError> {
        let data = self
            .sectors
            .checked_sub(self.reserved + self.fat_size + self.root_dir_sectors())
            .ok_or(ProbeError::Inconsistent("FAT metadata exceeds the volume"))?;

        return Ok(data / self.cluster_size);
    }
}

pub(crate) struct VfatProbe;

impl VolumeProbe for VfatProbe {
    fn name(&self) -> &'static str {
        "vfat"
    }

    fn probe(&self, source: LogicalSource<'_>, volume: &mut Volume) -> Result<(), ProbeError> {
        return probe_vfat(source, volume);
    }
}

fn parse<T: FromBytes>(bytes: &[u8]) -> Result<T, ProbeError> {
    let (value, _) = T::read_from_prefix(bytes).map_err(|_| ProbeError::ShortRead {
        offset: 0,
        length: size_of::<T>() as u64,
    })?;
    return Ok(value);
}

pub fn probe_vfat(source: LogicalSource<'_>, volume: &mut Volume) -> Result<(), ProbeError> {
    let boot = source.with_block_size(512).read_block(0)?;

    if boot[0x1fe..0x200] != FAT_BOOT_SIGNATURE {
        return Err(ProbeError::BadMagic("missing FAT boot signature"));
    }

    let bpb: FatBpb = parse(&boot)?;
    let ms: MsDosExtBpb = parse(&boot[0x24..])?;
    let vs: VFatExtBpb = parse(&boot[0x24..])?;

    let fat32 = &vs.vs_magic == b"FAT32   ";
    if !fat32 && !ms.ms_magic.starts_with(b"FAT") {
        return Err(ProbeError::BadMagic("missing FAT filesystem type"));
    }

    let geometry = FatGeometry::from_bpb(&bpb, vs.vs_fat32_length.get())?;
    let clusters = geometry.cluster_count()?;

    let version = if fat32 {
        FatVersion::Fat32
    } else if clusters < FAT12_MAX {
        FatVersion::Fat12
    } else {
        FatVersion::Fat16
    };

    log::debug!(
        "probe_vfat: {} with {clusters} clusters of {} sectors",
        version.as_str(),
        geometry.cluster_size
    );

    let sectors = source.with_block_size(geometry.sector_size);

    let (dir_label, bpb_label, serial) = if fat32 {
        (
            fat32_root_label(sectors, &geometry, vs.vs_root_cluster.get()),
            vs.vs_label,
            vs.vs_serno,
        )
    } else {
        (fat16_root_label(sectors, &geometry), ms.ms_label, ms.ms_serno)
    };

    volume.description = Some("Windows FAT volume".to_string());
    volume.vendor = Some(decode_utf8_lossy_from(&bpb.ms_sysid)).filter(|oem| !oem.is_empty());
    volume.version = Some(version.as_str().to_string());
    volume.set_attribute("filesystem", "fat");
    volume.set_attribute("FATs", bpb.ms_fats.to_string());

    let serial = VolumeId32::new(serial);
    if !serial.is_nil() {
        volume.serial = Some(serial.to_string());
    }

    let label = match dir_label {
        Some(label) => label,
        None => decode_utf8_lossy_from(&bpb_label),
    };
    if label != "NO NAME" {
        volume.set_attribute("label", label);
    }

    set_used_size(volume, geometry.sectors * geometry.sector_size);

    return Ok(());
}

/// The FAT12/16 root directory is a fixed region right after the FATs.
fn fat16_root_label(sectors: LogicalSource<'_>, geometry: &FatGeometry) -> Option<String> {
    let start = geometry.reserved + geometry.fat_size;

    let region = match sectors.read_blocks(start, geometry.root_dir_sectors()) {
        Ok(region) => region,
        Err(e) => {
            log::debug!("fat16_root_label: root directory unreadable: {e}");
            return None;
        }
    };

    return search_fat_label(&region);
}

/// Only the first cluster of the FAT32 root directory is searched.
fn fat32_root_label(
    sectors: LogicalSource<'_>,
    geometry: &FatGeometry,
    root_cluster: u32,
) -> Option<String> {
    if root_cluster < 2 {
        return None;
    }

    let data_start = geometry.reserved + geometry.fat_size;
    let start = (u64::from(root_cluster) - 2)
        .checked_mul(geometry.cluster_size)?
        .checked_add(data_start)?;

    let region = match sectors.read_blocks(start, geometry.cluster_size) {
        Ok(region) => region,
        Err(e) => {
            log::debug!("fat32_root_label: root cluster {root_cluster} unreadable: {e}");
            return None;
        }
    };

    return search_fat_label(&region);
}

fn search_fat_label(region: &[u8]) -> Option<String> {
    for raw in region.chunks_exact(FAT_DIR_ENTRY_SIZE) {
        let entry: VfatDirEntry = parse(raw).ok()?;

        if entry.name[0] == 0x00 {
            break;
        }

        let attr = FatAttr::from_bits_retain(entry.attr);

        if entry.name[0] == FAT_ENTRY_FREE
            || entry.cluster_high.get() != 0
            || entry.cluster_low.get() != 0
            || attr.intersection(FatAttr::FAT_ATTR_MASK) == FatAttr::FAT_ATTR_LONG_NAME
        {
            continue;
        }

        if attr.contains(FatAttr::FAT_ATTR_VOLUME_ID) && !attr.contains(FatAttr::FAT_ATTR_DIR) {
            let mut label = entry.name;
            if label[0] == 0x05 {
                label[0] = FAT_ENTRY_FREE;
            }
            return Some(decode_utf8_lossy_from(&label));
        }
    }

    return None;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::volume::VolumeKind;

    /// A 2 MiB FAT16 image: 1 reserved sector, 2 FATs of 16 sectors and a
    /// 512 entry root directory.
    pub(crate) fn fat16_image(dir_label: Option<&str>, bpb_label: &str) -> Vec<u8> {
        let mut img = vec![0u8; 2 << 20];
        img[0..3].copy_from_slice(&[0xeb, 0x3c, 0x90]);
        img[3..11].copy_from_slice(b"mkfs.fat");
        img[11..13].copy_from_slice(&512u16.to_le_bytes());
        img[13] = 4;
        img[14..16].copy_from_slice(&1u16.to_le_bytes());
        img[16] = 2;
        img[17..19].copy_from_slice(&512u16.to_le_bytes());
        img[19..21].copy_from_slice(&4096u16.to_le_bytes());
        img[21] = 0xf8;
        img[22..24].copy_from_slice(&16u16.to_le_bytes());
        img[38] = 0x29;
        img[39..43].copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);
        let mut label = [b' '; 11];
        label[..bpb_label.len()].copy_from_slice(bpb_label.as_bytes());
        img[43..54].copy_from_slice(&label);
        img[54..62].copy_from_slice(b"FAT16   ");
        img[0x1fe..0x200].copy_from_slice(&FAT_BOOT_SIGNATURE);

        if let Some(dir_label) = dir_label {
            let root = (1 + 32) * 512;
            let mut name = [b' '; 11];
            name[..dir_label.len()].copy_from_slice(dir_label.as_bytes());
            img[root..root + 11].copy_from_slice(&name);
            img[root + 11] = FatAttr::FAT_ATTR_VOLUME_ID.bits();
        }

        return img;
    }

    fn probe(img: &Vec<u8>) -> Result<Volume, ProbeError> {
        let mut v = Volume::new(VolumeKind::Volume);
        probe_vfat(LogicalSource::new(img, Some(img.len() as u64)), &mut v)?;
        return Ok(v);
    }

    #[test]
    fn fat16_directory_label() {
        let v = probe(&fat16_image(Some("DATA"), "BOOTLABEL")).unwrap();

        assert_eq!(v.description.as_deref(), Some("Windows FAT volume"));
        assert_eq!(v.version.as_deref(), Some("FAT12"));
        assert_eq!(v.vendor.as_deref(), Some("mkfs.fat"));
        assert_eq!(v.serial.as_deref(), Some("1234-5678"));
        assert_eq!(v.attribute("label"), Some("DATA"));
        assert_eq!(v.attribute("FATs"), Some("2"));
        assert_eq!(v.attribute("filesystem"), Some("fat"));
        assert_eq!(v.size, 4096 * 512);
    }

    #[test]
    fn falls_back_to_bpb_label() {
        let v = probe(&fat16_image(None, "BOOTLABEL")).unwrap();
        assert_eq!(v.attribute("label"), Some("BOOTLABEL"));

        let v = probe(&fat16_image(None, "NO NAME")).unwrap();
        assert_eq!(v.attribute("label"), None);
    }

    #[test]
    fn fat32_root_cluster() {
        let mut img = vec![0u8; 4 << 20];
        img[3..11].copy_from_slice(b"MSWIN4.1");
        img[11..13].copy_from_slice(&512u16.to_le_bytes());
        img[13] = 1;
        img[14..16].copy_from_slice(&32u16.to_le_bytes());
        img[16] = 2;
        img[32..36].copy_from_slice(&8192u32.to_le_bytes());
        img[36..40].copy_from_slice(&64u32.to_le_bytes());
        img[44..48].copy_from_slice(&2u32.to_le_bytes());
        img[66] = 0x29;
        img[67..71].copy_from_slice(&[0xef, 0xbe, 0xad, 0xde]);
        img[71..82].copy_from_slice(b"NO NAME    ");
        img[82..90].copy_from_slice(b"FAT32   ");
        img[0x1fe..0x200].copy_from_slice(&FAT_BOOT_SIGNATURE);

        let root = (32 + 128) * 512;
        img[root..root + 11].copy_from_slice(b"ESP        ");
        img[root + 11] = FatAttr::FAT_ATTR_VOLUME_ID.bits();

        let v = probe(&img).unwrap();

        assert_eq!(v.version.as_deref(), Some("FAT32"));
        assert_eq!(v.serial.as_deref(), Some("DEAD-BEEF"));
        assert_eq!(v.attribute("label"), Some("ESP"));
    }

    #[test]
    fn zero_fats_rejected() {
        let mut img = fat16_image(None, "X");
        img[16] = 0;
        assert!(matches!(probe(&img), Err(ProbeError::Inconsistent(_))));
    }

    #[test]
    fn odd_sector_size_rejected() {
        let mut img = fat16_image(None, "X");
        img[11..13].copy_from_slice(&768u16.to_le_bytes());
        assert!(matches!(probe(&img), Err(ProbeError::Inconsistent(_))));
    }

    #[test]
    fn mbr_is_not_fat() {
        let mut img = vec![0u8; 4096];
        img[0x1fe..0x200].copy_from_slice(&FAT_BOOT_SIGNATURE);
        assert!(matches!(probe(&img), Err(ProbeError::BadMagic(_))));
    }
}
