use bitflags::bitflags;
use uuid::Uuid;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, Unaligned,
    byteorder::{U16, U32},
};

use crate::{
    ProbeError,
    filesystems::{VolumeProbe, set_used_size},
    source::LogicalSource,
    util::{decode_utf8_lossy_from, format_unix_time},
    volume::Volume,
};

/*
https://www.kernel.org/doc/html/latest/filesystems/ext4/globals.html
*/

pub const EXT_SB_MAGIC: u16 = 0xEF53;
const EXT_SB_BLOCK_SIZE: u64 = 1024;
/// Largest supported `s_log_block_size`, i.e. 64 KiB blocks.
const EXT_MAX_LOG_BLOCK_SIZE: u32 = 6;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct Ext2SuperBlock {
    pub s_inodes_count: U32<LittleEndian>,
    pub s_blocks_count: U32<LittleEndian>,
    pub s_r_blocks_count: U32<LittleEndian>,
    pub s_free_blocks_count: U32<LittleEndian>,
    pub s_free_inodes_count: U32<LittleEndian>,
    pub s_first_data_block: U32<LittleEndian>,
    pub s_log_block_size: U32<LittleEndian>,
    pub s_log_cluster_size: U32<LittleEndian>,
    pub s_blocks_per_group: U32<LittleEndian>,
    pub s_clusters_per_group: U32<LittleEndian>,
    pub s_inodes_per_group: U32<LittleEndian>,
    pub s_mtime: U32<LittleEndian>,
    pub s_wtime: U32<LittleEndian>,
    pub s_mnt_count: U16<LittleEndian>,
    pub s_max_mnt_count: U16<LittleEndian>,
    pub s_magic: U16<LittleEndian>,
    pub s_state: U16<LittleEndian>,
    pub s_errors: U16<LittleEndian>,
    pub s_minor_rev_level: U16<LittleEndian>,
    pub s_lastcheck: U32<LittleEndian>,
    pub s_checkinterval: U32<LittleEndian>,
    pub s_creator_os: U32<LittleEndian>,
    pub s_rev_level: U32<LittleEndian>,
    pub s_def_resuid: U16<LittleEndian>,
    pub s_def_resgid: U16<LittleEndian>,
    pub s_first_ino: U32<LittleEndian>,
    pub s_inode_size: U16<LittleEndian>,
    pub s_block_group_nr: U16<LittleEndian>,
    pub s_feature_compat: U32<LittleEndian>,
    pub s_feature_incompat: U32<LittleEndian>,
    pub s_feature_ro_compat: U32<LittleEndian>,
    pub s_uuid: [u8; 16],
    pub s_volume_name: [u8; 16],
    pub s_last_mounted: [u8; 64],
    pub s_algorithm_usage_bitmap: U32<LittleEndian>,
    pub s_prealloc_blocks: u8,
    pub s_prealloc_dir_blocks: u8,
    pub s_reserved_gdt_blocks: U16<LittleEndian>,
    pub s_journal_uuid: [u8; 16],
    pub s_journal_inum: U32<LittleEndian>,
    pub s_journal_dev: U32<LittleEndian>,
    pub s_last_orphan: U32<LittleEndian>,
    pub s_hash_seed: [U32<LittleEndian>; 4],
    pub s_def_hash_version: u8,
    pub s_jnl_backup_type: u8,
    pub s_desc_size: U16<LittleEndian>,
    pub s_default_mount_opts: U32<LittleEndian>,
    pub s_first_meta_bg: U32<LittleEndian>,
    pub s_mkfs_time: U32<LittleEndian>,
    pub s_jnl_blocks: [U32<LittleEndian>; 17],
    pub s_blocks_count_hi: U32<LittleEndian>,
    pub s_r_blocks_count_hi: U32<LittleEndian>,
    pub s_free_blocks_hi: U32<LittleEndian>,
}

bitflags! {
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
    pub struct ExtFeatureCompat: u32 {
        const EXT3_FEATURE_COMPAT_HAS_JOURNAL = 0x0004;
        const EXT2_FEATURE_COMPAT_EXT_ATTR = 0x0008;
    }

    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
    pub struct ExtFeatureIncompat: u32 {
        const EXT3_FEATURE_INCOMPAT_RECOVER = 0x0004;
        const EXT3_FEATURE_INCOMPAT_JOURNAL_DEV = 0x0008;
        const EXT4_FEATURE_INCOMPAT_EXTENTS = 0x0040;
        const EXT4_FEATURE_INCOMPAT_64BIT = 0x0080;
        const EXT4_FEATURE_INCOMPAT_FLEX_BG = 0x0200;
    }

    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
    pub struct ExtFeatureRoCompat: u32 {
        const EXT2_FEATURE_RO_COMPAT_LARGE_FILE = 0x0002;
        const EXT4_FEATURE_RO_COMPAT_HUGE_FILE = 0x0008;
        const EXT4_FEATURE_RO_COMPAT_GDT_CSUM = 0x0010;
    }
}

const EXT_STATE_CLEAN: u16 = 0x0001;

fn creator_os(code: u32) -> Option<&'static str> {
    return match code {
        0 => Some("Linux"),
        1 => Some("GNU Hurd"),
        2 => Some("MASIX"),
        3 => Some("FreeBSD"),
        4 => Some("Lites"),
        _ => None,
    };
}

pub(crate) struct ExtProbe;

impl VolumeProbe for ExtProbe {
    fn name(&self) -> &'static str {
        "ext"
    }

    fn probe(&self, source: LogicalSource<'_>, volume: &mut Volume) -> Result<(), ProbeError> {
        return probe_ext(source, volume);
    }
}

pub fn probe_ext(source: LogicalSource<'_>, volume: &mut Volume) -> Result<(), ProbeError> {
    let sb: Ext2SuperBlock = source.with_block_size(EXT_SB_BLOCK_SIZE).map_from_block(1)?;

    if sb.s_magic.get() != EXT_SB_MAGIC {
        return Err(ProbeError::BadMagic("missing ext superblock magic"));
    }

    let log_block_size = sb.s_log_block_size.get();
    if log_block_size > EXT_MAX_LOG_BLOCK_SIZE {
        return Err(ProbeError::Inconsistent("ext block size is out of range"));
    }

    let compat = ExtFeatureCompat::from_bits_truncate(sb.s_feature_compat.get());
    let incompat = ExtFeatureIncompat::from_bits_truncate(sb.s_feature_incompat.get());
    let ro_compat = ExtFeatureRoCompat::from_bits_truncate(sb.s_feature_ro_compat.get());

    if incompat.contains(ExtFeatureIncompat::EXT3_FEATURE_INCOMPAT_JOURNAL_DEV) {
        return Err(ProbeError::BadMagic("external ext journal device"));
    }

    let block_size = EXT_SB_BLOCK_SIZE << log_block_size;

    let mut blocks = u64::from(sb.s_blocks_count.get());
    if incompat.contains(ExtFeatureIncompat::EXT4_FEATURE_INCOMPAT_64BIT) {
        blocks |= u64::from(sb.s_blocks_count_hi.get()) << 32;
    }

    let size = blocks
        .checked_mul(block_size)
        .ok_or(ProbeError::Inconsistent("ext size overflows"))?;

    let journaled = compat.contains(ExtFeatureCompat::EXT3_FEATURE_COMPAT_HAS_JOURNAL);
    let ext4 = incompat.intersects(
        ExtFeatureIncompat::EXT4_FEATURE_INCOMPAT_EXTENTS
            | ExtFeatureIncompat::EXT4_FEATURE_INCOMPAT_64BIT
            | ExtFeatureIncompat::EXT4_FEATURE_INCOMPAT_FLEX_BG,
    );

    let (description, filesystem) = if ext4 {
        ("EXT4 volume", "ext4")
    } else if journaled {
        ("EXT3 volume", "ext3")
    } else {
        ("EXT2 volume", "ext2")
    };

    volume.description = Some(description.to_string());
    volume.set_attribute("filesystem", filesystem);
    volume.vendor = creator_os(sb.s_creator_os.get()).map(str::to_string);
    volume.version = Some(format!(
        "{}.{}",
        sb.s_rev_level.get(),
        sb.s_minor_rev_level.get()
    ));

    let uuid = Uuid::from_bytes(sb.s_uuid);
    if !uuid.is_nil() {
        volume.serial = Some(uuid.to_string());
    }

    volume.set_attribute("label", decode_utf8_lossy_from(&sb.s_volume_name));
    volume.set_attribute("lastmountpoint", decode_utf8_lossy_from(&sb.s_last_mounted));

    for (key, time) in [
        ("mounted", sb.s_mtime.get()),
        ("modified", sb.s_wtime.get()),
        ("created", sb.s_mkfs_time.get()),
    ] {
        if let Some(time) = format_unix_time(i64::from(time)) {
            volume.set_attribute(key, time);
        }
    }

    let state = if sb.s_state.get() & EXT_STATE_CLEAN != 0 {
        "clean"
    } else {
        "unclean"
    };
    volume.set_attribute("state", state);

    if journaled {
        volume.add_capability("journaled", None);
    }
    if compat.contains(ExtFeatureCompat::EXT2_FEATURE_COMPAT_EXT_ATTR) {
        volume.add_capability("extended_attributes", Some("Extended Attributes"));
    }
    if ro_compat.contains(ExtFeatureRoCompat::EXT2_FEATURE_RO_COMPAT_LARGE_FILE) {
        volume.add_capability("large_files", Some("4GB+ files"));
    }
    if ro_compat.contains(ExtFeatureRoCompat::EXT4_FEATURE_RO_COMPAT_HUGE_FILE) {
        volume.add_capability("huge_files", Some("16TB+ files"));
    }
    if ro_compat.contains(ExtFeatureRoCompat::EXT4_FEATURE_RO_COMPAT_GDT_CSUM) {
        volume.add_capability("initialized", Some("initialized volume"));
    }
    if incompat.contains(ExtFeatureIncompat::EXT3_FEATURE_INCOMPAT_RECOVER) {
        volume.add_capability("recover", Some("needs recovery"));
    }
    if incompat.contains(ExtFeatureIncompat::EXT4_FEATURE_INCOMPAT_EXTENTS) {
        volume.add_capability("extents", Some("extent-based allocation"));
    }

    set_used_size(volume, size);

    return Ok(());
}
