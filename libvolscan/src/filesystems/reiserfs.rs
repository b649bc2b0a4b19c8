use uuid::Uuid;
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
};

/*
Info from https://github.com/torvalds/linux/blob/v5.15/fs/reiserfs/reiserfs.h
*/

/// The superblock sits 64 KiB into the volume.
const REISERFS_SB_BLOCK: u64 = 16;
const REISERFS_SB_BLOCK_SIZE: u64 = 4096;

const REISERFS_VALID_FS: u16 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct ReiserJournalParams {
    pub jp_journal_1st_block: U32<LittleEndian>,
    pub jp_journal_dev: U32<LittleEndian>,
    pub jp_journal_size: U32<LittleEndian>,
    pub jp_journal_trans_max: U32<LittleEndian>,
    pub jp_journal_magic: U32<LittleEndian>,
    pub jp_journal_max_batch: U32<LittleEndian>,
    pub jp_journal_max_commit_age: U32<LittleEndian>,
    pub jp_journal_max_trans_age: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct ReiserSuperBlock {
    pub s_block_count: U32<LittleEndian>,
    pub s_free_blocks: U32<LittleEndian>,
    pub s_root_block: U32<LittleEndian>,
    pub s_journal: ReiserJournalParams,
    pub s_blocksize: U16<LittleEndian>,
    pub s_oid_maxsize: U16<LittleEndian>,
    pub s_oid_cursize: U16<LittleEndian>,
    pub s_umount_state: U16<LittleEndian>,
    pub s_magic: [u8; 10],
    pub s_fs_state: U16<LittleEndian>,
    pub s_hash_function_code: U32<LittleEndian>,
    pub s_tree_height: U16<LittleEndian>,
    pub s_bmap_nr: U16<LittleEndian>,
    pub s_version: U16<LittleEndian>,
    pub s_reserved_for_journal: U16<LittleEndian>,
    pub s_inode_generation: U32<LittleEndian>,
    pub s_flags: U32<LittleEndian>,
    pub s_uuid: [u8; 16],
    pub s_label: [u8; 16],
}

fn reiser_version(magic: &[u8; 10]) -> Option<&'static str> {
    if magic.starts_with(b"ReIsErFs\0") {
        return Some("3.5");
    }
    if magic.starts_with(b"ReIsEr2Fs\0") {
        return Some("3.6");
    }
    if magic.starts_with(b"ReIsEr3Fs\0") {
        return Some("nonstandard journal");
    }
    return None;
}

fn hash_name(code: u32) -> Option<&'static str> {
    return match code {
        1 => Some("tea"),
        2 => Some("yura"),
        3 => Some("r5"),
        _ => None,
    };
}

pub(crate) struct ReiserProbe;

impl VolumeProbe for ReiserProbe {
    fn name(&self) -> &'static str {
        "reiserfs"
    }

    fn probe(&self, source: LogicalSource<'_>, volume: &mut Volume) -> Result<(), ProbeError> {
        return probe_reiserfs(source, volume);
    }
}

pub fn probe_reiserfs(source: LogicalSource<'_>, volume: &mut Volume) -> Result<(), ProbeError> {
    let sb: ReiserSuperBlock = source
        .with_block_size(REISERFS_SB_BLOCK_SIZE)
        .map_from_block(REISERFS_SB_BLOCK)?;

    let version =
        reiser_version(&sb.s_magic).ok_or(ProbeError::BadMagic("missing ReiserFS magic"))?;

    let block_size = u64::from(sb.s_blocksize.get());
    if block_size == 0 || !is_power_2(block_size) {
        return Err(ProbeError::Inconsistent("ReiserFS block size is not a power of two"));
    }

    volume.description = Some("Reiser filesystem".to_string());
    volume.vendor = Some("Hans Reiser".to_string());
    volume.version = Some(version.to_string());
    volume.set_attribute("filesystem", "reiserfs");
    volume.add_capability("journaled", None);

    let state = if sb.s_umount_state.get() == REISERFS_VALID_FS {
        "clean"
    } else {
        "unclean"
    };
    volume.set_attribute("state", state);

    if let Some(hash) = hash_name(sb.s_hash_function_code.get()) {
        volume.set_attribute("hash", hash);
    }

    let uuid = Uuid::from_bytes(sb.s_uuid);
    if !uuid.is_nil() {
        volume.serial = Some(uuid.to_string());
    }
    volume.set_attribute("label", decode_utf8_lossy_from(&sb.s_label));

    let size = u64::from(sb.s_block_count.get()) * block_size;
    set_used_size(volume, size);

    return Ok(());
}
