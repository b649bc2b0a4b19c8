use bitflags::bitflags;
use uuid::Uuid;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, Unaligned,
    byteorder::{U32, U64},
};

use crate::{
    ProbeError,
    checksum::efi_crc32,
    engine::ScanContext,
    partitions::{PartitionMap, dos::read_boot_record, scan_partition},
    source::LogicalSource,
    types::{
        describe_capabilities,
        dos::MbrPartitionType,
        gpt::lookup_gpt_type,
    },
    util::{decode_utf16le_lossy_from, is_power_2},
    volume::{Volume, VolumeKind},
};

/*
Info from https://uefi.org/specs/UEFI/2.10/05_GUID_Partition_Table_Format.html
*/

pub const GPT_HEADER_SIGNATURE: [u8; 8] = *b"EFI PART";
const GPT_HEADER_LBA: u64 = 1;
const GPT_MIN_ENTRY_SIZE: u64 = 128;
/// Upper bound on the partition entry array, far above the usual 16 KiB.
const GPT_MAX_ARRAY_SIZE: u64 = 4 << 20;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct GptHeader {
    pub signature: [u8; 8],
    pub revision: U32<LittleEndian>,
    pub header_size: U32<LittleEndian>,
    pub header_crc32: U32<LittleEndian>,
    pub reserved1: U32<LittleEndian>,
    pub my_lba: U64<LittleEndian>,
    pub alternate_lba: U64<LittleEndian>,
    pub first_usable_lba: U64<LittleEndian>,
    pub last_usable_lba: U64<LittleEndian>,
    pub disk_guid: [u8; 16],
    pub partition_entries_lba: U64<LittleEndian>,
    pub num_partition_entries: U32<LittleEndian>,
    pub sizeof_partition_entry: U32<LittleEndian>,
    pub partition_entry_array_crc32: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct GptEntry {
    pub partition_type_guid: [u8; 16],
    pub unique_partition_guid: [u8; 16],
    pub starting_lba: U64<LittleEndian>,
    pub ending_lba: U64<LittleEndian>,
    pub attributes: U64<LittleEndian>,
    pub partition_name: [u8; 72],
}

bitflags! {
    /// Partition attribute bits we report. Every other bit is ignored.
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
    pub struct GptAttributes: u64 {
        const PLATFORM_REQUIRED = 1 << 0;
        const READ_ONLY = 1 << 60;
        const HIDDEN = 1 << 62;
        const NO_AUTOMOUNT = 1 << 63;
    }
}

const GPT_ATTRIBUTE_CAPABILITIES: &[(GptAttributes, &str)] = &[
    (GptAttributes::PLATFORM_REQUIRED, "precious"),
    (GptAttributes::READ_ONLY, "readonly"),
    (GptAttributes::HIDDEN, "hidden"),
    (GptAttributes::NO_AUTOMOUNT, "nomount"),
];

pub(crate) struct GptMap;

impl PartitionMap for GptMap {
    fn name(&self) -> &'static str {
        "gpt"
    }

    fn description(&self) -> &'static str {
        "GUID partition table"
    }

    fn probe(
        &self,
        ctx: &ScanContext<'_>,
        source: LogicalSource<'_>,
        medium: &mut Volume,
    ) -> Result<(), ProbeError> {
        return probe_gpt_pt(ctx, source, medium);
    }
}

/// The protective MBR may only hold empty or 0xEE entries.
fn check_protective_mbr(source: LogicalSource<'_>) -> Result<(), ProbeError> {
    let pmbr = read_boot_record(source, 0)?;

    let foreign = pmbr.partitions.iter().any(|p| {
        let ptype = p.partition_type();
        !ptype.is_empty() && ptype != MbrPartitionType::MBR_GPT_PARTITION
    });

    if foreign {
        return Err(ProbeError::BadMagic("MBR holds non-GPT partitions"));
    }

    return Ok(());
}

/// Read the header at `lba` and verify its CRC.
fn read_gpt_header(source: LogicalSource<'_>, lba: u64) -> Result<GptHeader, ProbeError> {
    let raw = source.read_block(lba)?;

    let (header, _) = GptHeader::read_from_prefix(&raw).map_err(|_| ProbeError::ShortRead {
        offset: source.offset() + lba * source.block_size(),
        length: size_of::<GptHeader>() as u64,
    })?;

    if header.signature != GPT_HEADER_SIGNATURE {
        return Err(ProbeError::BadMagic("missing \"EFI PART\" signature"));
    }

    let hsz = u64::from(header.header_size.get());
    if hsz < size_of::<GptHeader>() as u64 || hsz > source.block_size() {
        return Err(ProbeError::Inconsistent("GPT header size out of range"));
    }

    let mut header_bytes = raw[..hsz as usize].to_vec();
    header_bytes[16..20].fill(0);

    let expected = header.header_crc32.get();
    let got = efi_crc32(&header_bytes);

    if got != expected {
        return Err(ProbeError::ChecksumFailed { expected, got });
    }

    return Ok(header);
}

/// Locate and read the partition entry array, validating the declared size
/// against the source before anything is allocated.
fn read_gpt_entries(
    source: LogicalSource<'_>,
    header: &GptHeader,
) -> Result<(Vec<u8>, usize, usize), ProbeError> {
    let bs = source.block_size();
    let lba = header.partition_entries_lba.get();

    if lba == 0 {
        return Err(ProbeError::Inconsistent("GPT partition entries at LBA 0"));
    }

    let count = u64::from(header.num_partition_entries.get());
    let esz = u64::from(header.sizeof_partition_entry.get());

    if esz < GPT_MIN_ENTRY_SIZE || !is_power_2(esz) {
        return Err(ProbeError::Inconsistent("GPT entry size is invalid"));
    }

    let total = count
        .checked_mul(esz)
        .filter(|&total| total <= GPT_MAX_ARRAY_SIZE)
        .ok_or(ProbeError::Inconsistent("GPT partition array is too large"))?;

    let end = lba
        .checked_mul(bs)
        .and_then(|start| start.checked_add(total))
        .ok_or(ProbeError::Inconsistent("GPT partition array is out of range"))?;

    if let Some(len) = source.len() {
        if end > len {
            return Err(ProbeError::Inconsistent("GPT partition array exceeds the device"));
        }
    }

    let array = source.read_blocks(lba, total.div_ceil(bs))?;

    return Ok((array, count as usize, esz as usize));
}

fn probe_gpt_pt(
    ctx: &ScanContext<'_>,
    source: LogicalSource<'_>,
    medium: &mut Volume,
) -> Result<(), ProbeError> {
    check_protective_mbr(source)?;

    let header = read_gpt_header(source, GPT_HEADER_LBA)?;
    let (array, count, esz) = read_gpt_entries(source, &header)?;

    let bs = source.block_size();

    log::debug!(
        "probe_gpt_pt: {count} entries of {esz} bytes, usable LBA {}..={}",
        header.first_usable_lba.get(),
        header.last_usable_lba.get()
    );

    let revision = header.revision.get();
    let (major, minor) = (revision >> 16, revision & 0xffff);
    medium.add_capability(
        &format!("gpt-{major}.{minor:02}"),
        Some(&format!("GUID Partition Table version {major}.{minor:02}")),
    );
    medium.set_attribute("guid", Uuid::from_bytes_le(header.disk_guid).to_string());

    for (i, raw) in array.chunks_exact(esz).take(count).enumerate() {
        let Ok((entry, _)) = GptEntry::read_from_prefix(raw) else {
            continue;
        };

        let type_guid = Uuid::from_bytes_le(entry.partition_type_guid);
        if type_guid.is_nil() {
            continue;
        }

        let start = entry.starting_lba.get();
        let end = entry.ending_lba.get();

        let Some((offset, capacity)) = end
            .checked_sub(start)
            .and_then(|blocks| blocks.checked_add(1))
            .and_then(|blocks| blocks.checked_mul(bs))
            .and_then(|capacity| Some((start.checked_mul(bs)?, capacity)))
        else {
            log::debug!("probe_gpt_pt: entry {} has an invalid range {start}..={end}", i + 1);
            continue;
        };

        let mut partition = gpt_partition(&entry, &type_guid, i as u32 + 1);
        partition.capacity = capacity;

        scan_partition(ctx, source.slice(offset, capacity), &mut partition);
        medium.add_child(partition);
    }

    return Ok(());
}

fn gpt_partition(entry: &GptEntry, type_guid: &Uuid, index: u32) -> Volume {
    let mut partition = Volume::new(VolumeKind::Volume);
    partition.physical_index = Some(index);
    partition.serial = Some(Uuid::from_bytes_le(entry.unique_partition_guid).to_string());
    partition.description = Some("EFI partition".to_string());
    partition.set_attribute("name", decode_utf16le_lossy_from(&entry.partition_name));

    if let Some(info) = lookup_gpt_type(type_guid) {
        partition.description = Some(info.description.to_string());
        partition.vendor = info.vendor.map(str::to_string);
        partition.icon = info.icon.map(str::to_string);
        for capability in info.capabilities {
            partition.add_capability(capability, None);
        }
    }

    let attributes = GptAttributes::from_bits_truncate(entry.attributes.get());
    for (flag, capability) in GPT_ATTRIBUTE_CAPABILITIES {
        if attributes.contains(*flag) {
            partition.add_capability(capability, None);
        }
    }

    describe_capabilities(&mut partition);

    return partition;
}
