use zerocopy::{
    BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{U16, U32},
};

use crate::{
    ProbeError,
    engine::ScanContext,
    partitions::{PartitionMap, scan_partition},
    source::LogicalSource,
    types::describe_capabilities,
    util::decode_utf8_lossy_from,
    volume::{Volume, VolumeKind},
};

/*
Info from https://en.wikipedia.org/wiki/Apple_Partition_Map
*/

pub const APM_MAGIC: [u8; 2] = *b"PM";
const APM_BLOCK_SIZE: u64 = 512;
const APM_MAX_ENTRIES: u64 = 1024;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct ApmEntry {
    pub signature: [u8; 2],
    pub reserved1: U16<BigEndian>,
    pub map_entries: U32<BigEndian>,
    pub start_block: U32<BigEndian>,
    pub block_count: U32<BigEndian>,
    pub name: [u8; 32],
    pub partition_type: [u8; 32],
    pub data_start: U32<BigEndian>,
    pub data_count: U32<BigEndian>,
    pub status: U32<BigEndian>,
    pub boot_start: U32<BigEndian>,
    pub boot_size: U32<BigEndian>,
}

pub(crate) struct MacMap;

impl PartitionMap for MacMap {
    fn name(&self) -> &'static str {
        "mac"
    }

    fn description(&self) -> &'static str {
        "Apple Macintosh partition map"
    }

    fn probe(
        &self,
        ctx: &ScanContext<'_>,
        source: LogicalSource<'_>,
        medium: &mut Volume,
    ) -> Result<(), ProbeError> {
        return probe_mac_pt(ctx, source, medium);
    }
}

fn probe_mac_pt(
    ctx: &ScanContext<'_>,
    source: LogicalSource<'_>,
    medium: &mut Volume,
) -> Result<(), ProbeError> {
    let source = source.with_block_size(APM_BLOCK_SIZE);

    let first: ApmEntry = source.map_from_block(1)?;
    if first.signature != APM_MAGIC {
        return Err(ProbeError::BadMagic("missing Apple partition map signature"));
    }

    let declared = u64::from(first.map_entries.get());
    if declared == 0 {
        return Err(ProbeError::Inconsistent("Apple partition map declares no entries"));
    }

    let mut count = declared.min(APM_MAX_ENTRIES);
    if let Some(blocks) = source.blocks() {
        count = count.min(blocks.saturating_sub(1));
    }

    if count < declared {
        log::debug!("probe_mac_pt: clamped {declared} map entries to {count}");
    }

    for i in 1..=count {
        let entry: ApmEntry = match source.map_from_block(i) {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("probe_mac_pt: map ends at block {i}: {e}");
                break;
            }
        };

        if entry.signature != APM_MAGIC {
            continue;
        }

        let start = u64::from(entry.start_block.get()) * APM_BLOCK_SIZE;
        let capacity = u64::from(entry.block_count.get()) * APM_BLOCK_SIZE;

        let mut partition = mac_partition(&entry, i as u32);
        partition.capacity = capacity;

        scan_partition(ctx, source.slice(start, capacity), &mut partition);
        medium.add_child(partition);
    }

    return Ok(());
}

fn mac_partition(entry: &ApmEntry, index: u32) -> Volume {
    let ptype = decode_utf8_lossy_from(&entry.partition_type);

    let mut partition = Volume::new(VolumeKind::Volume);
    partition.physical_index = Some(index);
    partition.description = Some(ptype.replace('_', " "));
    partition.set_attribute("name", decode_utf8_lossy_from(&entry.name));

    match ptype.as_str() {
        "Apple_bootstrap" => partition.add_capability("boot", None),
        "Linux_LVM" => {
            partition.add_capability("multi", None);
            partition.icon = Some("md".to_string());
        }
        _ => {}
    }

    describe_capabilities(&mut partition);

    return partition;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ScanFilter, ScanFlags};

    fn put_entry(img: &mut [u8], block: usize, count: u32, start: u32, len: u32, name: &str, ptype: &str) {
        let off = block * 512;
        img[off..off + 2].copy_from_slice(b"PM");
        img[off + 4..off + 8].copy_from_slice(&count.to_be_bytes());
        img[off + 8..off + 12].copy_from_slice(&start.to_be_bytes());
        img[off + 12..off + 16].copy_from_slice(&len.to_be_bytes());
        img[off + 16..off + 16 + name.len()].copy_from_slice(name.as_bytes());
        img[off + 48..off + 48 + ptype.len()].copy_from_slice(ptype.as_bytes());
    }

    fn probe(img: &Vec<u8>) -> Result<Volume, ProbeError> {
        let ctx = ScanContext::new(None, ScanFlags::empty(), ScanFilter::empty());
        let mut medium = Volume::new(VolumeKind::Disk);
        probe_mac_pt(&ctx, LogicalSource::new(img, Some(img.len() as u64)), &mut medium)?;
        return Ok(medium);
    }

    #[test]
    fn apple_map_entries() {
        let mut img = vec![0u8; 32 * 512];
        put_entry(&mut img, 1, 3, 1, 63, "Apple", "Apple_partition_map");
        put_entry(&mut img, 2, 3, 8, 4, "bootstrap", "Apple_bootstrap");
        put_entry(&mut img, 3, 3, 12, 16, "lvm", "Linux_LVM");

        let medium = probe(&img).unwrap();
        assert_eq!(medium.children.len(), 3);

        let map = &medium.children[0];
        assert_eq!(map.description.as_deref(), Some("Apple partition map"));
        assert_eq!(map.physical_index, Some(1));

        let boot = &medium.children[1];
        assert!(boot.is_capable("boot"));
        assert_eq!(boot.capacity, 4 * 512);
        assert_eq!(boot.attribute("name"), Some("bootstrap"));

        let lvm = &medium.children[2];
        assert_eq!(lvm.description.as_deref(), Some("Linux LVM"));
        assert!(lvm.is_capable("multi"));
        assert_eq!(lvm.physical_index, Some(3));
    }

    #[test]
    fn entry_count_is_clamped() {
        let mut img = vec![0u8; 4 * 512];
        put_entry(&mut img, 1, u32::MAX, 1, 3, "Apple", "Apple_partition_map");
        put_entry(&mut img, 2, u32::MAX, 2, 2, "data", "Apple_HFS");

        let medium = probe(&img).unwrap();
        assert_eq!(medium.children.len(), 2);
    }

    #[test]
    fn no_signature() {
        let img = vec![0u8; 4 * 512];
        assert!(matches!(probe(&img), Err(ProbeError::BadMagic(_))));
    }

    #[test]
    fn unsigned_entry_is_skipped() {
        let mut img = vec![0u8; 32 * 512];
        put_entry(&mut img, 1, 3, 1, 63, "Apple", "Apple_partition_map");
        put_entry(&mut img, 3, 3, 12, 16, "data", "Apple_HFS");

        let medium = probe(&img).unwrap();

        let indexes: Vec<_> = medium.children.iter().map(|c| c.physical_index).collect();
        assert_eq!(indexes, vec![Some(1), Some(3)]);
        assert_eq!(medium.children[1].attribute("name"), Some("data"));
    }
}
