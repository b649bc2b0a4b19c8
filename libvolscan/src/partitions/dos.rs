use std::collections::BTreeSet;

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, Unaligned,
    byteorder::{U16, U32},
};

use crate::{
    ProbeError,
    engine::ScanContext,
    partitions::{PartitionMap, scan_partition},
    source::LogicalSource,
    types::{
        describe_capabilities,
        dos::{MbrPartitionType, lookup_dos_type},
    },
    volume::{Volume, VolumeKind},
};

/*
Info from https://en.wikipedia.org/wiki/Master_boot_record
and https://en.wikipedia.org/wiki/Extended_boot_record
*/

pub const MBR_BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
pub const MBR_SECTOR_SIZE: u64 = 512;

const MBR_BOOT_ACTIVE: u8 = 0x80;
const MBR_BOOT_INACTIVE: u8 = 0x00;

/// First logical partition number in an extended chain.
const FIRST_LOGICAL: u32 = 5;
const MAX_EBR_CHAIN: usize = 128;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct DosPartitionEntry {
    pub boot_ind: u8, /* 0x80 - active */
    pub begin_head: u8,
    pub begin_sector: u8,
    pub begin_cylinder: u8,
    pub sys_ind: u8,
    pub end_head: u8,
    pub end_sector: u8,
    pub end_cylinder: u8,
    pub start_sect: U32<LittleEndian>,
    pub nr_sects: U32<LittleEndian>,
}

impl DosPartitionEntry {
    pub fn partition_type(&self) -> MbrPartitionType {
        MbrPartitionType::from_byte(self.sys_ind)
    }

    pub fn start(&self) -> u64 {
        u64::from(self.start_sect.get())
    }

    pub fn size(&self) -> u64 {
        u64::from(self.nr_sects.get())
    }

    /// An entry with no type or no sectors describes nothing.
    pub fn is_unused(&self) -> bool {
        self.partition_type().is_empty() || self.size() == 0
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct MasterBootRecord {
    pub bootstrap_code_area: [u8; 440],
    pub disk_signature: U32<LittleEndian>,
    pub reserved: U16<LittleEndian>,
    pub partitions: [DosPartitionEntry; 4],
    pub boot_signature: [u8; 2],
}

/// Read the boot record at `sector` and check its signature.
pub fn read_boot_record(
    source: LogicalSource<'_>,
    sector: u64,
) -> Result<MasterBootRecord, ProbeError> {
    let mbr: MasterBootRecord = source
        .with_block_size(MBR_SECTOR_SIZE)
        .map_from_block(sector)?;

    if mbr.boot_signature != MBR_BOOT_SIGNATURE {
        return Err(ProbeError::BadMagic("missing 0xAA55 boot signature"));
    }

    return Ok(mbr);
}

/// FAT boot sectors carry the same 0xAA55 trailer as an MBR.
fn looks_like_fat(sector: &[u8]) -> bool {
    let at = |offset: usize, magic: &[u8]| sector.get(offset..offset + magic.len()) == Some(magic);

    return at(0x36, b"FAT12") || at(0x36, b"FAT16") || at(0x36, b"FAT     ") || at(0x52, b"FAT32   ");
}

pub(crate) struct DosMap;

impl PartitionMap for DosMap {
    fn name(&self) -> &'static str {
        "dos"
    }

    fn description(&self) -> &'static str {
        "MS-DOS partition table"
    }

    fn probe(
        &self,
        ctx: &ScanContext<'_>,
        source: LogicalSource<'_>,
        medium: &mut Volume,
    ) -> Result<(), ProbeError> {
        return probe_dos_pt(ctx, source, medium);
    }
}

fn probe_dos_pt(
    ctx: &ScanContext<'_>,
    source: LogicalSource<'_>,
    medium: &mut Volume,
) -> Result<(), ProbeError> {
    let source = source.with_block_size(MBR_SECTOR_SIZE);

    let mbr = read_boot_record(source, 0)?;

    if looks_like_fat(mbr.as_bytes()) {
        return Err(ProbeError::BadMagic("boot sector belongs to a FAT filesystem"));
    }

    if mbr
        .partitions
        .iter()
        .any(|p| p.boot_ind != MBR_BOOT_ACTIVE && p.boot_ind != MBR_BOOT_INACTIVE)
    {
        return Err(ProbeError::Inconsistent("MBR boot flag is neither 0x00 nor 0x80"));
    }

    let signature = mbr.disk_signature.get();
    if signature != 0 && signature != u32::MAX {
        medium.set_attribute("signature", format!("{signature:08x}"));
    }

    let mut next_logical = FIRST_LOGICAL;
    let mut found = 0usize;
    let mut extended = false;

    for (i, entry) in mbr.partitions.iter().enumerate() {
        if entry.is_unused() {
            continue;
        }

        let region = source.slice(entry.start() * MBR_SECTOR_SIZE, entry.size() * MBR_SECTOR_SIZE);

        if entry.partition_type().is_extended() {
            extended = true;

            let mut chain = ExtendedChain {
                ctx,
                region,
                next_logical: &mut next_logical,
                visited: BTreeSet::new(),
            };
            found += chain.walk(medium)?;
            continue;
        }

        let mut partition = dos_partition(entry, i as u32 + 1);
        partition.add_capability("primary", Some("Primary partition"));

        scan_partition(ctx, region, &mut partition);
        medium.add_child(partition);
        found += 1;
    }

    if found == 0 && !extended {
        return Err(ProbeError::BadMagic("MBR has no partitions"));
    }

    return Ok(());
}

/// Build the record for one DOS entry from the type table.
fn dos_partition(entry: &DosPartitionEntry, index: u32) -> Volume {
    let mut partition = Volume::new(VolumeKind::Volume);
    partition.physical_index = Some(index);
    partition.capacity = entry.size() * MBR_SECTOR_SIZE;

    match lookup_dos_type(entry.sys_ind) {
        Some(info) => {
            partition.description = Some(format!("{} partition", info.description));
            for capability in info.capabilities {
                partition.add_capability(capability, None);
            }
            partition.icon = Some(info.icon.unwrap_or("disc").to_string());
        }
        None => {
            partition.description = Some(format!("Unknown (0x{:02x}) partition", entry.sys_ind));
            partition.icon = Some("disc".to_string());
        }
    }

    if entry.boot_ind == MBR_BOOT_ACTIVE {
        partition.add_capability("bootable", Some("Bootable partition (active)"));
    }

    describe_capabilities(&mut partition);

    return partition;
}

/// Walk state for one extended partition. `region` covers the extended
/// partition; every EBR and link inside it is addressed relative to its
/// start, logical partitions relative to their own EBR.
struct ExtendedChain<'c, 'p, 'd> {
    ctx: &'c ScanContext<'p>,
    region: LogicalSource<'d>,
    next_logical: &'c mut u32,
    visited: BTreeSet<u64>,
}

impl ExtendedChain<'_, '_, '_> {
    /// Emit every logical partition reachable from the first EBR, returning
    /// how many were found.
    fn walk(&mut self, medium: &mut Volume) -> Result<usize, ProbeError> {
        return self.visit(0, 0, medium);
    }

    fn visit(&mut self, ebr: u64, depth: usize, medium: &mut Volume) -> Result<usize, ProbeError> {
        if depth >= MAX_EBR_CHAIN {
            return Err(ProbeError::Inconsistent("extended partition chain is too long"));
        }

        if !self.visited.insert(ebr) {
            return Err(ProbeError::Inconsistent("extended partition chain loops"));
        }

        let record = match read_boot_record(self.region, ebr) {
            Ok(record) => record,
            Err(e) => {
                log::debug!("ExtendedChain: chain ends at EBR sector {ebr}: {e}");
                return Ok(0);
            }
        };

        let [logical, link, _, _] = &record.partitions;
        let mut found = 0;

        if !logical.is_unused() && !logical.partition_type().is_extended() {
            let start = ebr
                .checked_add(logical.start())
                .ok_or(ProbeError::Inconsistent("logical partition start overflows"))?;

            let mut partition = dos_partition(logical, *self.next_logical);
            *self.next_logical += 1;
            partition.add_capability("logical", Some("Logical partition"));

            let region = self
                .region
                .slice(start * MBR_SECTOR_SIZE, logical.size() * MBR_SECTOR_SIZE);

            scan_partition(self.ctx, region, &mut partition);
            medium.add_child(partition);
            found += 1;
        }

        if link.is_unused() || !link.partition_type().is_extended() {
            return Ok(found);
        }

        return Ok(found + self.visit(link.start(), depth + 1, medium)?);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ScanFilter, ScanFlags};

    fn put_entry(sector: &mut [u8], slot: usize, flags: u8, ptype: u8, start: u32, size: u32) {
        let off = 0x1be + slot * 16;
        sector[off] = flags;
        sector[off + 4] = ptype;
        sector[off + 8..off + 12].copy_from_slice(&start.to_le_bytes());
        sector[off + 12..off + 16].copy_from_slice(&size.to_le_bytes());
        sector[0x1fe] = 0x55;
        sector[0x1ff] = 0xaa;
    }

    fn ctx() -> ScanContext<'static> {
        ScanContext::new(None, ScanFlags::empty(), ScanFilter::empty())
    }

    fn probe(img: &Vec<u8>) -> Result<Volume, ProbeError> {
        let mut medium = Volume::new(VolumeKind::Disk);
        let source = LogicalSource::new(img, Some(img.len() as u64));
        probe_dos_pt(&ctx(), source, &mut medium)?;
        return Ok(medium);
    }

    #[test]
    fn empty_table_is_not_a_match() {
        let mut img = vec![0u8; 8 * 512];
        img[0x1fe] = 0x55;
        img[0x1ff] = 0xaa;

        assert_eq!(probe(&img), Err(ProbeError::BadMagic("MBR has no partitions")));
    }

    #[test]
    fn missing_signature() {
        let img = vec![0u8; 512];
        assert!(matches!(probe(&img), Err(ProbeError::BadMagic(_))));
    }

    #[test]
    fn corrupt_boot_flag_rejects_table() {
        let mut img = vec![0u8; 8 * 512];
        put_entry(&mut img, 0, 0x80, 0x83, 1, 2);
        put_entry(&mut img, 1, 0x12, 0x83, 3, 2);

        assert!(matches!(probe(&img), Err(ProbeError::Inconsistent(_))));
    }

    #[test]
    fn primary_partitions() {
        let mut img = vec![0u8; 16 * 512];
        put_entry(&mut img, 0, 0x00, 0x0c, 1, 4);
        put_entry(&mut img, 2, 0x80, 0x8e, 5, 8);
        img[0x1b8..0x1bc].copy_from_slice(&0xdeadbeefu32.to_le_bytes());

        let medium = probe(&img).unwrap();

        assert_eq!(medium.attribute("signature"), Some("deadbeef"));
        assert_eq!(medium.children.len(), 2);

        let fat = &medium.children[0];
        assert_eq!(fat.physical_index, Some(1));
        assert_eq!(fat.description.as_deref(), Some("W95 FAT32 (LBA) partition"));
        assert_eq!(fat.capacity, 4 * 512);
        assert!(fat.is_capable("primary"));
        assert!(!fat.is_capable("bootable"));

        let lvm = &medium.children[1];
        assert_eq!(lvm.physical_index, Some(3));
        assert!(lvm.is_capable("bootable"));
        assert!(lvm.is_capable("multi"));
        assert_eq!(lvm.icon.as_deref(), Some("md"));
        assert_eq!(
            lvm.capability("multi").unwrap().description.as_deref(),
            Some("Multi-volumes")
        );
    }

    #[test]
    fn fat_boot_sector_is_not_an_mbr() {
        let mut img = vec![0u8; 8 * 512];
        put_entry(&mut img, 0, 0x00, 0x83, 1, 2);
        img[0x52..0x5a].copy_from_slice(b"FAT32   ");

        assert!(matches!(probe(&img), Err(ProbeError::BadMagic(_))));
    }

    /// Fill an extended partition starting at sector `base` with `count`
    /// EBRs spaced `stride` sectors apart, each followed by a 1 sector
    /// logical partition.
    fn write_chain(img: &mut [u8], base: u32, count: u32, stride: u32) {
        for n in 0..count {
            let ebr_rel = stride * n;
            let at = ((base + ebr_rel) * 512) as usize;
            let sector = &mut img[at..at + 512];
            put_entry(sector, 0, 0x00, 0x83, 1, 1);
            if n + 1 < count {
                put_entry(sector, 1, 0x00, 0x05, ebr_rel + stride, stride);
            }
        }
    }

    /// Extended partition at sector 10 holding `count` logical partitions,
    /// each EBR followed by a 2 sector partition.
    fn extended_image(count: u32) -> Vec<u8> {
        let mut img = vec![0u8; 64 * 512];
        put_entry(&mut img, 0, 0x00, 0x83, 1, 8);
        put_entry(&mut img, 1, 0x00, 0x05, 10, 4 * count);

        for n in 0..count {
            let ebr_rel = 4 * n;
            let sector = &mut img[((10 + ebr_rel) * 512) as usize..((11 + ebr_rel) * 512) as usize];
            put_entry(sector, 0, 0x00, 0x83, 1, 2);
            if n + 1 < count {
                put_entry(sector, 1, 0x00, 0x05, ebr_rel + 4, 3);
            }
        }

        return img;
    }

    /// Extended partition at sector 1 whose chain is `links` EBRs long.
    fn long_chain_image(links: u32) -> Vec<u8> {
        let mut img = vec![0u8; (2 * links as usize + 8) * 512];
        put_entry(&mut img, 0, 0x00, 0x0f, 1, 2 * links);
        write_chain(&mut img, 1, links, 2);
        return img;
    }

    #[test]
    fn extended_chain_numbering() {
        let img = extended_image(3);
        let medium = probe(&img).unwrap();

        let indexes: Vec<_> = medium.children.iter().map(|c| c.physical_index).collect();
        assert_eq!(indexes, vec![Some(1), Some(5), Some(6), Some(7)]);

        for logical in &medium.children[1..] {
            assert!(logical.is_capable("logical"));
            assert_eq!(logical.capacity, 1024);
        }
    }

    #[test]
    fn looping_chain_is_rejected() {
        let mut img = extended_image(2);
        let second = (14 * 512) as usize;
        put_entry(&mut img[second..second + 512], 1, 0x00, 0x05, 0, 3);

        assert_eq!(
            probe(&img),
            Err(ProbeError::Inconsistent("extended partition chain loops"))
        );
    }

    #[test]
    fn counter_is_per_scan() {
        let img = extended_image(1);

        let first = probe(&img).unwrap();
        let second = probe(&img).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.children[1].physical_index, Some(5));
    }

    #[test]
    fn numbering_continues_across_extended_partitions() {
        let mut img = vec![0u8; 64 * 512];
        put_entry(&mut img, 0, 0x00, 0x05, 10, 8);
        put_entry(&mut img, 1, 0x00, 0x85, 30, 12);
        write_chain(&mut img, 10, 2, 4);
        write_chain(&mut img, 30, 3, 4);

        let medium = probe(&img).unwrap();

        let indexes: Vec<_> = medium.children.iter().map(|c| c.physical_index).collect();
        assert_eq!(indexes, vec![Some(5), Some(6), Some(7), Some(8), Some(9)]);
        assert!(medium.children.iter().all(|c| c.is_capable("logical")));
    }

    #[test]
    fn chain_depth_is_bounded() {
        let medium = probe(&long_chain_image(128)).unwrap();
        assert_eq!(medium.children.len(), 128);
        assert_eq!(medium.children[127].physical_index, Some(132));

        assert_eq!(
            probe(&long_chain_image(129)),
            Err(ProbeError::Inconsistent("extended partition chain is too long"))
        );
    }

    #[test]
    fn unsigned_ebr_ends_chain() {
        let mut img = extended_image(2);
        img[14 * 512 + 0x1fe..14 * 512 + 0x200].fill(0);

        let medium = probe(&img).unwrap();

        let indexes: Vec<_> = medium.children.iter().map(|c| c.physical_index).collect();
        assert_eq!(indexes, vec![Some(1), Some(5)]);
    }

    #[test]
    fn non_extended_link_is_not_followed() {
        let mut img = extended_image(2);
        put_entry(&mut img[10 * 512..11 * 512], 1, 0x00, 0x07, 4, 3);

        let medium = probe(&img).unwrap();

        let indexes: Vec<_> = medium.children.iter().map(|c| c.physical_index).collect();
        assert_eq!(indexes, vec![Some(1), Some(5)]);
    }
}
