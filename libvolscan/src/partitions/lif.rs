use zerocopy::{
    BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{U16, U32},
};

use crate::{
    ProbeError, engine::ScanContext, partitions::PartitionMap, source::LogicalSource,
    util::decode_utf8_lossy_from, volume::Volume,
};

/*
HP Logical Interchange Format volume header, found on PA-RISC boot disks.
*/

pub const LIF_MAGIC: u16 = 0x8000;
const LIF_BLOCK_SIZE: u64 = 256;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct LifHeader {
    pub magic: U16<BigEndian>,
    pub label: [u8; 6],
    pub dir_start: U32<BigEndian>,
    pub lif_id: U16<BigEndian>,
    pub reserved1: U16<BigEndian>,
    pub dir_length: U32<BigEndian>,
    pub version: U16<BigEndian>,
    pub reserved2: U16<BigEndian>,
    pub tracks_per_surface: U32<BigEndian>,
    pub surfaces: U32<BigEndian>,
    pub blocks_per_track: U32<BigEndian>,
    pub date: [u8; 6],
    pub reserved3: [u8; 198],
    pub ipl_addr: U32<BigEndian>,
    pub ipl_length: U32<BigEndian>,
    pub ipl_entry: U32<BigEndian>,
}

pub(crate) struct LifMap;

impl PartitionMap for LifMap {
    fn name(&self) -> &'static str {
        "lif"
    }

    fn description(&self) -> &'static str {
        "HP-UX LIF"
    }

    fn probe(
        &self,
        _ctx: &ScanContext<'_>,
        source: LogicalSource<'_>,
        medium: &mut Volume,
    ) -> Result<(), ProbeError> {
        return probe_lif(source, medium);
    }
}

fn probe_lif(source: LogicalSource<'_>, medium: &mut Volume) -> Result<(), ProbeError> {
    let header: LifHeader = source.with_block_size(LIF_BLOCK_SIZE).map_from_block(0)?;

    if header.magic.get() != LIF_MAGIC {
        return Err(ProbeError::BadMagic("missing LIF magic"));
    }

    let dir_start = header.dir_start.get();
    let dir_length = header.dir_length.get();
    let version = header.version.get();

    if dir_start < 2 {
        return Err(ProbeError::Inconsistent("LIF directory overlaps the volume header"));
    }
    if dir_length < 1 {
        return Err(ProbeError::Inconsistent("LIF directory is empty"));
    }
    if version < 1 {
        return Err(ProbeError::Inconsistent("LIF version is 0"));
    }

    log::debug!(
        "probe_lif: directory {dir_start}+{dir_length}, version {version}, geometry {}x{}x{}",
        header.tracks_per_surface.get(),
        header.surfaces.get(),
        header.blocks_per_track.get()
    );

    medium.version = Some(version.to_string());
    medium.set_attribute("label", decode_utf8_lossy_from(&header.label));

    if header.ipl_addr.get() != 0 && header.ipl_length.get() != 0 {
        log::debug!(
            "probe_lif: IPL at {} ({} bytes), entry {}",
            header.ipl_addr.get(),
            header.ipl_length.get(),
            header.ipl_entry.get()
        );
        medium.add_capability("bootable", Some("Bootable disk"));
    }

    return Ok(());
}
