use std::str::FromStr;

use uuid::Uuid;
use zerocopy::{
    BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{U16, U32, U64},
};

use crate::{
    ProbeError,
    devnode::resolve_device_node,
    engine::ScanContext,
    filesystems::VolumeProbe,
    partitions::PartitionMap,
    source::LogicalSource,
    util::decode_utf8_lossy_from,
    volume::{Volume, VolumeKind},
};

/*
 * https://en.wikipedia.org/wiki/Linux_Unified_Key_Setup#LUKS2
 * https://cdn.kernel.org/pub/linux/utils/cryptsetup/LUKS_docs/on-disk-format.pdf
 * https://gitlab.com/cryptsetup/LUKS2-docs
*/

pub const LUKS_MAGIC: [u8; 6] = *b"LUKS\xba\xbe";

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct Luks1Header {
    pub magic: [u8; 6],
    pub version: U16<BigEndian>,
    pub cipher_name: [u8; 32],
    pub cipher_mode: [u8; 32],
    pub hash_spec: [u8; 32],
    pub payload_offset: U32<BigEndian>,
    pub key_bytes: U32<BigEndian>,
    pub mk_digest: [u8; 20],
    pub mk_digest_salt: [u8; 32],
    pub mk_digest_iterations: U32<BigEndian>,
    pub uuid: [u8; 40],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct Luks2Header {
    pub magic: [u8; 6],
    pub version: U16<BigEndian>,
    pub hdr_size: U64<BigEndian>,
    pub seqid: U64<BigEndian>,
    pub label: [u8; 48],
    pub checksum_alg: [u8; 32],
    pub salt: [u8; 64],
    pub uuid: [u8; 40],
    pub subsystem: [u8; 48],
    pub hdr_offset: U64<BigEndian>,
    pub padding: [u8; 184],
    pub csum: [u8; 64],
}

/// LUKS found inside a partition or on an unpartitioned volume.
pub(crate) struct LuksVolume;

impl VolumeProbe for LuksVolume {
    fn name(&self) -> &'static str {
        "luks"
    }

    fn probe(&self, source: LogicalSource<'_>, volume: &mut Volume) -> Result<(), ProbeError> {
        return probe_luks(source, volume);
    }
}

/// LUKS covering the whole device. The device is represented as a single
/// encrypted child volume.
pub(crate) struct LuksContainer;

impl PartitionMap for LuksContainer {
    fn name(&self) -> &'static str {
        "luks"
    }

    fn description(&self) -> &'static str {
        "Linux Unified Key Setup"
    }

    fn probe(
        &self,
        ctx: &ScanContext<'_>,
        source: LogicalSource<'_>,
        medium: &mut Volume,
    ) -> Result<(), ProbeError> {
        let mut volume = Volume::new(VolumeKind::Volume);
        volume.physical_index = Some(1);
        volume.capacity = source.len().unwrap_or(medium.capacity);

        probe_luks(source, &mut volume)?;
        resolve_device_node(ctx, source, &mut volume);

        medium.add_child(volume);

        return Ok(());
    }
}

fn luks_serial(raw: &[u8; 40]) -> Option<String> {
    let text = decode_utf8_lossy_from(raw);
    if text.is_empty() {
        return None;
    }

    return match Uuid::from_str(&text) {
        Ok(uuid) => Some(uuid.hyphenated().to_string()),
        Err(_) => Some(text),
    };
}

pub fn probe_luks(source: LogicalSource<'_>, volume: &mut Volume) -> Result<(), ProbeError> {
    let block = source.with_block_size(512).read_block(0)?;

    let (header, _) = Luks1Header::read_from_prefix(&block).map_err(|_| {
        ProbeError::ShortRead {
            offset: source.offset(),
            length: size_of::<Luks1Header>() as u64,
        }
    })?;

    if header.magic != LUKS_MAGIC {
        return Err(ProbeError::BadMagic("missing LUKS magic"));
    }

    let version = header.version.get();
    if version < 1 {
        return Err(ProbeError::Inconsistent("LUKS header version is 0"));
    }

    if version == 1 {
        volume.set_attribute("cipher", decode_utf8_lossy_from(&header.cipher_name));
        volume.set_attribute("mode", decode_utf8_lossy_from(&header.cipher_mode));
        volume.set_attribute("hash", decode_utf8_lossy_from(&header.hash_spec));
        volume.set_attribute("bits", (u64::from(header.key_bytes.get()) * 8).to_string());
        volume.serial = luks_serial(&header.uuid);
    } else {
        let (header, _) = Luks2Header::read_from_prefix(&block).map_err(|_| {
            ProbeError::ShortRead {
                offset: source.offset(),
                length: size_of::<Luks2Header>() as u64,
            }
        })?;

        log::debug!(
            "probe_luks: LUKS{version} header of {} bytes, sequence {}",
            header.hdr_size.get(),
            header.seqid.get()
        );

        volume.set_attribute("label", decode_utf8_lossy_from(&header.label));
        volume.set_attribute("hash", decode_utf8_lossy_from(&header.checksum_alg));
        volume.serial = luks_serial(&header.uuid);
    }

    volume.description = Some("Linux Unified Key Setup volume".to_string());
    volume.vendor = Some("Linux".to_string());
    volume.version = Some(version.to_string());
    volume.add_capability("encrypted", Some("Encrypted volume"));
    volume.add_capability("luks", Some("Linux Unified Key Setup"));

    return Ok(());
}
