use std::{
    fs::File,
    io::{Seek, SeekFrom},
    path::{Path, PathBuf},
};

use bitflags::bitflags;
use rustix::fs::{FileType, fstat};

use crate::{
    ProbeError, ScanError,
    filesystems::scan_volume,
    partitions::scan_partition_maps,
    source::{BlockDevice, LogicalSource},
    volume::{Volume, VolumeKind},
};

bitflags! {
    /// Flags controlling the behavior of a [`PartitionEngine`].
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
    pub struct ScanFlags: u64 {
        /// Do not try to match partitions to sibling device nodes.
        const NO_NODE_RESOLUTION = 1 << 0;
    }

    /// Filters used to skip specific detector categories or items.
    ///
    /// Can be combined to restrict scanning to certain partition maps,
    /// filesystems or containers.
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
    pub struct ScanFilter: u64 {
        /// Skip container detectors (LUKS, LVM).
        const SKIP_CONT = 1 << 0;
        /// Skip partition map detectors.
        const SKIP_PT = 1 << 1;
        /// Skip filesystem detectors.
        const SKIP_FS = 1 << 2;
        /// Skip GPT partition map detector.
        const SKIP_GPT = 1 << 3;
        /// Skip DOS partition map detector.
        const SKIP_DOS = 1 << 4;
        /// Skip Apple partition map detector.
        const SKIP_MAC = 1 << 5;
        /// Skip HP-UX LIF detector.
        const SKIP_LIF = 1 << 6;
        /// Skip LUKS detectors, both whole device and volume.
        const SKIP_LUKS = 1 << 7;
        /// Skip ext2/3/4 filesystem detector.
        const SKIP_EXT = 1 << 8;
        /// Skip ReiserFS filesystem detector.
        const SKIP_REISERFS = 1 << 9;
        /// Skip FAT filesystem detector.
        const SKIP_VFAT = 1 << 10;
        /// Skip HFS+/HFSX filesystem detector.
        const SKIP_HFSPLUS = 1 << 11;
        /// Skip LVM physical volume label detector.
        const SKIP_LVM = 1 << 12;
    }
}

/// What the enumeration layer knows about a device before it is scanned.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Device {
    /// Path to open, e.g. `/dev/sda` or a disk image.
    pub logical_name: Option<PathBuf>,
    /// Size in bytes, 0 when unknown.
    pub size: u64,
    pub removable: bool,
}

/// State shared by every detector during the scan of one device.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanContext<'a> {
    pub(crate) disk: Option<&'a Path>,
    pub(crate) flags: ScanFlags,
    pub(crate) filter: ScanFilter,
}

impl<'a> ScanContext<'a> {
    pub(crate) fn new(disk: Option<&'a Path>, flags: ScanFlags, filter: ScanFilter) -> Self {
        Self {
            disk,
            flags,
            filter,
        }
    }

    pub(crate) fn allows(&self, category: ScanFilter, item: ScanFilter) -> bool {
        return !self.filter.contains(category) && !self.filter.contains(item);
    }
}

/// Log why a detector passed on a source. Signature mismatches are the
/// normal case, structural damage is worth a warning.
pub(crate) fn log_rejection(detector: &str, source: &LogicalSource<'_>, err: &ProbeError) {
    match err {
        ProbeError::Inconsistent(_) => {
            log::warn!("{detector}: rejected at offset {}: {err}", source.offset());
        }
        _ => log::debug!("{detector}: no match at offset {}: {err}", source.offset()),
    }
}

/// Entry point: turns a [`Device`] into a tree of [`Volume`] records.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct PartitionEngine {
    flags: ScanFlags,
    filter: ScanFilter,
}

impl PartitionEngine {
    pub fn new(flags: ScanFlags, filter: ScanFilter) -> Self {
        Self { flags, filter }
    }

    /// Open `device.logical_name` and scan it.
    ///
    /// A zero `device.size` is resolved from [`fstat`] for regular files and
    /// by seeking to the end for block devices.
    ///
    /// # Errors
    /// Only failure to open or size the device is an error. An unreadable or
    /// unrecognised layout still yields a record for the raw device.
    pub fn scan(&self, device: &Device) -> Result<Volume, ScanError> {
        let path = device
            .logical_name
            .as_deref()
            .ok_or(ScanError::MissingLogicalName)?;

        let file = File::open(path)?;

        let size = if device.size > 0 {
            device.size
        } else {
            device_size(&file)?
        };

        let sized = Device {
            size,
            ..device.clone()
        };

        return Ok(self.scan_reader(&file, &sized));
    }

    /// Scan an already opened device.
    pub fn scan_reader(&self, reader: &dyn BlockDevice, device: &Device) -> Volume {
        let len = if device.size > 0 {
            Some(device.size)
        } else {
            None
        };

        let source = LogicalSource::new(reader, len);
        let ctx = ScanContext::new(device.logical_name.as_deref(), self.flags, self.filter);

        let mut disk = Volume::new(VolumeKind::Disk);
        disk.capacity = device.size;
        disk.size = device.size;
        disk.logical_name = device.logical_name.clone();

        if device.removable {
            let mut medium = Volume::new(VolumeKind::Disk);
            medium.description = Some("Removable medium".to_string());
            medium.capacity = device.size;
            medium.size = device.size;
            medium.logical_name = device.logical_name.clone();

            scan_medium(&ctx, source, &mut medium);
            disk.add_child(medium);
        } else {
            scan_medium(&ctx, source, &mut disk);
        }

        return disk;
    }
}

/// Scan `device` with every detector enabled.
pub fn scan_partitions(device: &Device) -> Result<Volume, ScanError> {
    return PartitionEngine::default().scan(device);
}

fn scan_medium(ctx: &ScanContext<'_>, source: LogicalSource<'_>, medium: &mut Volume) {
    if scan_partition_maps(ctx, source, medium) {
        return;
    }

    if scan_volume(ctx, source, medium) {
        medium.kind = VolumeKind::Volume;
        return;
    }

    log::debug!("scan_medium: {:?} left as a raw device", ctx.disk);
}

fn device_size(file: &File) -> Result<u64, ScanError> {
    let stat = fstat(file)?;

    if FileType::from_raw_mode(stat.st_mode) == FileType::RegularFile {
        return Ok(u64::try_from(stat.st_size).unwrap_or(0));
    }

    let mut handle = file;
    let size = handle.seek(SeekFrom::End(0))?;

    return Ok(size);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_blocks_category_and_item() {
        let ctx = ScanContext::new(None, ScanFlags::empty(), ScanFilter::SKIP_GPT);
        assert!(!ctx.allows(ScanFilter::SKIP_PT, ScanFilter::SKIP_GPT));
        assert!(ctx.allows(ScanFilter::SKIP_PT, ScanFilter::SKIP_DOS));

        let ctx = ScanContext::new(None, ScanFlags::empty(), ScanFilter::SKIP_FS);
        assert!(!ctx.allows(ScanFilter::SKIP_FS, ScanFilter::SKIP_EXT));
        assert!(ctx.allows(ScanFilter::SKIP_CONT, ScanFilter::SKIP_LVM));
    }

    #[test]
    fn missing_logical_name() {
        let device = Device::default();
        assert!(matches!(
            scan_partitions(&device),
            Err(ScanError::MissingLogicalName)
        ));
    }

    #[test]
    fn blank_device_is_raw_disk() {
        let img = vec![0u8; 64 * 1024];
        let device = Device {
            logical_name: None,
            size: img.len() as u64,
            removable: false,
        };

        let disk = PartitionEngine::default().scan_reader(&img, &device);

        assert_eq!(disk.kind, VolumeKind::Disk);
        assert_eq!(disk.capacity, 65536);
        assert!(disk.capabilities.is_empty());
        assert!(disk.children.is_empty());
    }

    #[test]
    fn removable_device_gets_medium() {
        let img = vec![0u8; 4096];
        let device = Device {
            logical_name: Some(PathBuf::from("/dev/sr0")),
            size: 4096,
            removable: true,
        };

        let disk = PartitionEngine::default().scan_reader(&img, &device);

        assert_eq!(disk.children.len(), 1);
        let medium = &disk.children[0];
        assert_eq!(medium.kind, VolumeKind::Disk);
        assert_eq!(medium.capacity, 4096);
        assert_eq!(medium.logical_name.as_deref(), Some(Path::new("/dev/sr0")));
    }

    #[test]
    fn removable_partitions_hang_off_medium() {
        let mut img = vec![0u8; 64 * 512];
        img[0x1be + 4] = 0x83;
        img[0x1be + 8..0x1be + 12].copy_from_slice(&8u32.to_le_bytes());
        img[0x1be + 12..0x1be + 16].copy_from_slice(&16u32.to_le_bytes());
        img[0x1fe] = 0x55;
        img[0x1ff] = 0xaa;

        let device = Device {
            logical_name: None,
            size: img.len() as u64,
            removable: true,
        };

        let disk = PartitionEngine::default().scan_reader(&img, &device);

        assert!(!disk.is_capable("partitioned"));
        assert_eq!(disk.children.len(), 1);

        let medium = &disk.children[0];
        assert_eq!(medium.description.as_deref(), Some("Removable medium"));
        assert!(medium.is_capable("partitioned:dos"));
        assert_eq!(medium.children.len(), 1);
        assert_eq!(medium.children[0].physical_index, Some(1));
        assert_eq!(medium.children[0].capacity, 16 * 512);
    }
}
