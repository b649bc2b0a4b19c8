pub mod ext;
pub mod hfsplus;
pub mod reiserfs;
pub mod vfat;

use crate::{
    ProbeError,
    containers::{luks::LuksVolume, lvm::probe_lvm2},
    engine::{ScanContext, ScanFilter, log_rejection},
    source::LogicalSource,
    volume::Volume,
};

/// A filesystem or container signature that can identify a volume.
pub(crate) trait VolumeProbe {
    fn name(&self) -> &'static str;

    /// Fill `volume` from the signature found in `source`. On error `volume`
    /// may be partially filled and must be discarded by the caller.
    fn probe(&self, source: LogicalSource<'_>, volume: &mut Volume) -> Result<(), ProbeError>;
}

/// Tried in order, the first match wins. ext comes first so its superblock
/// takes priority over coincidental ReiserFS or FAT signatures.
pub(crate) const VOLUME_PROBES: &[(ScanFilter, ScanFilter, &dyn VolumeProbe)] = &[
    (ScanFilter::SKIP_FS, ScanFilter::SKIP_EXT, &ext::ExtProbe),
    (ScanFilter::SKIP_FS, ScanFilter::SKIP_REISERFS, &reiserfs::ReiserProbe),
    (ScanFilter::SKIP_FS, ScanFilter::SKIP_VFAT, &vfat::VfatProbe),
    (ScanFilter::SKIP_FS, ScanFilter::SKIP_HFSPLUS, &hfsplus::HfsPlusProbe),
    (ScanFilter::SKIP_CONT, ScanFilter::SKIP_LUKS, &LuksVolume),
];

/// Identify what `source` holds and commit the facts to `volume`.
///
/// When no filesystem matches, the LVM physical volume label is tried as a
/// last resort. Returns whether anything was recognised.
pub(crate) fn scan_volume(
    ctx: &ScanContext<'_>,
    source: LogicalSource<'_>,
    volume: &mut Volume,
) -> bool {
    for &(category, item, probe) in VOLUME_PROBES {
        if !ctx.allows(category, item) {
            continue;
        }

        if try_probe(probe.name(), source, volume, |s, v| probe.probe(s, v)) {
            return true;
        }
    }

    if ctx.allows(ScanFilter::SKIP_CONT, ScanFilter::SKIP_LVM) {
        return try_probe("lvm2", source, volume, probe_lvm2);
    }

    return false;
}

fn try_probe<F>(name: &str, source: LogicalSource<'_>, volume: &mut Volume, probe: F) -> bool
where
    F: Fn(LogicalSource<'_>, &mut Volume) -> Result<(), ProbeError>,
{
    let mut scratch = volume.clone();

    match probe(source, &mut scratch) {
        Ok(()) => {
            log::debug!("scan_volume: {name} at offset {}", source.offset());
            *volume = scratch;
            return true;
        }
        Err(e) => {
            log_rejection(name, &source, &e);
            return false;
        }
    }
}

/// Record the bytes a filesystem says it uses. A volume with no known
/// capacity takes the filesystem size as its capacity; a size larger than
/// the known capacity is not trusted.
pub(crate) fn set_used_size(volume: &mut Volume, size: u64) {
    if size == 0 {
        return;
    }

    if volume.capacity == 0 {
        volume.capacity = size;
    }

    if size <= volume.capacity {
        volume.size = size;
    } else {
        log::debug!(
            "set_used_size: filesystem claims {size} bytes, capacity is {}",
            volume.capacity
        );
    }
}
