pub mod dos;
pub mod gpt;
pub mod lif;
pub mod mac;

use crate::{
    ProbeError,
    containers::luks::LuksContainer,
    devnode::resolve_device_node,
    engine::{ScanContext, ScanFilter, log_rejection},
    filesystems::scan_volume,
    source::LogicalSource,
    volume::Volume,
};

/// A partitioning scheme that can recognise itself at the start of a device.
pub(crate) trait PartitionMap {
    /// Short identifier, used in the `partitioned:<id>` capability.
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// Recognise the scheme and attach one child record per partition to
    /// `medium`. On error `medium` may be partially filled and must be
    /// discarded by the caller.
    fn probe(
        &self,
        ctx: &ScanContext<'_>,
        source: LogicalSource<'_>,
        medium: &mut Volume,
    ) -> Result<(), ProbeError>;
}

/// Tried in order; GPT goes before DOS because its protective MBR is also a
/// valid DOS table.
pub(crate) const PARTITION_MAPS: &[(ScanFilter, ScanFilter, &dyn PartitionMap)] = &[
    (ScanFilter::SKIP_PT, ScanFilter::SKIP_GPT, &gpt::GptMap),
    (ScanFilter::SKIP_PT, ScanFilter::SKIP_DOS, &dos::DosMap),
    (ScanFilter::SKIP_PT, ScanFilter::SKIP_MAC, &mac::MacMap),
    (ScanFilter::SKIP_PT, ScanFilter::SKIP_LIF, &lif::LifMap),
    (ScanFilter::SKIP_CONT, ScanFilter::SKIP_LUKS, &LuksContainer),
];

/// Run the partition map detectors against `source`. The first one to
/// succeed has its result committed to `medium`.
pub(crate) fn scan_partition_maps(
    ctx: &ScanContext<'_>,
    source: LogicalSource<'_>,
    medium: &mut Volume,
) -> bool {
    for &(category, item, map) in PARTITION_MAPS {
        if !ctx.allows(category, item) {
            log::debug!("scan_partition_maps: {} filtered out", map.name());
            continue;
        }

        let mut scratch = medium.clone();

        match map.probe(ctx, source, &mut scratch) {
            Ok(()) => {
                scratch.add_capability("partitioned", Some("Partitioned disk"));
                scratch.add_capability(
                    &format!("partitioned:{}", map.name()),
                    Some(map.description()),
                );

                log::debug!(
                    "scan_partition_maps: {} found {} partitions",
                    map.name(),
                    scratch.children.len() - medium.children.len()
                );

                *medium = scratch;
                return true;
            }
            Err(e) => log_rejection(map.name(), &source, &e),
        }
    }

    return false;
}

/// Common tail for every emitted partition: find its device node and
/// identify what it contains.
pub(crate) fn scan_partition(
    ctx: &ScanContext<'_>,
    source: LogicalSource<'_>,
    partition: &mut Volume,
) {
    resolve_device_node(ctx, source, partition);
    scan_volume(ctx, source, partition);
}
