use std::{
    fs::File,
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
};

use glob::{Pattern, glob};

use crate::{
    engine::{ScanContext, ScanFlags},
    source::LogicalSource,
    volume::Volume,
};

const COMPARE_SIZE: u64 = 512;

/// Partition number encoded in a sibling node name, e.g. `1` for `sda1`
/// or `nvme0n1p1`.
fn partition_number(disk: &Path, candidate: &Path) -> Option<u32> {
    let disk = disk.file_name()?.to_str()?;
    let name = candidate.file_name()?.to_str()?;

    let suffix = name.strip_prefix(disk)?;
    let digits = suffix.strip_prefix('p').unwrap_or(suffix);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    return digits.parse().ok();
}

/// List the numbered sibling nodes of `disk` (`<disk>N` and `<disk>pN`).
///
/// The node numbered `preferred` comes first, the others follow in
/// ascending numeric order.
pub fn sibling_nodes(disk: &Path, preferred: Option<u32>) -> Vec<PathBuf> {
    let Some(disk_str) = disk.to_str() else {
        log::debug!("sibling_nodes: {disk:?} is not valid UTF-8");
        return Vec::new();
    };

    let pattern = format!("{}*", Pattern::escape(disk_str));

    let entries = match glob(&pattern) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("sibling_nodes: bad pattern {pattern:?}: {e}");
            return Vec::new();
        }
    };

    let mut nodes: Vec<(u32, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|path| Some((partition_number(disk, &path)?, path)))
        .collect();

    nodes.sort_by_key(|(number, _)| (Some(*number) != preferred, *number));

    return nodes.into_iter().map(|(_, path)| path).collect();
}

fn node_matches(path: &Path, expected: &[u8]) -> bool {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            log::debug!("node_matches: cannot open {path:?}: {e}");
            return false;
        }
    };

    let mut buffer = vec![0u8; expected.len()];
    if let Err(e) = file.read_exact_at(&mut buffer, 0) {
        log::debug!("node_matches: cannot read {path:?}: {e}");
        return false;
    }

    return buffer == expected;
}

/// Find the kernel device node holding the partition behind `source` by
/// comparing first blocks, and record it as the volume's logical name.
pub(crate) fn resolve_device_node(
    ctx: &ScanContext<'_>,
    source: LogicalSource<'_>,
    volume: &mut Volume,
) -> bool {
    if ctx.flags.contains(ScanFlags::NO_NODE_RESOLUTION) {
        return false;
    }

    let Some(disk) = ctx.disk else {
        return false;
    };

    let expected = match source.with_block_size(COMPARE_SIZE).read_block(0) {
        Ok(block) => block,
        Err(e) => {
            log::debug!("resolve_device_node: partition at {} unreadable: {e}", source.offset());
            return false;
        }
    };

    for node in sibling_nodes(disk, volume.physical_index) {
        if node_matches(&node, &expected) {
            log::debug!("resolve_device_node: offset {} is {node:?}", source.offset());
            volume.logical_name = Some(node);
            return true;
        }
    }

    log::trace!("resolve_device_node: no node for offset {}", source.offset());

    return false;
}
