//! Partition map and filesystem signature detection.
//!
//! Given a raw storage region, `libvolscan` works out how the region is
//! partitioned (DOS/MBR, GPT, Apple partition map, HP-UX LIF or a LUKS
//! container spanning the whole device), then recurses into each partition
//! and identifies the filesystem or container it holds. Results are returned
//! as a tree of [`Volume`] records.
//!
//! The engine is read-only: nothing is ever written to the device.

pub mod checksum;
pub mod containers;
pub mod devnode;
pub mod engine;
pub mod filesystems;
pub mod partitions;
pub mod source;
pub mod types;
pub mod util;
pub mod volume;
pub mod volume_id;


use std::io::Error as IoError;

use thiserror::Error;

pub use crate::{
    engine::{Device, PartitionEngine, ScanFilter, ScanFlags, scan_partitions},
    source::{BlockDevice, LogicalSource},
    volume::{Capability, Volume, VolumeKind},
};

/// Outcome of a single detector that did not recognise its format.
///
/// None of these are fatal. The engine logs them and moves on to the next
/// detector, so an unrecognised medium ends up as an opaque raw volume.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Short read of {length} bytes at offset {offset}")]
    ShortRead { offset: u64, length: u64 },
    #[error("Bad magic: {0}")]
    BadMagic(&'static str),
    #[error("Checksum mismatch: expected {expected:#010x}, got {got:#010x}")]
    ChecksumFailed { expected: u32, got: u32 },
    #[error("Structural inconsistency: {0}")]
    Inconsistent(&'static str),
}

/// Errors that prevent a device from being scanned at all.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("*Nix operation failed: {0}")]
    NixError(#[from] rustix::io::Errno),
    #[error("Device has no logical name to open")]
    MissingLogicalName,
}
