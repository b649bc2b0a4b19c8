//! Containers wrap other volumes: LUKS encrypts one, an LVM physical volume
//! pools several.

pub mod luks;
pub mod lvm;
