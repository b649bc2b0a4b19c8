/*
Info from https://en.wikipedia.org/wiki/Partition_type
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbrPartitionType(u8);

impl MbrPartitionType {
    pub const MBR_EMPTY_PARTITION: Self = Self(0x00);
    pub const MBR_DOS_EXTENDED_PARTITION: Self = Self(0x05);
    pub const MBR_W95_EXTENDED_PARTITION: Self = Self(0x0f);
    pub const MBR_LINUX_DATA_PARTITION: Self = Self(0x83);
    pub const MBR_LINUX_EXTENDED_PARTITION: Self = Self(0x85);
    pub const MBR_GPT_PARTITION: Self = Self(0xee);
    pub const MBR_EFI_SYSTEM_PARTITION: Self = Self(0xef);

    pub const fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub const fn as_byte(&self) -> u8 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::MBR_EMPTY_PARTITION
    }

    /// Types whose range holds a chain of extended boot records.
    pub fn is_extended(&self) -> bool {
        matches!(
            *self,
            Self::MBR_DOS_EXTENDED_PARTITION
                | Self::MBR_W95_EXTENDED_PARTITION
                | Self::MBR_LINUX_EXTENDED_PARTITION
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosTypeInfo {
    pub code: u8,
    pub description: &'static str,
    pub capabilities: &'static [&'static str],
    pub icon: Option<&'static str>,
}

const fn dos(
    code: u8,
    description: &'static str,
    capabilities: &'static [&'static str],
    icon: Option<&'static str>,
) -> DosTypeInfo {
    DosTypeInfo {
        code,
        description,
        capabilities,
        icon,
    }
}

pub const DOS_PARTITION_TYPES: &[DosTypeInfo] = &[
    dos(0x00, "Empty", &["empty"], None),
    dos(0x01, "FAT12", &["fat"], None),
    dos(0x02, "XENIX root", &[], None),
    dos(0x03, "XENIX usr", &[], None),
    dos(0x04, "FAT16 <32M", &["fat"], None),
    dos(0x05, "Extended", &["multi"], None),
    dos(0x06, "FAT16", &["fat"], None),
    dos(0x07, "HPFS/NTFS", &["ntfs"], None),
    dos(0x08, "AIX", &[], None),
    dos(0x09, "AIX bootable", &["boot"], None),
    dos(0x0a, "OS/2 Boot Manager", &["boot"], None),
    dos(0x0b, "W95 FAT32", &["fat"], None),
    dos(0x0c, "W95 FAT32 (LBA)", &["fat"], None),
    dos(0x0e, "W95 FAT16 (LBA)", &["fat"], None),
    dos(0x0f, "W95 Ext'd (LBA)", &["multi"], None),
    dos(0x10, "OPUS", &[], None),
    dos(0x11, "Hidden FAT12", &["hidden", "fat"], None),
    dos(0x12, "Compaq diagnostics", &["boot"], None),
    dos(0x14, "Hidden FAT16 <32M", &["hidden", "fat"], None),
    dos(0x16, "Hidden FAT16", &["hidden", "fat"], None),
    dos(0x17, "Hidden HPFS/NTFS", &["hidden", "ntfs"], None),
    dos(0x18, "AST SmartSleep", &["nofs"], None),
    dos(0x1b, "Hidden W95 FAT32", &["hidden", "fat"], None),
    dos(0x1c, "Hidden W95 FAT32 (LBA)", &["hidden", "fat"], None),
    dos(0x1e, "Hidden W95 FAT16 (LBA)", &["hidden", "fat"], None),
    dos(0x24, "NEC DOS", &[], None),
    dos(0x27, "Windows recovery environment", &["hidden", "ntfs"], None),
    dos(0x39, "Plan 9", &[], None),
    dos(0x3c, "PartitionMagic recovery", &["nofs"], None),
    dos(0x40, "Venix 80286", &[], None),
    dos(0x41, "PPC PReP Boot", &["boot"], None),
    dos(0x42, "SFS", &[], None),
    dos(0x4d, "QNX4.x", &[], None),
    dos(0x4e, "QNX4.x 2nd part", &[], None),
    dos(0x4f, "QNX4.x 3rd part", &[], None),
    dos(0x50, "OnTrack DM", &[], None),
    dos(0x51, "OnTrack DM6 Aux1", &[], None),
    dos(0x52, "CP/M", &[], None),
    dos(0x53, "OnTrack DM6 Aux3", &[], None),
    dos(0x54, "OnTrackDM6", &[], None),
    dos(0x55, "EZ-Drive", &[], None),
    dos(0x56, "Golden Bow", &[], None),
    dos(0x5c, "Priam Edisk", &[], None),
    dos(0x61, "SpeedStor", &[], None),
    dos(0x63, "GNU HURD or SysV", &[], None),
    dos(0x64, "Novell Netware 286", &[], None),
    dos(0x65, "Novell Netware 386", &[], None),
    dos(0x70, "DiskSecure Multi-Boot", &["boot"], None),
    dos(0x75, "PC/IX", &[], None),
    dos(0x80, "Old Minix", &[], None),
    dos(0x81, "Minix / old Linux", &[], None),
    dos(0x82, "Linux swap / Solaris", &["nofs"], None),
    dos(0x83, "Linux filesystem", &[], Some("linux")),
    dos(0x84, "OS/2 hidden C: drive", &["hidden"], None),
    dos(0x85, "Linux extended", &["multi"], None),
    dos(0x86, "NTFS volume set", &["multi"], None),
    dos(0x87, "NTFS volume set", &["multi"], None),
    dos(0x88, "Linux plaintext", &[], None),
    dos(0x8e, "Linux LVM Physical Volume", &["multi"], Some("md")),
    dos(0x93, "Amoeba", &[], None),
    dos(0x94, "Amoeba BBT", &[], None),
    dos(0x9f, "BSD/OS", &[], None),
    dos(0xa0, "IBM Thinkpad hibernation", &["nofs"], None),
    dos(0xa5, "FreeBSD", &["multi"], Some("freebsd")),
    dos(0xa6, "OpenBSD", &["multi"], Some("openbsd")),
    dos(0xa7, "NeXTSTEP", &[], None),
    dos(0xa8, "Darwin UFS", &[], None),
    dos(0xa9, "NetBSD", &["multi"], Some("netbsd")),
    dos(0xab, "Darwin boot", &["boot"], None),
    dos(0xaf, "HFS / HFS+", &[], None),
    dos(0xb7, "BSDI fs", &[], None),
    dos(0xb8, "BSDI swap", &["nofs"], None),
    dos(0xbb, "Boot Wizard hidden", &["hidden"], None),
    dos(0xbc, "Acronis FAT32 LBA", &["hidden", "fat"], None),
    dos(0xbe, "Solaris boot", &["boot"], None),
    dos(0xbf, "Solaris", &[], Some("solaris")),
    dos(0xc1, "DRDOS/sec (FAT-12)", &["fat"], None),
    dos(0xc4, "DRDOS/sec (FAT-16 < 32M)", &["fat"], None),
    dos(0xc6, "DRDOS/sec (FAT-16)", &["fat"], None),
    dos(0xc7, "Syrinx", &[], None),
    dos(0xda, "Non-FS data", &["nofs"], None),
    dos(0xdb, "CP/M / CTOS / ...", &[], None),
    dos(0xde, "Dell Utility", &[], None),
    dos(0xdf, "BootIt", &["boot"], None),
    dos(0xe1, "DOS access", &[], None),
    dos(0xe3, "DOS R/O", &[], None),
    dos(0xe4, "SpeedStor", &[], None),
    dos(0xea, "Rufus alignment", &["nofs"], None),
    dos(0xeb, "BeOS fs", &[], None),
    dos(0xee, "EFI GPT", &["nofs"], None),
    dos(0xef, "EFI (FAT-12/16/32)", &["boot"], None),
    dos(0xf0, "Linux/PA-RISC boot", &["boot"], None),
    dos(0xf1, "SpeedStor", &[], None),
    dos(0xf2, "DOS secondary", &[], None),
    dos(0xf4, "SpeedStor", &[], None),
    dos(0xf8, "EBBR protective", &["nofs"], None),
    dos(0xfb, "VMware VMFS", &[], None),
    dos(0xfc, "VMware VMKCORE", &["nofs"], None),
    dos(0xfd, "Linux raid autodetect", &["multi"], Some("md")),
    dos(0xfe, "LANstep", &[], None),
    dos(0xff, "BBT", &[], None),
];

pub fn lookup_dos_type(code: u8) -> Option<&'static DosTypeInfo> {
    return DOS_PARTITION_TYPES.iter().find(|info| info.code == code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_types() {
        for code in [0x05, 0x0f, 0x85] {
            assert!(MbrPartitionType::from_byte(code).is_extended());
        }
        assert!(!MbrPartitionType::MBR_LINUX_DATA_PARTITION.is_extended());
        assert!(MbrPartitionType::from_byte(0).is_empty());
    }

    #[test]
    fn lookup_known_and_unknown() {
        let linux = lookup_dos_type(0x83).unwrap();
        assert_eq!(linux.description, "Linux filesystem");

        let efi = lookup_dos_type(MbrPartitionType::MBR_EFI_SYSTEM_PARTITION.as_byte()).unwrap();
        assert_eq!(efi.capabilities, &["boot"]);

        assert!(lookup_dos_type(0x2a).is_none());
    }

    #[test]
    fn table_has_no_duplicate_codes() {
        for (i, a) in DOS_PARTITION_TYPES.iter().enumerate() {
            assert!(DOS_PARTITION_TYPES[i + 1..].iter().all(|b| b.code != a.code));
        }
    }
}
