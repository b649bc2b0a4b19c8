use uuid::{Uuid, uuid};

/*
Info from https://en.wikipedia.org/wiki/GUID_Partition_Table#Partition_type_GUIDs
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GptTypeInfo {
    pub guid: Uuid,
    pub description: &'static str,
    pub vendor: Option<&'static str>,
    pub capabilities: &'static [&'static str],
    pub icon: Option<&'static str>,
}

const fn gpt(
    guid: Uuid,
    description: &'static str,
    vendor: Option<&'static str>,
    capabilities: &'static [&'static str],
    icon: Option<&'static str>,
) -> GptTypeInfo {
    GptTypeInfo {
        guid,
        description,
        vendor,
        capabilities,
        icon,
    }
}

const LINUX: Option<&str> = Some("Linux");
const WINDOWS: Option<&str> = Some("Windows");
const MACOS: Option<&str> = Some("Mac OS X");
const FREEBSD: Option<&str> = Some("FreeBSD");
const SOLARIS: Option<&str> = Some("Solaris");
const NETBSD: Option<&str> = Some("NetBSD");
const CHROMEOS: Option<&str> = Some("ChromeOS");
const HPUX: Option<&str> = Some("HP-UX");

/// Searched front to back, the first matching GUID wins.
pub const GPT_PARTITION_TYPES: &[GptTypeInfo] = &[
    gpt(uuid!("024DEE41-33E7-11D3-9D69-0008C781F39F"), "MBR partition scheme", None, &["nofs"], None),
    gpt(uuid!("C12A7328-F81F-11D2-BA4B-00A0C93EC93B"), "System partition", Some("EFI"), &["boot"], None),
    gpt(uuid!("21686148-6449-6E6F-744E-656564454649"), "BIOS Boot partition", None, &["nofs"], None),
    gpt(uuid!("D3BFE2DE-3DAF-11DF-BA40-E3A556D89593"), "Intel Fast Flash (iFFS) partition", None, &[], None),
    gpt(uuid!("F4019732-066E-4E12-8273-346C5641494F"), "Sony boot partition", None, &["boot"], None),
    gpt(uuid!("BFBFAFE7-A34F-448A-9A5B-6213EB736C22"), "Lenovo boot partition", None, &["boot"], None),
    gpt(uuid!("E3C9E316-0B5C-4DB8-817D-F92DF00215AE"), "Microsoft Reserved Partition", WINDOWS, &["nofs"], Some("windows")),
    gpt(uuid!("EBD0A0A2-B9E5-4433-87C0-68B6B72699C7"), "Basic Data Partition", WINDOWS, &[], Some("windows")),
    gpt(uuid!("5808C8AA-7E8F-42E0-85D2-E1E90434CFB3"), "LDM metadata partition", WINDOWS, &[], Some("windows")),
    gpt(uuid!("AF9B60A0-1431-4F62-BC68-3311714A69AD"), "LDM data partition", WINDOWS, &["multi"], Some("windows")),
    gpt(uuid!("DE94BBA4-06D1-4D40-A16A-BFD50179D6AC"), "Windows RE", WINDOWS, &["boot"], Some("windows")),
    gpt(uuid!("37AFFC90-EF7D-4E96-91C3-2D7AE055B174"), "IBM GPFS", None, &[], None),
    gpt(uuid!("75894C1E-3AEB-11D3-B7C1-7B03A0000000"), "Data partition", HPUX, &[], None),
    gpt(uuid!("E2A1E728-32E3-11D6-A682-7B03A0000000"), "Service partition", HPUX, &[], None),
    gpt(uuid!("0FC63DAF-8483-4772-8E79-3D69D8477DE4"), "Data partition", LINUX, &[], Some("linux")),
    gpt(uuid!("44479540-F297-41B2-9AF7-D131D5F0458A"), "Root partition (x86)", LINUX, &[], Some("linux")),
    gpt(uuid!("4F68BCE3-E8CD-4DB1-96E7-FBCAF984B709"), "Root partition (x86-64)", LINUX, &[], Some("linux")),
    gpt(uuid!("B921B045-1DF0-41C3-AF44-4C6F280D3FAE"), "Root partition (ARM64)", LINUX, &[], Some("linux")),
    gpt(uuid!("933AC7E1-2EB4-4F13-B844-0E14E2AEF915"), "Home partition", LINUX, &[], Some("linux")),
    gpt(uuid!("3B8F8425-20E0-4F3B-907F-1A25A76F98E8"), "Server data partition", LINUX, &[], Some("linux")),
    gpt(uuid!("A19D880F-05FC-4D3B-A006-743F0F84911E"), "RAID partition", LINUX, &["multi"], Some("md")),
    gpt(uuid!("0657FD6D-A4AB-43C4-84E5-0933C84B4F4F"), "Swap partition", LINUX, &["nofs"], Some("linux")),
    gpt(uuid!("E6D6D379-F507-44C2-A23C-238F2A3DF928"), "LVM Physical Volume", LINUX, &["multi"], Some("md")),
    gpt(uuid!("CA7D7CCB-63ED-4C53-861C-1742536059CC"), "LUKS partition", LINUX, &["encrypted"], Some("linux")),
    gpt(uuid!("8DA63339-0007-60C0-C436-083AC8230908"), "Reserved", LINUX, &[], Some("linux")),
    gpt(uuid!("BC13C2FF-59E6-4262-A352-B275FD6F7172"), "Extended boot loader partition", LINUX, &["boot"], Some("linux")),
    gpt(uuid!("83BD6B9D-7F41-11DC-BE0B-001560B84F0F"), "Boot partition", FREEBSD, &["boot"], Some("freebsd")),
    gpt(uuid!("516E7CB4-6ECF-11D6-8FF8-00022D09712B"), "Data partition", FREEBSD, &[], Some("freebsd")),
    gpt(uuid!("516E7CB5-6ECF-11D6-8FF8-00022D09712B"), "Swap partition", FREEBSD, &["nofs"], Some("freebsd")),
    gpt(uuid!("516E7CB6-6ECF-11D6-8FF8-00022D09712B"), "UFS partition", FREEBSD, &[], Some("freebsd")),
    gpt(uuid!("516E7CB8-6ECF-11D6-8FF8-00022D09712B"), "Vinum volume manager partition", FREEBSD, &["multi"], Some("freebsd")),
    gpt(uuid!("516E7CBA-6ECF-11D6-8FF8-00022D09712B"), "ZFS partition", FREEBSD, &["multi"], Some("freebsd")),
    gpt(uuid!("48465300-0000-11AA-AA11-00306543ECAC"), "Apple HFS+ partition", MACOS, &[], Some("apple")),
    gpt(uuid!("55465300-0000-11AA-AA11-00306543ECAC"), "Apple UFS partition", MACOS, &[], Some("apple")),
    gpt(uuid!("6A898CC3-1DD2-11B2-99A6-080020736631"), "Apple ZFS partition", MACOS, &["multi"], Some("apple")),
    gpt(uuid!("52414944-0000-11AA-AA11-00306543ECAC"), "Apple RAID partition", MACOS, &["multi"], Some("apple")),
    gpt(uuid!("52414944-5F4F-11AA-AA11-00306543ECAC"), "Apple RAID partition, offline", MACOS, &["multi"], Some("apple")),
    gpt(uuid!("426F6F74-0000-11AA-AA11-00306543ECAC"), "Apple Boot partition", MACOS, &["boot"], Some("apple")),
    gpt(uuid!("4C616265-6C00-11AA-AA11-00306543ECAC"), "Apple Label", MACOS, &[], Some("apple")),
    gpt(uuid!("5265636F-7665-11AA-AA11-00306543ECAC"), "Apple TV Recovery partition", MACOS, &[], Some("apple")),
    gpt(uuid!("53746F72-6167-11AA-AA11-00306543ECAC"), "Apple Core Storage partition", MACOS, &["multi"], Some("apple")),
    gpt(uuid!("7C3457EF-0000-11AA-AA11-00306543ECAC"), "APFS container", MACOS, &["multi"], Some("apple")),
    gpt(uuid!("6A82CB45-1DD2-11B2-99A6-080020736631"), "Boot partition", SOLARIS, &["boot"], Some("solaris")),
    gpt(uuid!("6A85CF4D-1DD2-11B2-99A6-080020736631"), "Root partition", SOLARIS, &[], Some("solaris")),
    gpt(uuid!("6A87C46F-1DD2-11B2-99A6-080020736631"), "Swap partition", SOLARIS, &["nofs"], Some("solaris")),
    gpt(uuid!("6A8B642B-1DD2-11B2-99A6-080020736631"), "Backup partition", SOLARIS, &[], Some("solaris")),
    // Shares its GUID with the Apple ZFS entry above, which wins.
    gpt(uuid!("6A898CC3-1DD2-11B2-99A6-080020736631"), "/usr partition", SOLARIS, &[], Some("solaris")),
    gpt(uuid!("6A8EF2E9-1DD2-11B2-99A6-080020736631"), "/var partition", SOLARIS, &[], Some("solaris")),
    gpt(uuid!("6A90BA39-1DD2-11B2-99A6-080020736631"), "/home partition", SOLARIS, &[], Some("solaris")),
    gpt(uuid!("6A9283A5-1DD2-11B2-99A6-080020736631"), "Alternate sector", SOLARIS, &["nofs"], Some("solaris")),
    gpt(uuid!("6A945A3B-1DD2-11B2-99A6-080020736631"), "Reserved partition", SOLARIS, &[], Some("solaris")),
    gpt(uuid!("49F48D32-B10E-11DC-B99B-0019D1879648"), "Swap partition", NETBSD, &["nofs"], Some("netbsd")),
    gpt(uuid!("49F48D5A-B10E-11DC-B99B-0019D1879648"), "FFS partition", NETBSD, &[], Some("netbsd")),
    gpt(uuid!("49F48D82-B10E-11DC-B99B-0019D1879648"), "LFS partition", NETBSD, &[], Some("netbsd")),
    gpt(uuid!("49F48DAA-B10E-11DC-B99B-0019D1879648"), "RAID partition", NETBSD, &["multi"], Some("netbsd")),
    gpt(uuid!("2DB519C4-B10F-11DC-B99B-0019D1879648"), "Concatenated partition", NETBSD, &["multi"], Some("netbsd")),
    gpt(uuid!("2DB519EC-B10F-11DC-B99B-0019D1879648"), "Encrypted partition", NETBSD, &["encrypted"], Some("netbsd")),
    gpt(uuid!("824CC7A0-36A8-11E3-890A-952519AD3F61"), "Data partition", Some("OpenBSD"), &[], Some("openbsd")),
    gpt(uuid!("FE3A2A5D-4F32-41A7-B725-ACCC3285A309"), "ChromeOS kernel", CHROMEOS, &[], None),
    gpt(uuid!("3CB8E202-3B7E-47DD-8A3C-7FF2A13CFCEC"), "ChromeOS rootfs", CHROMEOS, &[], None),
    gpt(uuid!("2E0A753D-9E48-43B0-8337-B15192CB1B5E"), "ChromeOS future use", CHROMEOS, &[], None),
    gpt(uuid!("42465331-3BA3-10F1-802A-4861696B7521"), "Haiku BFS", Some("Haiku"), &[], None),
    gpt(uuid!("85D5E45E-237C-11E1-B4B3-E89A8F7FC3A7"), "Boot partition", Some("MidnightBSD"), &["boot"], None),
    gpt(uuid!("85D5E45A-237C-11E1-B4B3-E89A8F7FC3A7"), "Data partition", Some("MidnightBSD"), &[], None),
    gpt(uuid!("AA31E02A-400F-11DB-9590-000C2911D1B8"), "VMFS filesystem", Some("VMware"), &[], None),
    gpt(uuid!("9D275380-40AD-11DB-BF97-000C2911D1B8"), "vmkcore crash partition", Some("VMware"), &["nofs"], None),
];

pub fn lookup_gpt_type(guid: &Uuid) -> Option<&'static GptTypeInfo> {
    return GPT_PARTITION_TYPES.iter().find(|info| info.guid == *guid);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efi_system_partition() {
        let info = lookup_gpt_type(&uuid!("C12A7328-F81F-11D2-BA4B-00A0C93EC93B")).unwrap();

        assert_eq!(info.description, "System partition");
        assert_eq!(info.vendor, Some("EFI"));
        assert_eq!(info.capabilities, &["boot"]);
    }

    #[test]
    fn first_match_wins() {
        let info = lookup_gpt_type(&uuid!("6A898CC3-1DD2-11B2-99A6-080020736631")).unwrap();
        assert_eq!(info.vendor, MACOS);
    }

    #[test]
    fn unknown_guid() {
        assert!(lookup_gpt_type(&uuid!("01234567-89AB-CDEF-0123-456789ABCDEF")).is_none());
        assert!(lookup_gpt_type(&Uuid::nil()).is_none());
    }
}
