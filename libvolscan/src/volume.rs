use std::{collections::BTreeMap, path::PathBuf};

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum VolumeKind {
    #[default]
    Disk,
    Volume,
}

/// A capability tag such as `boot`, `encrypted` or `journaled`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Capability {
    pub tag: String,
    pub description: Option<String>,
}

/// One node of the output tree.
///
/// Every field starts empty and is only filled on positive evidence from a
/// detector. Attributes are kept ordered by key so two scans of the same
/// image compare equal.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Volume {
    pub kind: VolumeKind,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub serial: Option<String>,
    /// Bytes available to the volume.
    pub capacity: u64,
    /// Bytes actually used, never larger than `capacity` when both are known.
    pub size: u64,
    /// 1-based ordinal within the parent partition map.
    pub physical_index: Option<u32>,
    pub capabilities: Vec<Capability>,
    pub attributes: BTreeMap<String, String>,
    pub logical_name: Option<PathBuf>,
    pub icon: Option<String>,
    pub children: Vec<Volume>,
}

impl Volume {
    pub fn new(kind: VolumeKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Add a capability. Re-adding an existing tag only fills in a missing
    /// description.
    pub fn add_capability(&mut self, tag: &str, description: Option<&str>) {
        if let Some(existing) = self.capabilities.iter_mut().find(|c| c.tag == tag) {
            if existing.description.is_none() {
                existing.description = description.map(str::to_string);
            }
            return;
        }

        self.capabilities.push(Capability {
            tag: tag.to_string(),
            description: description.map(str::to_string),
        });
    }

    /// Set the description of a capability, if it is present.
    pub fn describe_capability(&mut self, tag: &str, description: &str) {
        if let Some(existing) = self.capabilities.iter_mut().find(|c| c.tag == tag) {
            existing.description = Some(description.to_string());
        }
    }

    pub fn is_capable(&self, tag: &str) -> bool {
        return self.capabilities.iter().any(|c| c.tag == tag);
    }

    pub fn capability(&self, tag: &str) -> Option<&Capability> {
        return self.capabilities.iter().find(|c| c.tag == tag);
    }

    /// Store a scheme specific fact. Empty values are dropped.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }

        self.attributes.insert(key.to_string(), value);
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        return self.attributes.get(key).map(String::as_str);
    }

    pub fn add_child(&mut self, child: Volume) {
        self.children.push(child);
    }

    /// Depth first walk over every record below this one.
    pub fn descendants(&self) -> Vec<&Volume> {
        let mut out = Vec::new();
        for child in &self.children {
            out.push(child);
            out.extend(child.descendants());
        }

        return out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_is_not_duplicated() {
        let mut v = Volume::new(VolumeKind::Volume);
        v.add_capability("boot", None);
        v.add_capability("boot", Some("Contains boot code"));
        v.add_capability("boot", Some("Something else"));

        assert_eq!(v.capabilities.len(), 1);
        assert_eq!(
            v.capability("boot").unwrap().description.as_deref(),
            Some("Contains boot code")
        );
    }

    #[test]
    fn describe_only_touches_present_capabilities() {
        let mut v = Volume::default();
        v.describe_capability("nofs", "No filesystem");
        assert!(!v.is_capable("nofs"));

        v.add_capability("nofs", None);
        v.describe_capability("nofs", "No filesystem");
        assert_eq!(
            v.capability("nofs").unwrap().description.as_deref(),
            Some("No filesystem")
        );
    }

    #[test]
    fn empty_attributes_are_dropped() {
        let mut v = Volume::default();
        v.set_attribute("label", "");
        v.set_attribute("hash", "sha1");

        assert_eq!(v.attribute("label"), None);
        assert_eq!(v.attribute("hash"), Some("sha1"));
    }

    #[test]
    fn descendants_are_depth_first() {
        let mut inner = Volume::new(VolumeKind::Volume);
        inner.physical_index = Some(2);
        let mut outer = Volume::new(VolumeKind::Volume);
        outer.physical_index = Some(1);
        outer.add_child(inner);
        let mut third = Volume::new(VolumeKind::Volume);
        third.physical_index = Some(3);

        let mut disk = Volume::new(VolumeKind::Disk);
        disk.add_child(outer);
        disk.add_child(third);

        let order: Vec<_> = disk.descendants().iter().map(|v| v.physical_index).collect();
        assert_eq!(order, vec![Some(1), Some(2), Some(3)]);
    }
}
