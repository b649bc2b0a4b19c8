//! Static lookup tables mapping partition type codes to descriptions.

pub mod dos;
pub mod gpt;

/// Capability descriptions shared by partition records.
pub(crate) const CAPABILITY_DESCRIPTIONS: &[(&str, &str)] = &[
    ("nofs", "No filesystem"),
    ("boot", "Contains boot code"),
    ("multi", "Multi-volumes"),
    ("hidden", "Hidden partition"),
    ("encrypted", "Contains encrypted data"),
    ("precious", "This partition is required for the platform to function"),
    ("readonly", "Read-only"),
    ("nomount", "No automatic mount"),
];

/// Fill in the description of every shared capability present on `volume`.
pub(crate) fn describe_capabilities(volume: &mut crate::Volume) {
    for (tag, description) in CAPABILITY_DESCRIPTIONS {
        volume.describe_capability(tag, description);
    }
}
