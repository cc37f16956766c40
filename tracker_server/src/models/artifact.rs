//! Artifact descriptors: the fingerprint of a build's output.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Content hashes reported by the build service.
    #[serde(default)]
    pub hashes: Vec<String>,
    pub location: Option<String>,
    /// Constructed image reference, `registry/name:tag`.
    pub image_reference: Option<String>,
}

impl ArtifactDescriptor {
    pub fn tag(&self) -> Option<&str> {
        self.image_reference.as_deref().and_then(image_tag)
    }
}

/// Tag portion of an image reference. A `:` that belongs to a registry port
/// (i.e. is followed by a `/`) is not a tag separator.
pub fn image_tag(reference: &str) -> Option<&str> {
    let reference = reference.split('@').next().unwrap_or(reference);
    let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    let (_, tag) = reference[name_start..].rsplit_once(':')?;
    let tag = tag.trim();
    (!tag.is_empty()).then_some(tag)
}
