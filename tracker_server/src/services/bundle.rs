//! Artifact bundles: the archive a pipeline's object-store source action
//! deploys, and the image manifest inside it.

use std::io::{Cursor, Read};

use serde::Deserialize;

use crate::error::{Result, TrackerError};
use crate::models::artifact::image_tag;

/// Reject archives that inflate past this size.
const MAX_UNPACKED_SIZE: u64 = 32 * 1024 * 1024;

const MANIFEST_NAMES: &[&str] = &["imagedefinitions.json", "imageDetail.json"];

/// Length of the short commit hash derived from an image tag.
pub const SHORT_SHA_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleManifest {
    pub image_reference: String,
    /// Short commit hash taken from the image tag, when the tag carries one.
    pub commit: Option<String>,
}

#[derive(Deserialize)]
struct ImageDefinition {
    #[serde(rename = "imageUri")]
    image_uri: String,
}

#[derive(Deserialize)]
struct ImageDetail {
    #[serde(rename = "ImageURI")]
    image_uri: String,
}

/// Unpack a bundle (tar.gz, or plain tar) and read its image manifest.
pub fn read_manifest(bytes: &[u8]) -> Result<BundleManifest> {
    let gzipped = bytes.starts_with(&[0x1f, 0x8b]);
    let reader: Box<dyn Read> = if gzipped {
        Box::new(flate2::read::GzDecoder::new(Cursor::new(bytes)))
    } else {
        Box::new(Cursor::new(bytes))
    };
    let mut archive = tar::Archive::new(reader.take(MAX_UNPACKED_SIZE));

    let entries = archive
        .entries()
        .map_err(|e| TrackerError::MalformedBundle(format!("unreadable archive: {e}")))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| TrackerError::MalformedBundle(format!("corrupt archive entry: {e}")))?;
        let is_manifest = entry
            .path()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .is_some_and(|name| MANIFEST_NAMES.contains(&name.as_str()));
        if !is_manifest {
            continue;
        }
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| TrackerError::MalformedBundle(format!("unreadable manifest: {e}")))?;
        let image_reference = parse_manifest(&content)?;
        let commit = commit_from_tag(&image_reference);
        return Ok(BundleManifest {
            image_reference,
            commit,
        });
    }

    Err(TrackerError::MalformedBundle(
        "no image manifest in archive".to_string(),
    ))
}

/// First image reference listed by either manifest shape.
pub fn parse_manifest(content: &str) -> Result<String> {
    let reference = serde_json::from_str::<Vec<ImageDefinition>>(content)
        .ok()
        .and_then(|defs| defs.into_iter().map(|d| d.image_uri).find(|u| !u.trim().is_empty()))
        .or_else(|| {
            serde_json::from_str::<ImageDetail>(content)
                .ok()
                .map(|d| d.image_uri)
                .filter(|u| !u.trim().is_empty())
        });
    reference
        .map(|r| r.trim().to_string())
        .ok_or_else(|| TrackerError::MalformedBundle("manifest lists no image".to_string()))
}

/// Short commit hash from an image tag: the last `-` segment must hold at
/// least seven hex characters.
pub fn commit_from_tag(image_reference: &str) -> Option<String> {
    let tag = image_tag(image_reference)?;
    let candidate = tag.rsplit('-').next().unwrap_or(tag);
    if candidate.len() < SHORT_SHA_LEN || !candidate.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(candidate[..SHORT_SHA_LEN].to_ascii_lowercase())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// Build a tar.gz holding `files`.
    pub(crate) fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
        }
        let tar_bytes = builder.into_inner().unwrap();
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn manifest_tag_becomes_short_commit() {
        let bundle = tar_gz(&[
            ("appspec.yaml", "version: 0.0"),
            (
                "build/imagedefinitions.json",
                r#"[{"name":"app","imageUri":"registry/app:abcdef12"}]"#,
            ),
        ]);
        let manifest = read_manifest(&bundle).unwrap();
        assert_eq!(manifest.image_reference, "registry/app:abcdef12");
        assert_eq!(manifest.commit.as_deref(), Some("abcdef1"));
    }

    #[test]
    fn image_detail_manifest_is_accepted() {
        let bundle = tar_gz(&[(
            "imageDetail.json",
            r#"{"ImageURI":"123.dkr.ecr.us-east-1.amazonaws.com/web:release-0a1b2c3d4e"}"#,
        )]);
        let manifest = read_manifest(&bundle).unwrap();
        assert_eq!(manifest.commit.as_deref(), Some("0a1b2c3"));
    }

    #[test]
    fn non_hex_tags_resolve_no_commit() {
        assert_eq!(commit_from_tag("registry/app:latest"), None);
        assert_eq!(commit_from_tag("registry/app:v1.2.3"), None);
        assert_eq!(commit_from_tag("registry/app"), None);
        assert_eq!(commit_from_tag("registry/app:abc12"), None);
    }

    #[test]
    fn malformed_bundles_are_reported() {
        assert!(matches!(
            read_manifest(b"definitely not an archive"),
            Err(TrackerError::MalformedBundle(_))
        ));
        let bundle = tar_gz(&[("imagedefinitions.json", "{not json")]);
        assert!(matches!(read_manifest(&bundle), Err(TrackerError::MalformedBundle(_))));
        let bundle = tar_gz(&[("README.md", "hello")]);
        assert!(matches!(read_manifest(&bundle), Err(TrackerError::MalformedBundle(_))));
    }
}
