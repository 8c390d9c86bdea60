use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Reference to an image as accepted by a registry's delete API.
///
/// The cloud backend identifies images by digest with an optional tag;
/// a bare Registry V2 instance lists tags only and resolves the digest
/// at delete time, so either field may be absent (never both in
/// practice, but `label` tolerates it).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ImageRef {
    pub digest: Option<String>,
    pub tag: Option<String>,
}

impl ImageRef {
    pub fn by_digest(digest: impl Into<String>) -> Self {
        Self {
            digest: Some(digest.into()),
            tag: None,
        }
    }

    pub fn by_tag(tag: impl Into<String>) -> Self {
        Self {
            digest: None,
            tag: Some(tag.into()),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Human-facing name used in report lines: the tag when present,
    /// otherwise the digest, otherwise "untagged".
    pub fn label(&self) -> &str {
        self.tag
            .as_deref()
            .or(self.digest.as_deref())
            .unwrap_or("untagged")
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One image as listed by a registry backend.
///
/// The self-hosted backend lists tags without metadata, so push time and
/// size are optional there; the cloud listing carries both.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub reference: ImageRef,
    pub tags: Vec<String>,
    pub pushed_at: Option<DateTime<Utc>>,
    #[allow(dead_code)]
    pub size_bytes: Option<u64>,
}

/// A content-addressed layer and its stored size. The same digest may
/// appear in many images but occupies storage once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    pub digest: String,
    pub size_bytes: u64,
}

/// Why an image is retained, or that it is not.
///
/// Variant order is rule priority: the classifier returns the first
/// matching rule, and an image takes the minimum category across its
/// tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RetentionCategory {
    KeepPattern,
    Fielded,
    Recent,
    Deletable,
}

/// An image every tag of which classified deletable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionCandidate {
    pub reference: ImageRef,
    /// Report label: lexicographically-first tag, or "untagged".
    pub label: String,
}

/// A deletion candidate with its own (non-deduplicated) layer size.
#[derive(Debug, Clone)]
pub struct SizedCandidate {
    pub candidate: DeletionCandidate,
    pub bytes: u64,
}

/// A deletable image dropped from this run because its layer detail
/// could not be fetched.
#[derive(Debug, Clone)]
pub struct SkippedCandidate {
    pub candidate: DeletionCandidate,
    pub reason: String,
}

/// Classification outcome for one repository. All tag lists are kept
/// sorted so the report comes out byte-identical across runs.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RepoClassification {
    pub repository: String,
    pub keep_pattern: Vec<String>,
    pub fielded: Vec<String>,
    pub recent: Vec<String>,
    pub deletable: Vec<DeletionCandidate>,
    /// Repository-level marker: no tagged images at all.
    pub untagged: bool,
}

impl RepoClassification {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            ..Self::default()
        }
    }

    #[allow(dead_code)]
    pub fn retained_count(&self) -> usize {
        self.keep_pattern.len() + self.fielded.len() + self.recent.len()
    }
}

/// Result of one delete call. The cloud API reports per-image failures
/// inside a successful response, so partial failure is in-band rather
/// than an error.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub deleted: Vec<ImageRef>,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub reference: ImageRef,
    pub reason: String,
}

/// GET /v2/_catalog response
#[derive(Debug, Deserialize)]
pub struct Catalog {
    pub repositories: Vec<String>,
}

/// GET /v2/<repo>/tags/list response
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct TagList {
    pub name: String,
    pub tags: Option<Vec<String>>,
}

/// Image manifest (schema v2). The same document shape comes back from
/// GET /v2/<repo>/manifests/<tag> and from the cloud API's
/// batch-get-image manifest body.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct Manifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub config: Option<ManifestBlobRef>,
    #[serde(default)]
    pub layers: Vec<ManifestBlobRef>,
}

/// A blob reference inside a manifest (config or layer).
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct ManifestBlobRef {
    #[serde(rename = "mediaType")]
    pub media_type: Option<String>,
    pub size: u64,
    pub digest: String,
}

impl Manifest {
    /// Layer list as the engine consumes it. Duplicate digests within a
    /// manifest are preserved here; the accountant counts them once.
    pub fn layer_info(&self) -> Vec<LayerInfo> {
        self.layers
            .iter()
            .map(|l| LayerInfo {
                digest: l.digest.clone(),
                size_bytes: l.size,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_ref_label_prefers_tag() {
        let r = ImageRef::by_digest("sha256:abc").with_tag("v1");
        assert_eq!(r.label(), "v1");
    }

    #[test]
    fn test_image_ref_label_falls_back_to_digest() {
        let r = ImageRef::by_digest("sha256:abc");
        assert_eq!(r.label(), "sha256:abc");
    }

    #[test]
    fn test_image_ref_label_untagged() {
        assert_eq!(ImageRef::default().label(), "untagged");
    }

    #[test]
    fn test_category_priority_order() {
        assert!(RetentionCategory::KeepPattern < RetentionCategory::Fielded);
        assert!(RetentionCategory::Fielded < RetentionCategory::Recent);
        assert!(RetentionCategory::Recent < RetentionCategory::Deletable);
    }

    #[test]
    fn test_manifest_parses_layers() {
        let body = r#"{
            "schemaVersion": 2,
            "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "size": 7023, "digest": "sha256:cfg"},
            "layers": [
                {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 100, "digest": "sha256:l1"},
                {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 200, "digest": "sha256:l2"}
            ]
        }"#;
        let manifest: Manifest = serde_json::from_str(body).unwrap();
        let layers = manifest.layer_info();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].digest, "sha256:l1");
        assert_eq!(layers[1].size_bytes, 200);
    }

    #[test]
    fn test_manifest_without_layers_field() {
        let body = r#"{"schemaVersion": 2}"#;
        let manifest: Manifest = serde_json::from_str(body).unwrap();
        assert!(manifest.layer_info().is_empty());
    }
}
