use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, LINK};
use reqwest::Client;
use tracing::debug;

use crate::error::GatewayError;
use crate::models::{
    BatchFailure, BatchOutcome, Catalog, ImageRecord, ImageRef, LayerInfo, Manifest, TagList,
};
use crate::registry::RegistryGateway;

const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Gateway over a self-hosted Docker Registry HTTP API V2 instance.
///
/// The V2 listing is tag-driven: one `ImageRecord` per tag, no push time
/// or size. Deletion resolves each tag to its manifest digest first and
/// deletes each distinct digest once, so tags sharing a manifest all
/// count as deleted, whichever batch they land in.
pub struct V2Gateway {
    client: Client,
    base_url: String,
}

impl V2Gateway {
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
        }
    }

    /// HEAD /v2/<repo>/manifests/<tag>, reading Docker-Content-Digest
    async fn resolve_digest(&self, repo: &str, tag: &str) -> Result<String, GatewayError> {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, repo, tag);
        debug!(%url, "HEAD manifest");
        let resp = self
            .client
            .head(&url)
            .header(ACCEPT, MANIFEST_V2_MEDIA_TYPE)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                context: format!("HEAD manifest for {repo}:{tag}"),
                status,
            });
        }

        resp.headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| GatewayError::MissingDigest {
                reference: format!("{repo}:{tag}"),
            })
    }

    /// GET /v2/<repo>/manifests/<reference>, parsed as manifest JSON
    async fn fetch_manifest(&self, repo: &str, reference: &str) -> Result<Manifest, GatewayError> {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, repo, reference);
        debug!(%url, "GET manifest");
        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, MANIFEST_V2_MEDIA_TYPE)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                context: format!("GET manifest for {repo}:{reference}"),
                status,
            });
        }

        Ok(resp.json().await?)
    }

    /// DELETE /v2/<repo>/manifests/<digest>. A 404 means the manifest is
    /// already gone, which is the state we wanted; repeated runs stay
    /// idempotent.
    async fn delete_manifest(&self, repo: &str, digest: &str) -> Result<(), GatewayError> {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, repo, digest);
        debug!(%url, "DELETE manifest");
        let resp = self
            .client
            .delete(&url)
            .header(ACCEPT, MANIFEST_V2_MEDIA_TYPE)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(GatewayError::Status {
                context: format!("DELETE manifest {digest} for {repo}"),
                status,
            })
        }
    }

    /// File one reference's digest resolution into the batch outcome.
    ///
    /// A 404 counts as deleted: when two tags share a manifest and land in
    /// different batches, the first batch removes the digest and the second
    /// finds it already gone, which is the state a delete wants.
    fn note_resolution(
        resolved: &mut HashMap<usize, String>,
        outcome: &mut BatchOutcome,
        idx: usize,
        reference: &ImageRef,
        resolution: Result<String, GatewayError>,
    ) {
        match resolution {
            Ok(digest) => {
                resolved.insert(idx, digest);
            }
            Err(GatewayError::Status { status, .. })
                if status == reqwest::StatusCode::NOT_FOUND =>
            {
                outcome.deleted.push(reference.clone());
            }
            Err(e) => outcome.failures.push(BatchFailure {
                reference: reference.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Parse the Link header for pagination (next URL)
    fn parse_next_link(resp: &reqwest::Response) -> Option<String> {
        let link = resp.headers().get(LINK)?.to_str().ok()?;
        // Link: </v2/_catalog?n=100&last=xxx>; rel="next"
        if link.contains("rel=\"next\"") {
            let start = link.find('<')? + 1;
            let end = link.find('>')?;
            Some(link[start..end].to_string())
        } else {
            None
        }
    }

    /// Resolve a relative URL path against the base URL
    fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl RegistryGateway for V2Gateway {
    /// GET /v2/_catalog with pagination
    async fn list_repositories(&self) -> Result<Vec<String>, GatewayError> {
        let mut repos = Vec::new();
        let mut url = format!("{}/v2/_catalog", self.base_url);

        loop {
            debug!(%url, "GET catalog page");
            let resp = self.client.get(&url).send().await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(GatewayError::Status {
                    context: "GET catalog".to_string(),
                    status,
                });
            }

            let next_link = Self::parse_next_link(&resp);
            let catalog: Catalog = resp.json().await?;
            repos.extend(catalog.repositories);

            match next_link {
                Some(next) => url = self.resolve_url(&next),
                None => break,
            }
        }

        Ok(repos)
    }

    /// GET /v2/<repo>/tags/list with pagination, one record per tag
    async fn list_images(&self, repo: &str) -> Result<Vec<ImageRecord>, GatewayError> {
        let mut records = Vec::new();
        let mut url = format!("{}/v2/{}/tags/list", self.base_url, repo);

        loop {
            debug!(%url, "GET tags page");
            let resp = self.client.get(&url).send().await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(GatewayError::Status {
                    context: format!("GET tags for {repo}"),
                    status,
                });
            }

            let next_link = Self::parse_next_link(&resp);
            let tag_list: TagList = resp.json().await?;

            if let Some(tags) = tag_list.tags {
                for tag in tags {
                    records.push(ImageRecord {
                        reference: ImageRef::by_tag(&tag),
                        tags: vec![tag],
                        pushed_at: None,
                        size_bytes: None,
                    });
                }
            }

            match next_link {
                Some(next) => url = self.resolve_url(&next),
                None => break,
            }
        }

        Ok(records)
    }

    async fn image_layers(
        &self,
        repo: &str,
        reference: &ImageRef,
    ) -> Result<Vec<LayerInfo>, GatewayError> {
        let manifest_ref = reference
            .digest
            .as_deref()
            .or(reference.tag.as_deref())
            .ok_or_else(|| GatewayError::MissingDigest {
                reference: format!("{repo}:untagged"),
            })?;
        let manifest = self.fetch_manifest(repo, manifest_ref).await?;
        let layers = manifest.layer_info();
        if layers.is_empty() {
            return Err(GatewayError::NoLayers {
                reference: format!("{repo}:{}", reference.label()),
            });
        }
        Ok(layers)
    }

    /// Resolve every reference to its digest, then delete each distinct
    /// digest once. References whose digest was deleted in this call count
    /// as deleted, as does a reference whose manifest is already gone;
    /// other resolution or delete errors become per-image failures rather
    /// than failing the batch.
    async fn delete_batch(
        &self,
        repo: &str,
        batch: &[ImageRef],
    ) -> Result<BatchOutcome, GatewayError> {
        let mut outcome = BatchOutcome::default();

        // Phase 1: resolve tags to digests.
        let mut resolved: HashMap<usize, String> = HashMap::new();
        for (idx, reference) in batch.iter().enumerate() {
            let resolution = match (&reference.digest, &reference.tag) {
                (Some(digest), _) => Ok(digest.clone()),
                (None, Some(tag)) => self.resolve_digest(repo, tag).await,
                (None, None) => Err(GatewayError::MissingDigest {
                    reference: format!("{repo}:untagged"),
                }),
            };
            Self::note_resolution(&mut resolved, &mut outcome, idx, reference, resolution);
        }

        // Phase 2: one DELETE per distinct digest.
        let mut deleted_digests: HashSet<String> = HashSet::new();
        let mut failed_digests: HashMap<String, String> = HashMap::new();
        for digest in resolved.values() {
            if deleted_digests.contains(digest) || failed_digests.contains_key(digest) {
                continue;
            }
            match self.delete_manifest(repo, digest).await {
                Ok(()) => {
                    deleted_digests.insert(digest.clone());
                }
                Err(e) => {
                    failed_digests.insert(digest.clone(), e.to_string());
                }
            }
        }

        // Phase 3: map digest outcomes back onto the references.
        for (idx, reference) in batch.iter().enumerate() {
            let Some(digest) = resolved.get(&idx) else {
                continue;
            };
            if deleted_digests.contains(digest) {
                outcome.deleted.push(reference.clone());
            } else if let Some(reason) = failed_digests.get(digest) {
                outcome.failures.push(BatchFailure {
                    reference: reference.clone(),
                    reason: reason.clone(),
                });
            }
        }

        Ok(outcome)
    }
}
