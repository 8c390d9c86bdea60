use async_trait::async_trait;
use aws_sdk_ecr::types::{ImageFailure, ImageIdentifier};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::GatewayError;
use crate::models::{BatchFailure, BatchOutcome, ImageRecord, ImageRef, LayerInfo, Manifest};
use crate::registry::RegistryGateway;

const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Gateway over AWS Elastic Container Registry.
///
/// The ECR listing carries push time and digest per image, so records
/// come back digest-addressed with their full tag set. Deletion goes
/// through `BatchDeleteImage`, which reports per-image failures inside a
/// successful response.
pub struct EcrGateway {
    client: aws_sdk_ecr::Client,
}

impl EcrGateway {
    /// Build a client from the ambient AWS environment (credentials
    /// chain, AWS_REGION, shared config files).
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self {
            client: aws_sdk_ecr::Client::new(&config),
        }
    }

    fn to_identifier(reference: &ImageRef) -> ImageIdentifier {
        let mut builder = ImageIdentifier::builder();
        if let Some(digest) = &reference.digest {
            builder = builder.image_digest(digest);
        }
        if let Some(tag) = &reference.tag {
            builder = builder.image_tag(tag);
        }
        builder.build()
    }

    fn from_identifier(id: &ImageIdentifier) -> ImageRef {
        ImageRef {
            digest: id.image_digest().map(|s| s.to_string()),
            tag: id.image_tag().map(|s| s.to_string()),
        }
    }

    fn failure_text(failure: &ImageFailure) -> String {
        let code = failure
            .failure_code()
            .map(|c| c.as_str())
            .unwrap_or("unknown");
        match failure.failure_reason() {
            Some(reason) => format!("{code}: {reason}"),
            None => code.to_string(),
        }
    }
}

#[async_trait]
impl RegistryGateway for EcrGateway {
    async fn list_repositories(&self) -> Result<Vec<String>, GatewayError> {
        let mut repos = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            debug!(token = ?next_token, "DescribeRepositories page");
            let mut req = self.client.describe_repositories();
            if let Some(token) = next_token.take() {
                req = req.next_token(token);
            }
            let resp = req.send().await.map_err(aws_sdk_ecr::Error::from)?;

            for repo in resp.repositories() {
                if let Some(name) = repo.repository_name() {
                    repos.push(name.to_string());
                }
            }

            next_token = resp.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }

        Ok(repos)
    }

    async fn list_images(&self, repo: &str) -> Result<Vec<ImageRecord>, GatewayError> {
        let mut records = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            debug!(repo, token = ?next_token, "DescribeImages page");
            let mut req = self.client.describe_images().repository_name(repo);
            if let Some(token) = next_token.take() {
                req = req.next_token(token);
            }
            let resp = req.send().await.map_err(aws_sdk_ecr::Error::from)?;

            for detail in resp.image_details() {
                let mut tags: Vec<String> = detail.image_tags().to_vec();
                tags.sort();

                let reference = match (detail.image_digest(), tags.first()) {
                    (Some(digest), Some(tag)) => ImageRef::by_digest(digest).with_tag(tag),
                    (Some(digest), None) => ImageRef::by_digest(digest),
                    (None, Some(tag)) => ImageRef::by_tag(tag),
                    (None, None) => continue,
                };

                let pushed_at: Option<DateTime<Utc>> = detail
                    .image_pushed_at()
                    .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()));
                let size_bytes = detail.image_size_in_bytes().map(|s| s.max(0) as u64);

                records.push(ImageRecord {
                    reference,
                    tags,
                    pushed_at,
                    size_bytes,
                });
            }

            next_token = resp.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }

        Ok(records)
    }

    /// BatchGetImage for one image, then parse the manifest body it
    /// echoes back. A multi-arch manifest list has no layers and comes
    /// out as `NoLayers`, same as a malformed single manifest.
    async fn image_layers(
        &self,
        repo: &str,
        reference: &ImageRef,
    ) -> Result<Vec<LayerInfo>, GatewayError> {
        let label = format!("{repo}:{}", reference.label());
        debug!(%label, "BatchGetImage");

        let resp = self
            .client
            .batch_get_image()
            .repository_name(repo)
            .image_ids(Self::to_identifier(reference))
            .accepted_media_types(MANIFEST_V2_MEDIA_TYPE)
            .send()
            .await
            .map_err(aws_sdk_ecr::Error::from)?;

        let Some(image) = resp.images().first() else {
            let reason = resp
                .failures()
                .first()
                .map(Self::failure_text)
                .unwrap_or_else(|| "no image returned".to_string());
            return Err(GatewayError::ManifestUnavailable {
                reference: label,
                reason,
            });
        };

        let body = image
            .image_manifest()
            .ok_or_else(|| GatewayError::ManifestUnavailable {
                reference: label.clone(),
                reason: "empty manifest body".to_string(),
            })?;

        let manifest: Manifest =
            serde_json::from_str(body).map_err(|e| GatewayError::Decode {
                context: format!("manifest for {label}"),
                source: e,
            })?;

        let layers = manifest.layer_info();
        if layers.is_empty() {
            return Err(GatewayError::NoLayers { reference: label });
        }
        Ok(layers)
    }

    async fn delete_batch(
        &self,
        repo: &str,
        batch: &[ImageRef],
    ) -> Result<BatchOutcome, GatewayError> {
        debug!(repo, count = batch.len(), "BatchDeleteImage");

        let ids: Vec<ImageIdentifier> = batch.iter().map(Self::to_identifier).collect();
        let resp = self
            .client
            .batch_delete_image()
            .repository_name(repo)
            .set_image_ids(Some(ids))
            .send()
            .await
            .map_err(aws_sdk_ecr::Error::from)?;

        let mut outcome = BatchOutcome::default();
        for id in resp.image_ids() {
            outcome.deleted.push(Self::from_identifier(id));
        }
        for failure in resp.failures() {
            let reference = failure
                .image_id()
                .map(Self::from_identifier)
                .unwrap_or_default();
            outcome.failures.push(BatchFailure {
                reference,
                reason: Self::failure_text(failure),
            });
        }

        Ok(outcome)
    }
}
