use async_trait::async_trait;

use crate::error::GatewayError;
use crate::models::{BatchOutcome, ImageRecord, ImageRef, LayerInfo};

mod ecr;
mod v2;

pub use ecr::EcrGateway;
pub use v2::V2Gateway;

/// Capability interface over a container registry.
///
/// Two concrete back-ends exist behind this contract: the cloud-managed
/// ECR registry and a self-hosted Registry V2 instance. Listing calls
/// paginate internally; a page boundary is never visible to callers.
/// `delete_batch` reports per-image failures in-band (`BatchOutcome`)
/// and reserves `Err` for the whole call failing.
#[async_trait]
pub trait RegistryGateway: Send + Sync {
    async fn list_repositories(&self) -> Result<Vec<String>, GatewayError>;

    async fn list_images(&self, repo: &str) -> Result<Vec<ImageRecord>, GatewayError>;

    async fn image_layers(
        &self,
        repo: &str,
        reference: &ImageRef,
    ) -> Result<Vec<LayerInfo>, GatewayError>;

    async fn delete_batch(
        &self,
        repo: &str,
        batch: &[ImageRef],
    ) -> Result<BatchOutcome, GatewayError>;
}
