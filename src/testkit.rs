//! In-memory gateway and oracle fakes for pipeline tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{FleetError, GatewayError};
use crate::fleet::FleetOracle;
use crate::models::{BatchFailure, BatchOutcome, ImageRecord, ImageRef, LayerInfo};
use crate::registry::RegistryGateway;

fn ref_key(reference: &ImageRef) -> String {
    reference.label().to_string()
}

fn fake_error(context: &str) -> GatewayError {
    GatewayError::Status {
        context: context.to_string(),
        status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Scripted registry. Repositories, images, and layers are set up with
/// the builder methods; failure switches make individual calls break.
/// Every delete call is logged so tests can assert batch shapes and
/// dry-run silence.
#[derive(Default)]
pub struct FakeRegistry {
    repos: Vec<String>,
    images: HashMap<String, Vec<ImageRecord>>,
    layers: HashMap<(String, String), Vec<LayerInfo>>,
    broken_catalog: bool,
    broken_listings: HashSet<String>,
    broken_layers: HashSet<(String, String)>,
    broken_deletes: HashSet<String>,
    poisoned_refs: HashSet<(String, String)>,
    rejected_refs: HashSet<(String, String)>,
    ignored_refs: HashSet<(String, String)>,
    delete_calls: Mutex<Vec<(String, Vec<ImageRef>)>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(mut self, repo: &str) -> Self {
        if !self.repos.iter().any(|r| r == repo) {
            self.repos.push(repo.to_string());
        }
        self
    }

    pub fn with_image(mut self, repo: &str, record: ImageRecord) -> Self {
        self = self.with_repo(repo);
        self.images.entry(repo.to_string()).or_default().push(record);
        self
    }

    /// Layers served for the image keyed by its tag (or digest when
    /// untagged), matching `ImageRef::label`.
    pub fn with_layers(mut self, repo: &str, key: &str, layers: &[(&str, u64)]) -> Self {
        let layers = layers
            .iter()
            .map(|(digest, size_bytes)| LayerInfo {
                digest: digest.to_string(),
                size_bytes: *size_bytes,
            })
            .collect();
        self.layers.insert((repo.to_string(), key.to_string()), layers);
        self
    }

    pub fn fail_catalog(mut self) -> Self {
        self.broken_catalog = true;
        self
    }

    pub fn fail_listing(mut self, repo: &str) -> Self {
        self.broken_listings.insert(repo.to_string());
        self
    }

    pub fn fail_layers(mut self, repo: &str, key: &str) -> Self {
        self.broken_layers
            .insert((repo.to_string(), key.to_string()));
        self
    }

    /// Every delete call for this repository errors out.
    pub fn fail_delete(mut self, repo: &str) -> Self {
        self.broken_deletes.insert(repo.to_string());
        self
    }

    /// Any delete call whose batch contains this image errors wholesale.
    pub fn poison_delete(mut self, repo: &str, key: &str) -> Self {
        self.poisoned_refs
            .insert((repo.to_string(), key.to_string()));
        self
    }

    /// One image is rejected inside an otherwise successful delete call.
    pub fn reject_delete(mut self, repo: &str, key: &str) -> Self {
        self.rejected_refs
            .insert((repo.to_string(), key.to_string()));
        self
    }

    /// One image goes unmentioned in the delete response, neither
    /// confirmed nor failed.
    pub fn ignore_delete(mut self, repo: &str, key: &str) -> Self {
        self.ignored_refs
            .insert((repo.to_string(), key.to_string()));
        self
    }

    pub fn deletions(&self) -> Vec<(String, Vec<ImageRef>)> {
        self.delete_calls.lock().unwrap().clone()
    }

    pub fn delete_call_count(&self) -> usize {
        self.delete_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RegistryGateway for FakeRegistry {
    async fn list_repositories(&self) -> Result<Vec<String>, GatewayError> {
        if self.broken_catalog {
            return Err(fake_error("catalog"));
        }
        Ok(self.repos.clone())
    }

    async fn list_images(&self, repo: &str) -> Result<Vec<ImageRecord>, GatewayError> {
        if self.broken_listings.contains(repo) {
            return Err(fake_error("listing"));
        }
        Ok(self.images.get(repo).cloned().unwrap_or_default())
    }

    async fn image_layers(
        &self,
        repo: &str,
        reference: &ImageRef,
    ) -> Result<Vec<LayerInfo>, GatewayError> {
        let key = (repo.to_string(), ref_key(reference));
        if self.broken_layers.contains(&key) {
            return Err(fake_error("layer detail"));
        }
        self.layers
            .get(&key)
            .cloned()
            .ok_or_else(|| GatewayError::NoLayers {
                reference: format!("{repo}:{}", reference.label()),
            })
    }

    async fn delete_batch(
        &self,
        repo: &str,
        batch: &[ImageRef],
    ) -> Result<BatchOutcome, GatewayError> {
        // Attempts are logged even when the call fails.
        self.delete_calls
            .lock()
            .unwrap()
            .push((repo.to_string(), batch.to_vec()));

        if self.broken_deletes.contains(repo) {
            return Err(fake_error("delete"));
        }
        if batch
            .iter()
            .any(|r| self.poisoned_refs.contains(&(repo.to_string(), ref_key(r))))
        {
            return Err(fake_error("delete"));
        }

        let mut outcome = BatchOutcome::default();
        for reference in batch {
            let key = (repo.to_string(), ref_key(reference));
            if self.rejected_refs.contains(&key) {
                outcome.failures.push(BatchFailure {
                    reference: reference.clone(),
                    reason: "simulated rejection".to_string(),
                });
            } else if !self.ignored_refs.contains(&key) {
                outcome.deleted.push(reference.clone());
            }
        }
        Ok(outcome)
    }
}

/// Fixed deployed-version set, or a scripted fatal failure.
pub struct FakeFleet {
    versions: BTreeSet<String>,
    broken: bool,
}

impl FakeFleet {
    pub fn with_versions(versions: &[&str]) -> Self {
        Self {
            versions: versions.iter().map(|v| v.to_string()).collect(),
            broken: false,
        }
    }

    pub fn broken() -> Self {
        Self {
            versions: BTreeSet::new(),
            broken: true,
        }
    }
}

#[async_trait]
impl FleetOracle for FakeFleet {
    async fn deployed_versions(&self) -> Result<BTreeSet<String>, FleetError> {
        if self.broken {
            return Err(FleetError::Missing("RDSHOST"));
        }
        Ok(self.versions.clone())
    }
}
