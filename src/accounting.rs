use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::models::{DeletionCandidate, LayerInfo, SizedCandidate, SkippedCandidate};
use crate::registry::RegistryGateway;

const DETAIL_FETCH_CONCURRENCY: usize = 8;

/// Run-scoped layer accounting.
///
/// One ledger lives for the whole run: layers are shared across images
/// and across repositories, and a shared layer frees its bytes only
/// once no matter how many deleted images referenced it.
#[derive(Debug, Default)]
pub struct LayerLedger {
    seen: HashMap<String, u64>,
    total: u64,
}

impl LayerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one image's layers. Returns the bytes newly added to the
    /// deduplicated total; digests already seen this run add nothing.
    pub fn absorb(&mut self, layers: &[LayerInfo]) -> u64 {
        let mut added = 0;
        for layer in layers {
            if !self.seen.contains_key(&layer.digest) {
                self.seen.insert(layer.digest.clone(), layer.size_bytes);
                added += layer.size_bytes;
            }
        }
        self.total += added;
        added
    }

    /// Deduplicated reclaimable bytes across every absorbed image.
    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    #[allow(dead_code)]
    pub fn unique_layers(&self) -> usize {
        self.seen.len()
    }
}

/// One image's own size: the sum of its distinct layer sizes. A digest
/// repeated inside a single manifest is stored once and counts once.
/// This is deliberately not deduplicated against other images, so the
/// per-image sizes in a report may sum to more than the ledger total.
pub fn image_bytes(layers: &[LayerInfo]) -> u64 {
    let mut seen = HashSet::with_capacity(layers.len());
    layers
        .iter()
        .filter(|l| seen.insert(l.digest.as_str()))
        .map(|l| l.size_bytes)
        .sum()
}

/// Fetch layer detail for every deletion candidate of one repository
/// and price each against the run ledger.
///
/// Fetches run with bounded concurrency, but ledger updates are applied
/// strictly in candidate order so completion order cannot change which
/// image first claims a shared layer. A candidate whose detail fetch
/// fails is dropped from this run and reported, never silently priced
/// at zero.
pub async fn account_repo(
    gateway: Arc<dyn RegistryGateway>,
    repo: &str,
    candidates: Vec<DeletionCandidate>,
    ledger: &mut LayerLedger,
) -> (Vec<SizedCandidate>, Vec<SkippedCandidate>) {
    if candidates.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(DETAIL_FETCH_CONCURRENCY));
    let mut handles = Vec::with_capacity(candidates.len());

    for candidate in &candidates {
        let permit = semaphore.clone().acquire_owned().await.unwrap();
        let gateway = Arc::clone(&gateway);
        let repo = repo.to_string();
        let reference = candidate.reference.clone();

        handles.push(tokio::spawn(async move {
            let result = gateway.image_layers(&repo, &reference).await;
            drop(permit);
            result
        }));
    }

    let mut sized = Vec::new();
    let mut skipped = Vec::new();
    for (candidate, handle) in candidates.into_iter().zip(handles) {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!(repo, label = %candidate.label, error = %e, "layer fetch task failed");
                skipped.push(SkippedCandidate {
                    candidate,
                    reason: format!("layer fetch task failed: {e}"),
                });
                continue;
            }
        };
        match result {
            Ok(layers) => {
                let bytes = image_bytes(&layers);
                ledger.absorb(&layers);
                sized.push(SizedCandidate { candidate, bytes });
            }
            Err(e) => {
                warn!(repo, label = %candidate.label, error = %e, "layer detail unavailable, skipping");
                skipped.push(SkippedCandidate {
                    candidate,
                    reason: e.to_string(),
                });
            }
        }
    }

    (sized, skipped)
}
