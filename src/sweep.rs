use std::sync::Arc;

use tracing::{debug, info};

use crate::accounting::{account_repo, LayerLedger};
use crate::classify::Classifier;
use crate::config::SweepPolicy;
use crate::error::SweepError;
use crate::executor::execute_repo;
use crate::fleet::FleetOracle;
use crate::models::DeletionCandidate;
use crate::registry::RegistryGateway;
use crate::report::RunReport;

/// Run the whole retention pipeline.
///
/// Every repository is classified before the first delete is issued,
/// and within a repository accounting completes before execution, so
/// the ledger prices the complete deletable set. Catalog, listing, and
/// fleet failures abort here before anything is deleted; later failures
/// are absorbed into the report.
pub async fn run_sweep(
    gateway: Arc<dyn RegistryGateway>,
    oracle: &dyn FleetOracle,
    policy: &SweepPolicy,
    dry_run: bool,
) -> Result<RunReport, SweepError> {
    let repos = gateway
        .list_repositories()
        .await
        .map_err(SweepError::Catalog)?;
    let repos = policy.scope_repositories(repos);
    info!(
        count = repos.len(),
        backend = policy.backend,
        "repositories in scope"
    );

    let deployed = oracle.deployed_versions().await?;
    debug!(versions = deployed.len(), "deployed versions fetched");

    let mut report = RunReport::new(dry_run);
    report.set_deployed(&deployed);

    info!("analyzing deletion candidates, this can take a while");

    let classifier = Classifier::new(policy, &deployed);
    let mut pending: Vec<(String, Vec<DeletionCandidate>)> = Vec::with_capacity(repos.len());
    for repo in &repos {
        debug!(repo = repo.as_str(), "evaluating repository");
        let images = gateway
            .list_images(repo)
            .await
            .map_err(|source| SweepError::Listing {
                repo: repo.clone(),
                source,
            })?;
        let classification = classifier.classify_repo(repo, &images);
        report.add_classification(&classification);
        pending.push((repo.clone(), classification.deletable));
    }

    let mut ledger = LayerLedger::new();
    let mut total_images = 0usize;
    for (repo, deletable) in pending {
        let (sized, skipped) =
            account_repo(Arc::clone(&gateway), &repo, deletable, &mut ledger).await;
        report.add_skipped(&repo, &skipped);
        total_images += sized.len();
        execute_repo(
            gateway.as_ref(),
            &repo,
            &sized,
            policy.delete_batch_cap,
            &mut report,
        )
        .await;
    }

    report.set_totals(total_images, ledger.total_bytes());
    Ok(report)
}
