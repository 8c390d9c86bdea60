use tracing::{debug, warn};

use crate::models::{BatchFailure, ImageRef, SizedCandidate};
use crate::registry::RegistryGateway;
use crate::report::RunReport;

/// Delete one repository's sized candidates in capped batches.
///
/// A dry run records the would-delete lines and issues no call. A failed
/// batch call marks every candidate in that chunk failed and later
/// chunks still run; a successful call may itself carry per-image
/// failures. A candidate the backend neither confirmed nor failed is
/// reported failed rather than assumed deleted.
pub async fn execute_repo(
    gateway: &dyn RegistryGateway,
    repo: &str,
    candidates: &[SizedCandidate],
    batch_cap: usize,
    report: &mut RunReport,
) {
    if candidates.is_empty() {
        debug!(repo, "no deletion candidates");
        return;
    }

    if report.is_dry_run() {
        for sized in candidates {
            report.add_deletion(repo, sized);
        }
        return;
    }

    for chunk in candidates.chunks(batch_cap.max(1)) {
        let refs: Vec<ImageRef> = chunk
            .iter()
            .map(|s| s.candidate.reference.clone())
            .collect();

        match gateway.delete_batch(repo, &refs).await {
            Ok(outcome) => {
                for sized in chunk {
                    let reference = &sized.candidate.reference;
                    if confirmed(&outcome.deleted, reference) {
                        report.add_deletion(repo, sized);
                    } else if let Some(failure) = failure_for(&outcome.failures, reference) {
                        warn!(repo, label = %sized.candidate.label, reason = %failure.reason,
                            "image not deleted");
                        report.add_failure(repo, &sized.candidate.label, &failure.reason);
                    } else {
                        warn!(repo, label = %sized.candidate.label,
                            "image missing from delete response");
                        report.add_failure(repo, &sized.candidate.label, "no deletion acknowledged");
                    }
                }
            }
            Err(e) => {
                warn!(repo, batch = chunk.len(), error = %e, "batch delete failed");
                let reason = e.to_string();
                for sized in chunk {
                    report.add_failure(repo, &sized.candidate.label, &reason);
                }
            }
        }
    }
}

/// Digest equality when both sides carry one, tag equality otherwise.
/// The cloud response echoes identifiers with digest and tag, the
/// self-hosted path round-trips the request references.
fn same_image(a: &ImageRef, b: &ImageRef) -> bool {
    match (&a.digest, &b.digest) {
        (Some(x), Some(y)) => x == y,
        _ => match (&a.tag, &b.tag) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn confirmed(deleted: &[ImageRef], reference: &ImageRef) -> bool {
    deleted.iter().any(|r| same_image(r, reference))
}

fn failure_for<'a>(failures: &'a [BatchFailure], reference: &ImageRef) -> Option<&'a BatchFailure> {
    failures.iter().find(|f| same_image(&f.reference, reference))
}
