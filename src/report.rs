use std::collections::BTreeSet;

use colored::Colorize;

use crate::models::{RepoClassification, SizedCandidate, SkippedCandidate};

/// Accumulates everything the run decided and renders it as plain,
/// deterministically ordered text.
///
/// Sections are sorted at render time, so unchanged registry state
/// produces byte-identical output across runs regardless of arrival
/// order. Totals always reflect the full analysis; failed deletions are
/// itemized but not subtracted.
#[derive(Debug)]
pub struct RunReport {
    dry_run: bool,
    deployed: Vec<String>,
    retained_keep: Vec<String>,
    retained_fielded: Vec<String>,
    retained_recent: Vec<String>,
    untagged_repos: Vec<String>,
    skipped: Vec<String>,
    deletions: Vec<String>,
    failures: Vec<String>,
    images: usize,
    bytes: u64,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            deployed: Vec::new(),
            retained_keep: Vec::new(),
            retained_fielded: Vec::new(),
            retained_recent: Vec::new(),
            untagged_repos: Vec::new(),
            skipped: Vec::new(),
            deletions: Vec::new(),
            failures: Vec::new(),
            images: 0,
            bytes: 0,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn set_deployed(&mut self, versions: &BTreeSet<String>) {
        self.deployed = versions.iter().cloned().collect();
    }

    pub fn add_classification(&mut self, classification: &RepoClassification) {
        let repo = &classification.repository;
        for tag in &classification.keep_pattern {
            self.retained_keep
                .push(format!("Retained - 'keep pattern' match: {repo}: {tag}"));
        }
        for tag in &classification.fielded {
            self.retained_fielded
                .push(format!("Retained - Deployed in the field: {repo}: {tag}"));
        }
        for tag in &classification.recent {
            self.retained_recent
                .push(format!("Retained - Recent: {repo}: {tag}"));
        }
        if classification.untagged {
            self.untagged_repos
                .push(format!("Retained - No tags found in repo: {repo}"));
        }
    }

    pub fn add_skipped(&mut self, repo: &str, skipped: &[SkippedCandidate]) {
        for skip in skipped {
            self.skipped.push(format!(
                "Skipped - layer detail unavailable: {repo}: {} ({})",
                skip.candidate.label, skip.reason
            ));
        }
    }

    pub fn add_deletion(&mut self, repo: &str, sized: &SizedCandidate) {
        let gb = gb_from_bytes(sized.bytes);
        let line = if self.dry_run {
            format!(
                "Would delete - {repo}:{}: size = {gb} GB",
                sized.candidate.label
            )
        } else {
            format!("Deleted - {repo}:{}: size = {gb} GB", sized.candidate.label)
        };
        self.deletions.push(line);
    }

    pub fn add_failure(&mut self, repo: &str, label: &str, reason: &str) {
        self.failures
            .push(format!("Delete failed - {repo}:{label} ({reason})"));
    }

    /// Run totals from the analysis: candidate count and deduplicated
    /// bytes. Identical between a dry run and a real run over the same
    /// registry state.
    pub fn set_totals(&mut self, images: usize, bytes: u64) {
        self.images = images;
        self.bytes = bytes;
    }

    pub fn total_images(&self) -> usize {
        self.images
    }

    #[allow(dead_code)]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::new();

        if self.deployed.is_empty() {
            lines.push("All images deployed in the field: (0 versions)".to_string());
        } else {
            lines.push(format!(
                "All images deployed in the field: {} ({} versions)",
                self.deployed.join(", "),
                self.deployed.len()
            ));
        }

        for section in [
            &self.retained_keep,
            &self.retained_fielded,
            &self.retained_recent,
            &self.untagged_repos,
            &self.skipped,
            &self.deletions,
            &self.failures,
        ] {
            let mut section = section.clone();
            section.sort();
            lines.extend(section);
        }

        let gb = gb_from_bytes(self.bytes);
        if self.dry_run {
            lines.push(format!(
                "{} images, ({gb} GB) would be reclaimed.",
                self.images
            ));
        } else {
            lines.push(format!(
                "{} images deleted and ({gb} GB) were reclaimed.",
                self.images
            ));
        }

        lines.join("\n")
    }

    /// Console presentation: colored dry-run banner around the plain
    /// rendered report.
    pub fn print(&self) {
        if self.dry_run {
            println!(
                "{} (no changes will be made)",
                "DRY RUN".yellow().bold()
            );
            println!("{}", "─".repeat(60));
        }
        println!("{}", self.render());
    }
}

/// Reminder printed after a real run against a self-hosted registry:
/// deleting manifests only unlinks them, the registry's own garbage
/// collection reclaims the disk space.
pub fn print_gc_reminder() {
    println!(
        "\n{} Run registry garbage collection to reclaim disk space:",
        "REMINDER:".yellow().bold()
    );
    println!("  docker exec <registry-container> bin/registry garbage-collect /etc/docker/registry/config.yml");
}

/// Bytes to gigabytes with two decimals, presentation only.
pub fn gb_from_bytes(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeletionCandidate, ImageRef};

    fn sized(label: &str, bytes: u64) -> SizedCandidate {
        SizedCandidate {
            candidate: DeletionCandidate {
                reference: ImageRef::by_tag(label),
                label: label.to_string(),
            },
            bytes,
        }
    }

    fn skipped(label: &str, reason: &str) -> SkippedCandidate {
        SkippedCandidate {
            candidate: DeletionCandidate {
                reference: ImageRef::by_tag(label),
                label: label.to_string(),
            },
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_gb_rounds_to_two_decimals() {
        assert_eq!(gb_from_bytes(1_610_612_736), "1.50");
        assert_eq!(gb_from_bytes(0), "0.00");
        assert_eq!(gb_from_bytes(9_935_662_402), "9.25");
    }

    #[test]
    fn test_render_golden() {
        let mut report = RunReport::new(true);
        report.set_deployed(&["v2".to_string(), "v1".to_string()].into_iter().collect());

        let mut api = RepoClassification::new("app/api");
        api.keep_pattern = vec!["prod-latest".to_string()];
        api.recent = vec!["fresh".to_string()];
        report.add_classification(&api);

        let mut empty = RepoClassification::new("app/empty");
        empty.untagged = true;
        report.add_classification(&empty);

        report.add_skipped("app/api", &[skipped("broken", "layer detail 500")]);
        report.add_deletion("app/api", &sized("old-build", 1_610_612_736));
        report.add_failure("app/api", "older-build", "denied");
        report.set_totals(2, 1_610_612_736);

        let expected = "\
All images deployed in the field: v1, v2 (2 versions)
Retained - 'keep pattern' match: app/api: prod-latest
Retained - Recent: app/api: fresh
Retained - No tags found in repo: app/empty
Skipped - layer detail unavailable: app/api: broken (layer detail 500)
Would delete - app/api:old-build: size = 1.50 GB
Delete failed - app/api:older-build (denied)
2 images, (1.50 GB) would be reclaimed.";
        assert_eq!(report.render(), expected);
    }

    #[test]
    fn test_render_sorts_within_sections() {
        let mut report = RunReport::new(false);
        report.add_deletion("app/api", &sized("zeta", 0));
        report.add_deletion("app/api", &sized("alpha", 0));
        report.set_totals(2, 0);

        let rendered = report.render();
        let alpha = rendered.find("Deleted - app/api:alpha").unwrap();
        let zeta = rendered.find("Deleted - app/api:zeta").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn test_render_is_stable_across_calls() {
        let mut report = RunReport::new(false);
        report.add_deletion("b", &sized("x", 10));
        report.add_deletion("a", &sized("y", 10));
        report.set_totals(2, 20);
        assert_eq!(report.render(), report.render());
    }

    #[test]
    fn test_dry_and_real_runs_differ_only_in_wording() {
        let build = |dry_run: bool| {
            let mut report = RunReport::new(dry_run);
            let mut c = RepoClassification::new("app/api");
            c.recent = vec!["fresh".to_string()];
            report.add_classification(&c);
            report.add_deletion("app/api", &sized("old", 1_073_741_824));
            report.set_totals(1, 1_073_741_824);
            report.render()
        };

        let dry = build(true);
        let real = build(false);
        assert_eq!(
            dry.replace("Would delete - ", "Deleted - ").replace(
                "1 images, (1.00 GB) would be reclaimed.",
                "1 images deleted and (1.00 GB) were reclaimed."
            ),
            real
        );
    }

    #[test]
    fn test_empty_deployed_set_header() {
        let mut report = RunReport::new(true);
        report.set_totals(0, 0);
        let rendered = report.render();
        assert!(rendered.starts_with("All images deployed in the field: (0 versions)"));
        assert!(rendered.ends_with("0 images, (0.00 GB) would be reclaimed."));
    }
}
