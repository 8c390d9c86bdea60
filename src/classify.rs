use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::config::{RecencySource, SweepPolicy};
use crate::models::{DeletionCandidate, ImageRecord, RepoClassification, RetentionCategory};

/// Applies the retention rule chain to every image of a repository.
///
/// Rules are ordered and mutually exclusive: keep pattern, then fielded,
/// then recent; whatever survives all three is deletable. One classifier
/// serves the whole run so every repository is judged against the same
/// cutoff instant.
pub struct Classifier<'a> {
    policy: &'a SweepPolicy,
    deployed: &'a BTreeSet<String>,
    cutoff: DateTime<Tz>,
}

impl<'a> Classifier<'a> {
    pub fn new(policy: &'a SweepPolicy, deployed: &'a BTreeSet<String>) -> Self {
        Self::at(policy, deployed, Utc::now().with_timezone(&policy.timezone))
    }

    /// Classifier with a pinned reference time.
    pub fn at(policy: &'a SweepPolicy, deployed: &'a BTreeSet<String>, now: DateTime<Tz>) -> Self {
        Self {
            policy,
            deployed,
            cutoff: now - Duration::days(policy.keep_days),
        }
    }

    /// First matching rule wins. Total: every tag lands in exactly one
    /// category.
    pub fn classify_tag(
        &self,
        repo: &str,
        tag: &str,
        pushed_at: Option<DateTime<Utc>>,
    ) -> RetentionCategory {
        if self.policy.matches_keep_pattern(tag) {
            return RetentionCategory::KeepPattern;
        }
        if self.policy.is_runtime_repo(repo) && self.deployed.contains(tag) {
            return RetentionCategory::Fielded;
        }
        if self.is_recent(tag, pushed_at) {
            return RetentionCategory::Recent;
        }
        RetentionCategory::Deletable
    }

    fn is_recent(&self, tag: &str, pushed_at: Option<DateTime<Utc>>) -> bool {
        match self.policy.recency_source {
            RecencySource::PushTime => self.is_recent_push(pushed_at),
            RecencySource::TagDate => self.is_recent_tag_date(tag),
        }
    }

    /// Inclusive boundary: pushed exactly at the cutoff is recent.
    /// A listing without a push time gives no evidence of staleness, so
    /// the image is retained.
    fn is_recent_push(&self, pushed_at: Option<DateTime<Utc>>) -> bool {
        match pushed_at {
            Some(t) => t.with_timezone(&self.policy.timezone) >= self.cutoff,
            None => true,
        }
    }

    /// A tag without a readable embedded date (including date-shaped text
    /// that is not a real calendar date) is not recent.
    fn is_recent_tag_date(&self, tag: &str) -> bool {
        match self.policy.embedded_date(tag) {
            Some(date) => date >= self.cutoff.date_naive(),
            None => false,
        }
    }

    /// An image with no tags cannot match a keep pattern or a fielded
    /// version. Push-time registries still judge it by age; tag-dated
    /// registries have nothing to date it by and retain it.
    fn untagged_category(&self, pushed_at: Option<DateTime<Utc>>) -> RetentionCategory {
        match self.policy.recency_source {
            RecencySource::PushTime if !self.is_recent_push(pushed_at) => {
                RetentionCategory::Deletable
            }
            _ => RetentionCategory::Recent,
        }
    }

    /// Classify every image of one repository.
    ///
    /// An image takes the highest-priority category any of its tags
    /// achieves, reported under the lexicographically-first tag that
    /// achieves it; it is deletable only when every tag is. A repository
    /// that lists no images at all gets the untagged marker and nothing
    /// else.
    pub fn classify_repo(&self, repo: &str, images: &[ImageRecord]) -> RepoClassification {
        let mut out = RepoClassification::new(repo);

        if images.is_empty() {
            out.untagged = true;
            return out;
        }

        for image in images {
            if image.tags.is_empty() {
                match self.untagged_category(image.pushed_at) {
                    RetentionCategory::Deletable => out.deletable.push(DeletionCandidate {
                        reference: image.reference.clone(),
                        label: "untagged".to_string(),
                    }),
                    _ => out.recent.push("untagged".to_string()),
                }
                continue;
            }

            let mut tags: Vec<&str> = image.tags.iter().map(|t| t.as_str()).collect();
            tags.sort_unstable();

            let mut best_category = RetentionCategory::Deletable;
            let mut best_tag = tags[0];
            for tag in &tags {
                let category = self.classify_tag(repo, tag, image.pushed_at);
                if category < best_category {
                    best_category = category;
                    best_tag = tag;
                }
            }

            match best_category {
                RetentionCategory::KeepPattern => out.keep_pattern.push(best_tag.to_string()),
                RetentionCategory::Fielded => out.fielded.push(best_tag.to_string()),
                RetentionCategory::Recent => out.recent.push(best_tag.to_string()),
                RetentionCategory::Deletable => out.deletable.push(DeletionCandidate {
                    reference: image.reference.clone(),
                    label: best_tag.to_string(),
                }),
            }
        }

        out.keep_pattern.sort();
        out.fielded.sort();
        out.recent.sort();
        out.deletable.sort_by(|a, b| a.label.cmp(&b.label));
        out
    }
}
