use chrono::NaiveDate;
use chrono_tz::Tz;
use regex::{Regex, RegexSet};

use crate::error::PolicyError;

/// Tag patterns protected from deletion regardless of age or deployment:
/// anything ending in `latest`, the nightly development tag, and release
/// tags (`rel-YYYY.MM.DD`, optionally `_N` or `_nightly`).
pub const DEFAULT_KEEP_PATTERNS: &[&str] = &[
    r"^.*latest$",
    r"^dev_nightly$",
    r"^rel-\d{4}\.\d{2}\.\d{2}(?:_\d+)?$",
    r"^rel-\d{4}\.\d{2}\.\d{2}_nightly$",
];

/// Calendar date embedded in tag text, e.g. `rel-2024.08.16` or
/// `v20240816-hotfix`. Greedy prefix makes the year group the first
/// four-digit run that is followed by a plausible month and day.
pub const TAG_DATE_PATTERN: &str = r".*(\d{4})\D?(0[1-9]|1[0-2])\D?([12]\d|0[1-9]|3[01]).*$";

/// Reference time zone for retention cutoffs.
pub const DEFAULT_TIMEZONE: &str = "America/Denver";

/// Where the recency rule takes its timestamp from. The cloud listing
/// carries a push time; a bare V2 registry does not, so the date is
/// parsed out of the tag text there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecencySource {
    PushTime,
    TagDate,
}

/// Per-backend defaults. The retention window differs because the
/// self-hosted registry sits behind far less storage than the cloud one.
#[derive(Debug, Clone, Copy)]
pub struct BackendProfile {
    pub name: &'static str,
    pub recency_source: RecencySource,
    pub keep_days: i64,
    pub delete_batch_cap: usize,
}

pub const ECR_PROFILE: BackendProfile = BackendProfile {
    name: "ecr",
    recency_source: RecencySource::PushTime,
    keep_days: 90,
    // The remote batch-delete API caps one call below 100 image ids.
    delete_batch_cap: 99,
};

pub const REGISTRY_V2_PROFILE: BackendProfile = BackendProfile {
    name: "registry-v2",
    recency_source: RecencySource::TagDate,
    keep_days: 30,
    delete_batch_cap: 99,
};

/// Everything the retention engine needs to decide the fate of an image.
#[derive(Debug)]
pub struct SweepPolicy {
    pub backend: &'static str,
    pub recency_source: RecencySource,
    pub keep_days: i64,
    pub delete_batch_cap: usize,
    pub timezone: Tz,
    /// Repositories in scope must start with one of these; empty means
    /// the whole catalog.
    pub repo_prefixes: Vec<String>,
    /// The one repository cross-referenced against fleet-deployed
    /// versions. The deployment store only records versions of this
    /// composite release artifact, so the fielded rule never applies
    /// elsewhere.
    pub runtime_repo: Option<String>,
    keep_patterns: RegexSet,
    tag_date: Regex,
}

impl SweepPolicy {
    pub fn new(profile: &BackendProfile) -> Result<Self, PolicyError> {
        let keep_patterns = RegexSet::new(DEFAULT_KEEP_PATTERNS)?;
        let tag_date = Regex::new(TAG_DATE_PATTERN)?;
        let timezone = parse_timezone(DEFAULT_TIMEZONE)?;
        Ok(Self {
            backend: profile.name,
            recency_source: profile.recency_source,
            keep_days: profile.keep_days,
            delete_batch_cap: profile.delete_batch_cap,
            timezone,
            repo_prefixes: Vec::new(),
            runtime_repo: None,
            keep_patterns,
            tag_date,
        })
    }

    pub fn with_keep_days(mut self, days: i64) -> Self {
        self.keep_days = days;
        self
    }

    pub fn with_repo_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.repo_prefixes = prefixes;
        self
    }

    pub fn with_runtime_repo(mut self, repo: impl Into<String>) -> Self {
        self.runtime_repo = Some(repo.into());
        self
    }

    pub fn with_batch_cap(mut self, cap: usize) -> Self {
        self.delete_batch_cap = cap.max(1);
        self
    }

    pub fn with_timezone(mut self, name: &str) -> Result<Self, PolicyError> {
        self.timezone = parse_timezone(name)?;
        Ok(self)
    }

    pub fn in_scope(&self, repo: &str) -> bool {
        self.repo_prefixes.is_empty() || self.repo_prefixes.iter().any(|p| repo.starts_with(p))
    }

    /// Filter the catalog down to in-scope repositories, sorted for
    /// deterministic processing order.
    pub fn scope_repositories(&self, repos: Vec<String>) -> Vec<String> {
        let mut scoped: Vec<String> = repos.into_iter().filter(|r| self.in_scope(r)).collect();
        scoped.sort();
        scoped
    }

    pub fn is_runtime_repo(&self, repo: &str) -> bool {
        self.runtime_repo.as_deref() == Some(repo)
    }

    pub fn matches_keep_pattern(&self, tag: &str) -> bool {
        self.keep_patterns.is_match(tag)
    }

    /// Date embedded in the tag text, if the tag carries one and it is a
    /// real calendar date. `2023.02.31` matches the pattern but is not a
    /// date; it yields None and the tag falls through to the next rule.
    pub fn embedded_date(&self, tag: &str) -> Option<NaiveDate> {
        let caps = self.tag_date.captures(tag)?;
        let year: i32 = caps.get(1)?.as_str().parse().ok()?;
        let month: u32 = caps.get(2)?.as_str().parse().ok()?;
        let day: u32 = caps.get(3)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

fn parse_timezone(name: &str) -> Result<Tz, PolicyError> {
    name.parse::<Tz>()
        .map_err(|_| PolicyError::InvalidTimezone(name.to_string()))
}
