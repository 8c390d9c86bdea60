use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};

use crate::config::{
    BackendProfile, SweepPolicy, DEFAULT_TIMEZONE, ECR_PROFILE, REGISTRY_V2_PROFILE,
};
use crate::error::PolicyError;
use crate::fleet::DEFAULT_EXCLUDED_SITES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// AWS Elastic Container Registry
    Ecr,
    /// Self-hosted Docker Registry HTTP API V2
    RegistryV2,
}

impl Backend {
    pub fn profile(self) -> &'static BackendProfile {
        match self {
            Backend::Ecr => &ECR_PROFILE,
            Backend::RegistryV2 => &REGISTRY_V2_PROFILE,
        }
    }
}

/// Fleet-aware container registry cleaner
#[derive(Parser, Debug)]
#[command(name = "regsweep", version, about)]
pub struct Cli {
    /// Registry backend to clean
    #[arg(long, value_enum)]
    pub backend: Backend,

    /// Registry URL for the registry-v2 backend (e.g., http://localhost:5000)
    #[arg(long, env = "REGSWEEP_REGISTRY", required_if_eq("backend", "registry-v2"))]
    pub registry: Option<String>,

    /// Identify deletion candidates without deleting them (CI sets DRY_RUN=true)
    #[arg(
        long,
        env = "DRY_RUN",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    pub dry_run: bool,

    /// Only clean repositories starting with this prefix (repeatable;
    /// every repository when omitted)
    #[arg(long = "repo-prefix")]
    pub repo_prefixes: Vec<String>,

    /// Repository whose tags are checked against fleet-deployed versions
    #[arg(long, env = "REGSWEEP_RUNTIME_REPO")]
    pub runtime_repo: Option<String>,

    /// Retention window in days (default: 90 for ecr, 30 for registry-v2)
    #[arg(long)]
    pub keep_days: Option<i64>,

    /// Maximum images per delete call
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Fleet database URL; falls back to RDSHOST/PG_USER/PGPASSWORD
    #[arg(long, env = "FLEET_DB_URL")]
    pub fleet_db_url: Option<String>,

    /// Fleet site whose deployments are ignored (repeatable)
    #[arg(long = "exclude-site", default_values_t = default_excluded_sites())]
    pub exclude_sites: Vec<String>,

    /// Time zone anchoring the retention window
    #[arg(long, default_value = DEFAULT_TIMEZONE)]
    pub timezone: String,

    /// Verbose output
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

fn default_excluded_sites() -> Vec<String> {
    DEFAULT_EXCLUDED_SITES.iter().map(|s| s.to_string()).collect()
}

impl Cli {
    /// Backend profile with the command-line overrides applied.
    pub fn policy(&self) -> Result<SweepPolicy, PolicyError> {
        let mut policy = SweepPolicy::new(self.backend.profile())?
            .with_repo_prefixes(self.repo_prefixes.clone())
            .with_timezone(&self.timezone)?;
        if let Some(days) = self.keep_days {
            policy = policy.with_keep_days(days);
        }
        if let Some(cap) = self.batch_size {
            policy = policy.with_batch_cap(cap);
        }
        if let Some(repo) = &self.runtime_repo {
            policy = policy.with_runtime_repo(repo);
        }
        Ok(policy)
    }
}
