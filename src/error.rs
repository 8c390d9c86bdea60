use thiserror::Error;

/// Fatal errors that abort the whole run before any deletion happens.
///
/// Classification needs the full repository catalog and the full
/// fleet-version set; without either, deleting anything risks removing a
/// fielded image, so these never degrade into a partial run.
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("failed to enumerate repositories: {0}")]
    Catalog(#[source] GatewayError),

    #[error("failed to list images in {repo}: {source}")]
    Listing {
        repo: String,
        #[source]
        source: GatewayError,
    },

    #[error("failed to obtain fleet-deployed versions: {0}")]
    Fleet(#[from] FleetError),
}

/// Error from a single registry call. Whether it is fatal depends on
/// where it happens: listing failures abort the run, per-image detail
/// and per-batch delete failures are absorbed and reported.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ECR API error: {0}")]
    Ecr(#[from] aws_sdk_ecr::Error),

    #[error("{context} returned status {status}")]
    Status {
        context: String,
        status: reqwest::StatusCode,
    },

    #[error("missing Docker-Content-Digest header for {reference}")]
    MissingDigest { reference: String },

    #[error("failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("manifest for {reference} carries no layers")]
    NoLayers { reference: String },

    #[error("manifest for {reference} unavailable: {reason}")]
    ManifestUnavailable { reference: String, reason: String },
}

/// Error from the fleet deployment store.
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("fleet database error: {0}")]
    Db(#[from] tokio_postgres::Error),

    #[error("missing fleet database setting: {0}")]
    Missing(&'static str),
}

/// Error building the sweep policy from configuration, surfaced before
/// any remote call is made.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("invalid keep pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),
}
