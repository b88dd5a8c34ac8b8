use std::time::Duration;

/// Boxed error used to carry the cause of a failed query
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by the plugin
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Setting is neither given explicitly nor through its environment variable
    #[error("{key:?} must not be empty")]
    MissingConfiguration { key: String },

    /// Setting is present but could not be used
    #[error("{key:?} is invalid: {reason}")]
    InvalidConfiguration { key: String, reason: String },

    /// HTTP client could not be built
    #[error("could not build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// Query issued before `set_config` succeeded
    #[error("plugin is not configured")]
    NotConfigured,

    /// Dynatrace answered with 429 Too Many Requests
    #[error("metrics query rate limited by dynatrace, wait and retry")]
    RateLimited,

    /// Dynatrace did not answer in time
    #[error("metrics query to dynatrace timed out after {0:?}")]
    Timeout(Duration),

    /// Any other transport, status or decoding failure
    #[error("error querying metrics from dynatrace: {0}")]
    QueryFailed(#[source] BoxError),

    /// Scalar query matched several series
    #[error("query returned data for {0} time series, only 1 is expected")]
    MultipleSeries(usize),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
