use std::{collections::HashMap, time::Duration};

use chrono::DateTime;
use reqwest::{header, StatusCode};
use serde::Deserialize;

use super::{Apm, PluginInfo, TimeRange, TimestampedMetric, TimestampedMetrics, PLUGIN_TYPE_APM};
use crate::{
    config::{self, CONFIG_API_TOKEN_KEY, CONFIG_TENANT_URL_KEY, ENV_API_TOKEN_KEY, ENV_TENANT_URL_KEY},
    error::{Error, Result},
};

/// Name under which the plugin is registered
pub const PLUGIN_NAME: &str = "dynatrace-apm";

/// Descriptor of the Dynatrace plugin
pub const PLUGIN_INFO: PluginInfo = PluginInfo {
    name: PLUGIN_NAME,
    plugin_type: PLUGIN_TYPE_APM,
};

/// Deadline of a single query, including the response body
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

const QUERY_PATH: &str = "api/v2/metrics/query";
const QUERY_RESOLUTION: &str = "1m";
const TOKEN_PREFIX: &str = "Api-Token";

/// Build an unconfigured Dynatrace plugin
pub fn factory() -> Box<dyn Apm + Send + Sync> {
    Box::new(DynatraceApm::new())
}

/// HTTP state derived from the configuration
#[derive(Debug, Clone)]
struct Client {
    /// HTTP client
    http: reqwest::Client,
    /// Metrics query endpoint of the tenant
    query: reqwest::Url,
    /// `Authorization` header carrying the API token
    authorization: header::HeaderValue,
}

/// [`Apm`] that fetches metrics from the Dynatrace metrics API v2
#[derive(Clone)]
pub struct DynatraceApm {
    /// Configuration with resolved `tenant_url` and `api_token`
    config: HashMap<String, String>,
    /// Set once the configuration has been applied
    client: Option<Client>,
    timeout: Duration,
}

impl std::fmt::Debug for DynatraceApm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = self
            .config
            .iter()
            .map(|(key, value)| {
                let value = if key == CONFIG_API_TOKEN_KEY {
                    "<redacted>"
                } else {
                    value.as_str()
                };
                (key.as_str(), value)
            })
            .collect::<HashMap<_, _>>();

        f.debug_struct("DynatraceApm")
            .field("config", &config)
            .field("client", &self.client)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for DynatraceApm {
    fn default() -> Self {
        Self::new()
    }
}

impl DynatraceApm {
    /// Create a new unconfigured [`DynatraceApm`]
    pub fn new() -> Self {
        Self {
            config: HashMap::new(),
            client: None,
            timeout: QUERY_TIMEOUT,
        }
    }

    /// Create a new [`DynatraceApm`] and apply `config`
    pub fn from_config(config: HashMap<String, String>) -> Result<Self> {
        let mut apm = Self::new();
        apm.set_config(config)?;
        Ok(apm)
    }

    /// Resolved configuration, empty until configured
    pub fn config(&self) -> &HashMap<String, String> {
        &self.config
    }

    /// Apply `config`, reading missing settings through `lookup` instead of the environment
    pub fn set_config_with<L>(&mut self, mut config: HashMap<String, String>, lookup: L) -> Result<()>
    where
        L: Fn(&str) -> Option<String>,
    {
        let explicit = |config: &HashMap<String, String>, key: &str| {
            config.get(key).cloned().unwrap_or_default()
        };

        // URL first, then token
        let tenant_url = config::resolve_with(
            &explicit(&config, CONFIG_TENANT_URL_KEY),
            ENV_TENANT_URL_KEY,
            &lookup,
        )?;
        let api_token = config::resolve_with(
            &explicit(&config, CONFIG_API_TOKEN_KEY),
            ENV_API_TOKEN_KEY,
            &lookup,
        )?;

        let url = config::tenant_url(&tenant_url)?;
        let tenant_host = config::tenant_host(&url);

        let query = reqwest::Url::parse(&format!("{}://{}/", url.scheme(), tenant_host))
            .and_then(|base| base.join(QUERY_PATH))
            .map_err(|err| Error::InvalidConfiguration {
                key: CONFIG_TENANT_URL_KEY.to_owned(),
                reason: err.to_string(),
            })?;

        let mut authorization = header::HeaderValue::from_str(&format!("{TOKEN_PREFIX} {api_token}"))
            .map_err(|err| Error::InvalidConfiguration {
                key: CONFIG_API_TOKEN_KEY.to_owned(),
                reason: err.to_string(),
            })?;
        authorization.set_sensitive(true);

        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::HttpClient)?;

        log::debug!("Configured Dynatrace tenant {tenant_host}: {query}");

        config.insert(CONFIG_TENANT_URL_KEY.to_owned(), tenant_url);
        config.insert(CONFIG_API_TOKEN_KEY.to_owned(), api_token);

        self.config = config;
        self.client = Some(Client {
            http,
            query,
            authorization,
        });

        Ok(())
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.timeout)
        } else {
            Error::QueryFailed(err.into())
        }
    }
}

#[async_trait::async_trait]
impl Apm for DynatraceApm {
    fn set_config(&mut self, config: HashMap<String, String>) -> Result<()> {
        self.set_config_with(config, |key| std::env::var(key).ok())
    }

    fn plugin_info(&self) -> PluginInfo {
        PLUGIN_INFO
    }

    async fn query_multiple(
        &self,
        query: &str,
        range: TimeRange,
    ) -> Result<Vec<TimestampedMetrics>> {
        let client = self.client.as_ref().ok_or(Error::NotConfigured)?;

        let from = range.from.timestamp_millis().to_string();
        let to = range.to.timestamp_millis().to_string();

        log::debug!(
            "Query Dynatrace metrics {query:?} from {} to {}",
            range.from,
            range.to
        );

        let response = client
            .http
            .get(client.query.clone())
            .query(&[
                ("metricSelector", query),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("resolution", QUERY_RESOLUTION),
            ])
            .header(header::AUTHORIZATION, client.authorization.clone())
            .header(header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| self.request_error(err))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited);
        }

        let body = response
            .text()
            .await
            .map_err(|err| self.request_error(err))?;

        if !status.is_success() {
            return Err(Error::QueryFailed(
                format!("unexpected status {status}: {body}").into(),
            ));
        }

        // Parse the json response
        let data: MetricData =
            serde_json::from_str(&body).map_err(|err| Error::QueryFailed(err.into()))?;

        Ok(data.into_series())
    }
}

/// Body of a successful metrics query
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricData {
    total_count: Option<i64>,
    next_page_key: Option<String>,
    resolution: Option<String>,
    #[serde(default)]
    result: Vec<MetricSeriesCollection>,
}

/// Series returned for one metric of the selector
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricSeriesCollection {
    #[serde(default)]
    metric_id: String,
    data: Option<Vec<MetricSeries>>,
    #[serde(default)]
    warnings: Vec<String>,
}

/// Data points of one dimension tuple
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricSeries {
    #[serde(default)]
    dimensions: Vec<String>,
    #[serde(default)]
    timestamps: Vec<i64>,
    /// Missing buckets are `null`
    #[serde(default)]
    values: Vec<Option<f64>>,
}

impl MetricData {
    /// Flatten the collections into one [`TimestampedMetrics`] per series, in response order
    fn into_series(self) -> Vec<TimestampedMetrics> {
        if let Some(next_page_key) = &self.next_page_key {
            log::warn!(
                "Dynatrace response is paginated ({} series in total, next page {next_page_key}), only the first page is used",
                self.total_count.unwrap_or_default()
            );
        }

        if self.result.is_empty() {
            log::warn!("empty metrics response from dynatrace, try a wider query window");
            return Vec::new();
        }

        log::trace!(
            "Dynatrace answered {} collections at resolution {}",
            self.result.len(),
            self.resolution.as_deref().unwrap_or("unknown")
        );

        let mut results = Vec::new();

        for collection in self.result {
            for warning in &collection.warnings {
                log::warn!("Dynatrace warning for {}: {warning}", collection.metric_id);
            }

            // Collections without data are not an error
            let Some(series) = collection.data else {
                continue;
            };

            results.extend(
                series
                    .into_iter()
                    .map(|series| series.into_metrics(&collection.metric_id)),
            );
        }

        if results.is_empty() {
            log::warn!(
                "no data points found in the metrics response from dynatrace, try a wider query window"
            );
        }

        log::trace!("Fetched metrics: {results:#?}");

        results
    }
}

impl MetricSeries {
    /// Pair timestamps and values by position
    ///
    /// `null` values and unrepresentable timestamps are dropped, so an all-`null`
    /// series yields an empty [`TimestampedMetrics`] that still counts as a series.
    fn into_metrics(self, metric_id: &str) -> TimestampedMetrics {
        if self.timestamps.len() != self.values.len() {
            log::warn!(
                "Series {metric_id} {:?} has {} timestamps for {} values, unpaired points are ignored",
                self.dimensions,
                self.timestamps.len(),
                self.values.len()
            );
        }

        let dimensions = self.dimensions;

        self.timestamps
            .into_iter()
            .zip(self.values)
            .filter_map(|(timestamp, value)| {
                let Some(value) = value else {
                    log::trace!("No value for {metric_id} {dimensions:?} at {timestamp}");
                    return None;
                };

                let Some(timestamp) = DateTime::from_timestamp_millis(timestamp) else {
                    // Ignore points that could not be represented
                    log::warn!(
                        "Invalid timestamp for {metric_id} {dimensions:?}: {timestamp}"
                    );
                    return None;
                };

                Some(TimestampedMetric { timestamp, value })
            })
            .collect()
    }
}
