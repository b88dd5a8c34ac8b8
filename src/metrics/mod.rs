use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod dynatrace;

/// Window of a metrics query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    /// Start of the window
    pub from: DateTime<Utc>,
    /// End of the window
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Build a new [`TimeRange`]
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }
}

/// Single data point of a series
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TimestampedMetric {
    /// Instant of the data point
    pub timestamp: DateTime<Utc>,
    /// Value of the metric
    pub value: f64,
}

/// Chronological data points for one entity, in the order of the backend
pub type TimestampedMetrics = Vec<TimestampedMetric>;

/// Static description of a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PluginInfo {
    /// Name under which the plugin is registered
    pub name: &'static str,
    /// Kind of plugin
    pub plugin_type: &'static str,
}

/// Plugin type of metrics sources
pub const PLUGIN_TYPE_APM: &str = "apm";

/// Trait for metrics sources queried by the autoscaler
#[async_trait::async_trait]
pub trait Apm {
    /// Replace the configuration of the plugin
    ///
    /// On error, the previous configuration is kept.
    fn set_config(&mut self, config: HashMap<String, String>) -> Result<()>;

    /// Describe the plugin
    fn plugin_info(&self) -> PluginInfo;

    /// Fetch all the series matched by `query` within `range`
    async fn query_multiple(&self, query: &str, range: TimeRange)
        -> Result<Vec<TimestampedMetrics>>;

    /// Fetch the single series matched by `query` within `range`
    ///
    /// remarks: No series yields an empty series, multiple series are an error
    async fn query(&self, query: &str, range: TimeRange) -> Result<TimestampedMetrics> {
        let mut series = self.query_multiple(query, range).await?;

        match series.len() {
            0 => Ok(TimestampedMetrics::new()),
            1 => Ok(series.swap_remove(0)),
            n => Err(Error::MultipleSeries(n)),
        }
    }
}
