//! Dynatrace metrics source for autoscaling controllers
//!
//! The plugin queries the Dynatrace metrics API v2 and returns the data points
//! as flat series of timestamp/value pairs.

pub mod config;
pub mod error;
pub mod metrics;

pub use error::{Error, Result};
pub use metrics::dynatrace::{factory, DynatraceApm, PLUGIN_INFO};
pub use metrics::{Apm, PluginInfo, TimeRange, TimestampedMetric, TimestampedMetrics};
