use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use clap::Parser;
use dynatrace_apm::{
    config::{CONFIG_API_TOKEN_KEY, CONFIG_TENANT_URL_KEY},
    Apm, TimeRange,
};

#[derive(Debug, Clone, PartialEq, Eq, Parser)]
struct Cli {
    /// Filename of the config file holding `tenant_url` and `api_token`
    #[arg(short, long, default_value = "")]
    config: String,

    /// URL of the Dynatrace tenant, falls back to DYNATRACE_TENANT_URL
    #[arg(long, default_value = "")]
    tenant_url: String,

    /// Dynatrace API token, falls back to DYNATRACE_API_TOKEN
    #[arg(long, default_value = "")]
    api_token: String,

    /// Metric selector to query
    #[arg(short, long)]
    selector: String,

    /// Start of the query window in Unix seconds
    #[arg(long)]
    from: Option<i64>,

    /// End of the query window in Unix seconds, defaults to now
    #[arg(long)]
    to: Option<i64>,

    /// Length of the query window in seconds when the start is not given
    #[arg(short, long, default_value_t = 600)]
    window: u32,

    /// Print all the matched series instead of requiring a single one
    #[arg(short, long)]
    multiple: bool,
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, eyre::Report> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| eyre::eyre!("{secs} is not a valid timestamp"))
}

#[tokio::main]
async fn main() -> Result<(), eyre::Report> {
    env_logger::builder().parse_default_env().init();

    let cli = Cli::parse();

    let mut plugin_config = HashMap::new();

    if !cli.config.is_empty() {
        plugin_config = config::Config::builder()
            .add_source(config::File::with_name(&cli.config))
            .build()?
            .try_deserialize::<HashMap<String, String>>()?;
    }

    // Command line values take precedence over the config file
    for (key, value) in [
        (CONFIG_TENANT_URL_KEY, cli.tenant_url),
        (CONFIG_API_TOKEN_KEY, cli.api_token),
    ] {
        if !value.is_empty() {
            plugin_config.insert(key.to_owned(), value);
        }
    }

    let mut plugin = dynatrace_apm::factory();
    plugin.set_config(plugin_config)?;

    let info = plugin.plugin_info();
    log::info!("Plugin {} ({}) configured", info.name, info.plugin_type);

    let to = match cli.to {
        Some(to) => timestamp(to)?,
        None => Utc::now(),
    };
    let from = match cli.from {
        Some(from) => timestamp(from)?,
        None => to - TimeDelta::seconds(i64::from(cli.window)),
    };
    let range = TimeRange::new(from, to);

    let output = if cli.multiple {
        serde_json::to_string_pretty(&plugin.query_multiple(&cli.selector, range).await?)?
    } else {
        serde_json::to_string_pretty(&plugin.query(&cli.selector, range).await?)?
    };

    println!("{output}");

    Ok(())
}
