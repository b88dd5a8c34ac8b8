use crate::error::{Error, Result};

/// Configuration key holding the tenant URL
pub const CONFIG_TENANT_URL_KEY: &str = "tenant_url";
/// Configuration key holding the API token
pub const CONFIG_API_TOKEN_KEY: &str = "api_token";

/// Environment variable used when `tenant_url` is not configured
pub const ENV_TENANT_URL_KEY: &str = "DYNATRACE_TENANT_URL";
/// Environment variable used when `api_token` is not configured
pub const ENV_API_TOKEN_KEY: &str = "DYNATRACE_API_TOKEN";

/// Return `value` if it is not empty, the result of `fallback` otherwise
pub fn value_or_fallback<F>(value: &str, fallback: F) -> Result<String>
where
    F: FnOnce() -> Result<String>,
{
    if !value.is_empty() {
        return Ok(value.to_owned());
    }

    fallback()
}

/// Fallback reading the environment variable `key`
pub fn fallback_from_env(key: &str) -> impl FnOnce() -> Result<String> {
    fallback_from_lookup(key, |key| std::env::var(key).ok())
}

/// Fallback reading `key` through `lookup`
///
/// A missing or empty variable is reported as [`Error::MissingConfiguration`].
pub fn fallback_from_lookup<L>(key: &str, lookup: L) -> impl FnOnce() -> Result<String>
where
    L: FnOnce(&str) -> Option<String>,
{
    let key = key.to_owned();
    move || match lookup(&key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::MissingConfiguration { key }),
    }
}

/// Resolve a setting from its explicit value, or from the environment variable `env_key`
pub fn resolve(explicit: &str, env_key: &str) -> Result<String> {
    value_or_fallback(explicit, fallback_from_env(env_key))
}

/// Same as [`resolve`] with a custom environment lookup
pub fn resolve_with<L>(explicit: &str, env_key: &str, lookup: L) -> Result<String>
where
    L: FnOnce(&str) -> Option<String>,
{
    value_or_fallback(explicit, fallback_from_lookup(env_key, lookup))
}

/// Parse the tenant URL, which must be an absolute http(s) URL with a host
pub fn tenant_url(raw: &str) -> Result<reqwest::Url> {
    let invalid = |reason: String| Error::InvalidConfiguration {
        key: CONFIG_TENANT_URL_KEY.to_owned(),
        reason,
    };

    let url = reqwest::Url::parse(raw).map_err(|err| invalid(err.to_string()))?;

    match url.scheme() {
        "http" | "https" => (),
        scheme => return Err(invalid(format!("unsupported scheme {scheme:?}"))),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(invalid("missing host".to_owned())),
    }
}

/// Host of the tenant, including the port when it is explicit
pub fn tenant_host(url: &reqwest::Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    }
}
