//! This module is about fetching configuration values and parsing them appropriately.

use crate::auth::Credential;
use std::net::SocketAddr;
use std::str::FromStr;

/// Error enumeration for configuration problems detected at startup.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing {0} envvar")]
    Missing(&'static str),
    #[error("Failed to parse {name} envvar: {value:?}")]
    Invalid { name: &'static str, value: String },
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => T::from_str(&value).map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Get the Warcraft Logs client credentials from the `WCL_CLIENT_ID` and `WCL_CLIENT_SECRET` envvars, and the endpoints from `WCL_TOKEN_URL` and `WCL_API_URL` if set.
pub fn credential() -> Result<Credential, ConfigError> {
    let mut credential = Credential::new(required("WCL_CLIENT_ID")?, required("WCL_CLIENT_SECRET")?);
    if let Some(url) = optional("WCL_TOKEN_URL") {
        credential.token_url = url;
    }
    if let Some(url) = optional("WCL_API_URL") {
        credential.api_url = url;
    }
    Ok(credential)
}

/// Get the address to listen on from the `HOST` and `PORT` envvars, defaulting to `0.0.0.0:3000`.
pub fn listen_addr() -> Result<SocketAddr, ConfigError> {
    let host = optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
    let port: u16 = parsed("PORT", 3000)?;
    let value = format!("{host}:{port}");
    SocketAddr::from_str(&value).map_err(|_| ConfigError::Invalid { name: "HOST", value })
}

/// Whether error responses should include internals, from the `WCL_PROXY_DIAGNOSTICS` envvar.
pub fn diagnostics() -> bool {
    matches!(optional("WCL_PROXY_DIAGNOSTICS").as_deref(), Some("1") | Some("true") | Some("yes"))
}
