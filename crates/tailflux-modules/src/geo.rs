//! Client geolocation
//!
//! Two resolvers are provided: one shells out to a local program (such as
//! `nali`) and one asks an HTTP geolocation API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tailflux_core::config::{GeoBackend, GeoConfig};
use tailflux_core::{LocationLookup, LookupError, NoLookup, TailfluxError};
use tokio::process::Command;
use tracing::{debug, info};

/// Location reported for loopback addresses
pub const INTERNAL_LOCATION: &str = "internal";

/// Location reported when the resolver answers but knows nothing
pub const UNKNOWN_LOCATION: &str = "unknown";

/// Build the resolver selected by the configuration
pub fn build_lookup(config: &GeoConfig) -> Result<Arc<dyn LocationLookup>, TailfluxError> {
    if !config.enabled {
        info!("Geo lookup disabled");
        return Ok(Arc::new(NoLookup));
    }

    let lookup: Arc<dyn LocationLookup> = match config.backend {
        GeoBackend::Command => Arc::new(CommandLookup::new(config.command.clone())),
        GeoBackend::Http => Arc::new(
            HttpLookup::new(config.endpoint.clone(), config.key.clone(), config.timeout())
                .map_err(|e| TailfluxError::Config(e.to_string()))?,
        ),
    };

    info!(lookup = lookup.name(), timeout_ms = config.timeout_ms, "Geo lookup initialized");
    Ok(lookup)
}

/// Join every space-separated token after the first
///
/// `nali 1.2.3.4` prints something like `1.2.3.4 [China Beijing]`; the
/// address comes first and the place follows.
pub fn location_from_output(output: &str) -> String {
    output
        .split(' ')
        .skip(1)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Runs `<program> <ip>` and reads the place name from its stdout
pub struct CommandLookup {
    program: String,
}

impl CommandLookup {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl LocationLookup for CommandLookup {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn lookup(&self, ip: &str) -> Result<String, LookupError> {
        let output = Command::new(&self.program)
            .arg(ip)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LookupError::Spawn {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(LookupError::ExitStatus {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let location = location_from_output(&String::from_utf8_lossy(&output.stdout));
        debug!(ip = %ip, location = %location, "Resolved location via command");
        Ok(location)
    }
}

/// Queries an AMap-style IP API: `GET <endpoint>?ip=<ip>&key=<key>`
///
/// The response is a JSON object carrying `province` and `city`. Providers
/// in this family return an empty array instead of a string for addresses
/// they cannot place, which is reported as [`UNKNOWN_LOCATION`].
pub struct HttpLookup {
    client: Client,
    endpoint: String,
    key: String,
}

impl HttpLookup {
    pub fn new(
        endpoint: impl Into<String>,
        key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            key: key.into(),
        })
    }

    fn is_loopback(ip: &str) -> bool {
        ip == "127.0.0.1" || ip == "localhost"
    }

    fn location_from_body(body: &Value) -> String {
        let province = body.get("province").and_then(Value::as_str).unwrap_or("");
        if province.is_empty() {
            return UNKNOWN_LOCATION.to_string();
        }
        let city = body.get("city").and_then(Value::as_str).unwrap_or("");
        format!("{}-{}", province, city)
    }
}

#[async_trait]
impl LocationLookup for HttpLookup {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn lookup(&self, ip: &str) -> Result<String, LookupError> {
        if Self::is_loopback(ip) {
            return Ok(INTERNAL_LOCATION.to_string());
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("ip", ip), ("key", self.key.as_str())])
            .send()
            .await
            .map_err(|e| LookupError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Http(format!("server returned {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LookupError::Decode(e.to_string()))?;

        let location = Self::location_from_body(&body);
        debug!(ip = %ip, location = %location, "Resolved location via HTTP");
        Ok(location)
    }
}
