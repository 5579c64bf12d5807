//! InfluxDB 1.x integration
//!
//! Writes points to the `/write` endpoint using line protocol over HTTP.

use crate::line_protocol::encode_batch;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tailflux_core::{ConnectionDescriptor, OutputError, Point, PointWriter};
use tracing::{debug, error, info};

/// Client for writing points to InfluxDB
pub struct InfluxWriter {
    descriptor: ConnectionDescriptor,
    client: Client,
}

impl InfluxWriter {
    /// Create a new writer without contacting the server
    pub fn new(descriptor: ConnectionDescriptor, timeout: Duration) -> Result<Self, OutputError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OutputError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { descriptor, client })
    }

    /// Create a writer and check the server answers `/ping`
    pub async fn connect(
        descriptor: ConnectionDescriptor,
        timeout: Duration,
    ) -> Result<Self, OutputError> {
        let writer = Self::new(descriptor, timeout)?;
        writer.ping().await?;

        info!(
            endpoint = %writer.descriptor.endpoint,
            database = %writer.descriptor.database,
            precision = %writer.descriptor.precision,
            measurement = %writer.descriptor.measurement,
            "InfluxDB writer connected"
        );
        Ok(writer)
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Check the server is reachable
    pub async fn ping(&self) -> Result<(), OutputError> {
        let url = format!("{}/ping", self.descriptor.endpoint);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| OutputError::Connect {
                endpoint: self.descriptor.endpoint.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(OutputError::Connect {
                endpoint: self.descriptor.endpoint.clone(),
                message: format!("ping returned {}", response.status()),
            });
        }

        debug!(endpoint = %self.descriptor.endpoint, "InfluxDB ping ok");
        Ok(())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.descriptor.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.descriptor.username, Some(&self.descriptor.password))
        }
    }
}

#[async_trait]
impl PointWriter for InfluxWriter {
    async fn write_points(&self, points: &[Point]) -> Result<(), OutputError> {
        let body = encode_batch(points, self.descriptor.precision)?;
        let url = format!("{}/write", self.descriptor.endpoint);

        debug!(points = points.len(), bytes = body.len(), "Writing points to InfluxDB");

        let response = self
            .authorize(self.client.post(&url))
            .query(&[
                ("db", self.descriptor.database.as_str()),
                ("precision", self.descriptor.precision.as_str()),
            ])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| OutputError::Network(format!("Failed to write to InfluxDB: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: String = response.text().await.unwrap_or_default();
            error!(
                status = %status,
                body = %body,
                "InfluxDB write failed"
            );
            return Err(OutputError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
