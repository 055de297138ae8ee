use super::{SuccessInfo, Transport, TransportError};
use crate::config::types::WriterConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::trace;

/// Posts batches to an InfluxDB 1.x compatible `/write` endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    write_url: String,
    database: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &WriterConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();

        if !config.http.timeout.is_zero() {
            builder = builder.timeout(config.http.timeout);
        }

        // Without keepalive no idle connection is kept around for reuse
        let idle_per_host = if config.http.keepalive {
            config.http.max_connections_per_host
        } else {
            0
        };
        builder = builder.pool_max_idle_per_host(idle_per_host);

        let client = builder.build()?;

        Ok(Self {
            write_url: format!("{}/write", config.url.trim_end_matches('/')),
            database: config.database.clone(),
            client,
        })
    }

    pub fn write_url(&self) -> &str {
        &self.write_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, payload: String) -> Result<SuccessInfo, TransportError> {
        let bytes_sent = payload.len();
        let response = self
            .client
            .post(&self.write_url)
            .query(&[("db", self.database.as_str())])
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
            let body = response.bytes().await?;
            trace!(
                status = status.as_u16(),
                bytes_sent = bytes_sent,
                bytes_received = body.len(),
                "Write accepted"
            );
            return Ok(SuccessInfo {
                status_code: status.as_u16(),
                bytes_received: body.len(),
            });
        }

        Err(TransportError::Status {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }
}
