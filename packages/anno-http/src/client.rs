use crate::config::ClientConfig;
use crate::convert::{batch_to_frame, selector_to_wire};
use annomatrix::{AnnoError, DataFrame, Field, RemoteSource, Schema, Selector};
use anno_protocol::{ColumnBatch, ConfigResponse, ServerConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    schema: Schema,
}

/// The dataset server, over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl HttpSource {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { config, http_client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Dataset schema from the bootstrap endpoint.
    pub async fn fetch_schema(&self) -> Result<Schema> {
        let response: SchemaResponse = self.get_json("schema").await.context("Failed to fetch schema")?;
        info!(
            n_obs = response.schema.dataframe.n_obs,
            n_var = response.schema.dataframe.n_var,
            "Schema loaded"
        );
        Ok(response.schema)
    }

    pub async fn fetch_config(&self) -> Result<ServerConfig> {
        let response: ConfigResponse = self.get_json("config").await.context("Failed to fetch server config")?;
        Ok(response.config)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> annomatrix::Result<T> {
        let url = self.config.api_url(endpoint);
        debug!(url = %url, "GET");
        let response = self.http_client.get(&url).send().await.map_err(transport_error)?;
        read_json(response).await
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    #[instrument(skip(self, selector))]
    async fn fetch(&self, field: Field, selector: &Selector) -> annomatrix::Result<DataFrame> {
        let url = self.config.api_url(&format!("data/{field}"));
        let body = selector_to_wire(selector);
        debug!(url = %url, ?body, "POST");

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let batch: ColumnBatch = read_json(response).await?;
        batch_to_frame(batch)
    }
}

fn transport_error(e: reqwest::Error) -> AnnoError {
    AnnoError::remote(e.status().map(|s| s.as_u16()), e.to_string())
}

/// Decode a success body, or turn the status and body into a fetch error.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> annomatrix::Result<T> {
    let status = response.status();
    if !status.is_success() {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response body".to_string());
        warn!(status = %status, error_body = %error_body, "Request failed with non-success status");
        return Err(AnnoError::remote(Some(status.as_u16()), error_body));
    }
    response.json::<T>().await.map_err(transport_error)
}
