//! services/api/src/adapters/convert.rs
//!
//! Document-to-text conversion through the ConvertAPI REST service.
//! The upload is converted server-side and stored; the resulting text file is then
//! downloaded from the url the service hands back.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use study_companion_core::ports::{DocumentConversionService, PortError, PortResult};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConversionResponse {
    #[serde(default)]
    files: Vec<ConvertedFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConvertedFile {
    url: String,
}

/// An adapter that implements `DocumentConversionService` with ConvertAPI.
#[derive(Clone)]
pub struct ConvertApiAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ConvertApiAdapter {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }
}

fn http_error(e: reqwest::Error) -> PortError {
    PortError::Unexpected(format!("Conversion request failed: {}", e))
}

async fn ensure_success(response: reqwest::Response) -> PortResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(PortError::Unexpected(format!(
        "Conversion service returned {}: {}",
        status, body
    )))
}

#[async_trait]
impl DocumentConversionService for ConvertApiAdapter {
    async fn convert(&self, data: &[u8], file_name: &str, mime_type: &str) -> PortResult<String> {
        let part = Part::bytes(data.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(http_error)?;
        let form = Form::new().part("File", part).text("StoreFile", "true");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(http_error)?;
        let converted: ConversionResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(http_error)?;

        let url = converted
            .files
            .into_iter()
            .next()
            .map(|f| f.url)
            .ok_or_else(|| PortError::Unexpected("No text content in response".to_string()))?;
        debug!("Downloading converted text for '{}'.", file_name);

        let text = ensure_success(self.client.get(&url).send().await.map_err(http_error)?)
            .await?
            .text()
            .await
            .map_err(http_error)?;
        Ok(text)
    }
}
