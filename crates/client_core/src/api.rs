use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Client, RequestBuilder, Response,
};
use serde::de::DeserializeOwned;
use shared::{
    domain::BackupType,
    protocol::{
        BackupEntry, CreateBackupRequest, CreateBackupResponse, ErrorBody, ListBackupsResponse,
        OperationResponse, API_KEY_HEADER, BACKUPS_ROUTE, CREATE_BACKUP_ROUTE, LIST_BACKUPS_ROUTE,
        RESTORE_BACKUP_ROUTE,
    },
};
use tracing::{debug, error};
use url::Url;

use crate::{config::ClientConfig, error::ApiClientError};

#[async_trait]
pub trait BackupApi: Send + Sync {
    async fn list_backups(&self) -> Result<Vec<BackupEntry>, ApiClientError>;
    async fn create_backup(
        &self,
        backup_type: BackupType,
    ) -> Result<CreateBackupResponse, ApiClientError>;
    async fn restore_backup(&self, name: &str) -> Result<OperationResponse, ApiClientError>;
    async fn delete_backup(&self, id: &str) -> Result<OperationResponse, ApiClientError>;
}

pub struct HttpBackupApi {
    http: Client,
    base_url: Url,
}

impl HttpBackupApi {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid backup service url '{}'", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("backup service url '{}' cannot carry a path", config.base_url);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = config.api_key.as_deref() {
            let mut value =
                HeaderValue::from_str(api_key).context("api key is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
        }

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout_ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let http = builder.build().context("failed to build http client")?;

        debug!(
            base_url = %base_url,
            has_api_key = config.api_key.is_some(),
            "backup api client configured"
        );
        Ok(Self { http, base_url })
    }

    /// Appends `route` and `extra` to the base url; every piece is
    /// percent-encoded as a single path segment.
    fn endpoint(&self, route: &str, extra: Option<&str>) -> Result<Url, ApiClientError> {
        // Dot segments would be resolved away instead of encoded.
        if let Some(extra @ ("" | "." | "..")) = extra {
            return Err(ApiClientError::InvalidIdentifier(extra.to_string()));
        }
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ApiClientError::Network("base url cannot carry a path".into()))?;
            segments.pop_if_empty();
            segments.extend(route.split('/').filter(|segment| !segment.is_empty()));
            if let Some(extra) = extra {
                segments.push(extra);
            }
        }
        Ok(url)
    }

    async fn fetch_listing(&self) -> Result<Vec<BackupEntry>, ApiClientError> {
        let url = self.endpoint(LIST_BACKUPS_ROUTE, None)?;
        let listing = send::<ListBackupsResponse>(self.http.get(url)).await?;
        Ok(listing.backups)
    }
}

#[async_trait]
impl BackupApi for HttpBackupApi {
    async fn list_backups(&self) -> Result<Vec<BackupEntry>, ApiClientError> {
        match self.fetch_listing().await {
            Ok(entries) => Ok(entries),
            Err(err) => {
                error!(
                    error = %err,
                    code = ?err.code(),
                    "error fetching backups; reporting an empty listing"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn create_backup(
        &self,
        backup_type: BackupType,
    ) -> Result<CreateBackupResponse, ApiClientError> {
        let url = self.endpoint(CREATE_BACKUP_ROUTE, None)?;
        let request = self
            .http
            .post(url)
            .json(&CreateBackupRequest { backup_type });
        let result = send::<CreateBackupResponse>(request).await;
        if let Err(err) = &result {
            error!(error = %err, code = ?err.code(), %backup_type, "error creating backup");
        }
        result
    }

    async fn restore_backup(&self, name: &str) -> Result<OperationResponse, ApiClientError> {
        let url = self.endpoint(RESTORE_BACKUP_ROUTE, Some(name))?;
        let result = send::<OperationResponse>(self.http.post(url)).await;
        if let Err(err) = &result {
            error!(error = %err, code = ?err.code(), backup = name, "error restoring backup");
        }
        result
    }

    async fn delete_backup(&self, id: &str) -> Result<OperationResponse, ApiClientError> {
        let url = self.endpoint(BACKUPS_ROUTE, Some(id))?;
        let result = send::<OperationResponse>(self.http.delete(url)).await;
        if let Err(err) = &result {
            error!(error = %err, code = ?err.code(), backup = id, "error deleting backup");
        }
        result
    }
}

async fn send<T>(request: RequestBuilder) -> Result<T, ApiClientError>
where
    T: DeserializeOwned + Default,
{
    read_json(request.send().await?).await
}

async fn read_json<T>(response: Response) -> Result<T, ApiClientError>
where
    T: DeserializeOwned + Default,
{
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .map(|parsed| parsed.message())
            .ok()
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        return Err(ApiClientError::service(status.as_u16(), detail));
    }

    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes).map_err(|err| ApiClientError::Decode(err.to_string()))
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
