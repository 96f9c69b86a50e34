//! Client for the remote licence recognition service.

use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::types::{ScanErrorPayload, ScanFields, ScanResult, ScanValidation, SelectedImage};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
/// Environment variable naming the service base URL. A `.env` file in the
/// working directory is honoured.
pub const BASE_URL_ENV: &str = "SCAN_API_BASE_URL";

pub(crate) const SCAN_FALLBACK_MESSAGE: &str = "Scan failed. Please try again.";
const VALIDATE_FALLBACK_MESSAGE: &str = "Validation failed. Please try again.";

/// The recognition service as the flow sees it. The orchestrator is generic
/// over this so tests can substitute a fake for the HTTP client.
pub trait ScanApi {
    fn scan(
        &self,
        image: &SelectedImage,
    ) -> impl std::future::Future<Output = Result<ScanResult, ApiError>>;

    fn validate(
        &self,
        fields: &ScanFields,
    ) -> impl std::future::Future<Output = Result<ScanValidation, ApiError>>;
}

/// HTTP implementation over `reqwest`. No request timeout is set; a hung
/// call is left to the transport, matching the rest of the flow.
pub struct ScanClient {
    http: reqwest::Client,
    base_url: String,
}

impl ScanClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: normalize_base_url(base_url.into()),
        }
    }

    /// Base URL from `SCAN_API_BASE_URL` (with `.env` support), falling back
    /// to the local development endpoint.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let base = std::env::var(BASE_URL_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::new(base)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ScanApi for ScanClient {
    async fn scan(&self, image: &SelectedImage) -> Result<ScanResult, ApiError> {
        let url = format!("{}/license/scan", self.base_url);
        debug!(%url, bytes = image.bytes().len(), "submitting scan");

        let part = Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name().unwrap_or("image.jpg").to_string())
            .mime_str(image.media_type().unwrap_or("application/octet-stream"))?;
        let form = Form::new().part("image", part);

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response, SCAN_FALLBACK_MESSAGE).await;
            warn!(status = status.as_u16(), %message, "scan rejected by server");
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<ScanResult>().await?)
    }

    async fn validate(&self, fields: &ScanFields) -> Result<ScanValidation, ApiError> {
        let url = format!("{}/license/validate", self.base_url);
        debug!(%url, "submitting field validation");

        let response = self.http.post(&url).json(fields).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response, VALIDATE_FALLBACK_MESSAGE).await;
            warn!(status = status.as_u16(), %message, "validation rejected by server");
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<ScanValidation>().await?)
    }
}

fn normalize_base_url(mut base: String) -> String {
    while base.ends_with('/') {
        base.pop();
    }
    base
}

/// Pull `error.message` out of a failure body, or fall back to the
/// endpoint's generic user-facing message.
async fn error_message(response: reqwest::Response, fallback: &str) -> String {
    response
        .json::<ScanErrorPayload>()
        .await
        .ok()
        .and_then(|payload| payload.error)
        .and_then(|detail| detail.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_stripped() {
        assert_eq!(
            ScanClient::new("http://api.example.com/").base_url(),
            "http://api.example.com"
        );
        assert_eq!(
            ScanClient::new("http://api.example.com//").base_url(),
            "http://api.example.com"
        );
        assert_eq!(ScanClient::new(DEFAULT_BASE_URL).base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn error_payload_parses_nested_message() {
        let payload: ScanErrorPayload =
            serde_json::from_str(r#"{"error":{"code":"INVALID_IMAGE","message":"Bad image"}}"#)
                .unwrap();
        assert_eq!(
            payload.error.and_then(|e| e.message).as_deref(),
            Some("Bad image")
        );
    }

    #[test]
    fn error_payload_tolerates_empty_body() {
        let payload: ScanErrorPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.error.is_none());
    }
}
