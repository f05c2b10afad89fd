// ImgBB image host: uploads a rendered map and returns its public URL.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use super::retry::Backoff;
use super::ImageHost;
use crate::error::DeliveryError;

pub const IMGBB_UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    data: Option<UploadData>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: String,
}

/// Extract the full-size image URL from an upload response body.
fn parse_upload_response(body: &str) -> Result<String, DeliveryError> {
    let response: UploadResponse = serde_json::from_str(body)
        .map_err(|e| DeliveryError::Rejected(format!("unreadable upload response: {e}")))?;
    match response {
        UploadResponse {
            success: true,
            data: Some(data),
            ..
        } => Ok(data.url),
        UploadResponse { error, .. } => Err(DeliveryError::Rejected(
            error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "upload was not successful".to_string()),
        )),
    }
}

#[derive(Debug, Clone)]
pub struct ImgbbHost {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    backoff: Backoff,
}

impl ImgbbHost {
    /// Without an API key every upload fails with `NotConfigured`.
    pub fn new(api_key: Option<String>, backoff: Backoff) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: IMGBB_UPLOAD_URL.to_string(),
            backoff,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn upload_once(&self, key: &str, image: &str, name: &str) -> Result<String, DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("key", key), ("image", image), ("name", name)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_upload_response(&body)
    }
}

#[async_trait]
impl ImageHost for ImgbbHost {
    async fn upload(&self, jpeg: Vec<u8>, name: &str) -> Result<String, DeliveryError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(DeliveryError::NotConfigured("IMGBB_API_KEY"))?;
        let encoded = STANDARD.encode(&jpeg);

        let url = self
            .backoff
            .run("ImgBB upload", || self.upload_once(key, &encoded, name))
            .await?;
        tracing::info!("Uploaded {name} ({} bytes) to {url}", jpeg.len());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let body = r#"{
            "data": { "id": "abc", "url": "https://i.ibb.co/abc/map.jpeg",
                      "thumb": { "url": "https://i.ibb.co/abc/map-thumb.jpeg" } },
            "success": true,
            "status": 200
        }"#;
        assert_eq!(
            parse_upload_response(body).unwrap(),
            "https://i.ibb.co/abc/map.jpeg"
        );
    }

    #[test]
    fn test_parse_failure_carries_error() {
        let body = r#"{ "status_code": 400, "error": { "message": "Invalid API v1 key." }, "success": false }"#;
        let err = parse_upload_response(body).unwrap_err();
        assert!(err.to_string().contains("Invalid API v1 key."));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_upload_response("<html>"),
            Err(DeliveryError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_without_key_is_not_configured() {
        let host = ImgbbHost::new(None, Backoff::new(1)).unwrap();
        let err = host.upload(vec![1, 2, 3], "map.jpeg").await.unwrap_err();
        assert!(matches!(err, DeliveryError::NotConfigured("IMGBB_API_KEY")));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        let host = ImgbbHost::new(Some("key".into()), Backoff::new(1))
            .unwrap()
            .with_endpoint("http://127.0.0.1:1/upload");
        let err = host.upload(vec![1, 2, 3], "map.jpeg").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Http(_)));
        assert!(err.is_retryable());
    }
}
