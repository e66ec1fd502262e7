//! Unsigned image uploads to the CDN.
//!
//! `POST {endpoint}` form-encoded with `file` (a base64 data URI) and
//! `upload_preset`; the response carries the public URL of the image.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use showroom_core::UploadSettings;

use crate::error::{transport, StoreError};

/// An image accepted by the CDN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub secure_url: String,
    pub public_id: String,
}

#[derive(Debug, Deserialize)]
struct UploadErrorBody {
    error: UploadErrorDetail,
}

#[derive(Debug, Deserialize)]
struct UploadErrorDetail {
    message: String,
}

#[derive(Debug, Clone)]
pub struct UploadSink {
    http: reqwest::Client,
    endpoint: String,
    preset: String,
}

impl UploadSink {
    pub fn new(settings: &UploadSettings) -> Result<Self, StoreError> {
        if settings.endpoint.trim().is_empty() || settings.preset.trim().is_empty() {
            return Err(StoreError::Validation(
                "upload endpoint and preset are required".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(transport("client_init"))?;
        Ok(Self {
            http,
            endpoint: settings.endpoint.clone(),
            preset: settings.preset.clone(),
        })
    }

    /// Upload `bytes` under the file name `name`.
    pub async fn upload(&self, name: &str, bytes: &[u8]) -> Result<UploadedImage, StoreError> {
        if bytes.is_empty() {
            return Err(StoreError::Validation(format!("image '{name}' is empty")));
        }
        let endpoint = "POST upload";
        let form = [
            ("file", data_uri(name, bytes)),
            ("upload_preset", self.preset.clone()),
        ];

        let resp = self
            .http
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(transport(endpoint))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<UploadErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("upload failed").to_string());
            return Err(StoreError::Api {
                endpoint: endpoint.into(),
                status: status.as_u16(),
                message,
            });
        }

        let uploaded: UploadedImage = resp.json().await.map_err(|e| StoreError::Decode {
            endpoint: endpoint.into(),
            reason: e.to_string(),
        })?;
        tracing::info!(name, url = %uploaded.secure_url, "image uploaded");
        Ok(uploaded)
    }
}

/// `data:<mime>;base64,<payload>` for an image file.
pub fn data_uri(name: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_for(name), STANDARD.encode(bytes))
}

/// Image MIME type guessed from the file extension.
pub fn mime_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("avif") => "image/avif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_is_guessed_case_insensitively() {
        assert_eq!(mime_for("sofa.PNG"), "image/png");
        assert_eq!(mime_for("chair.jpeg"), "image/jpeg");
        assert_eq!(mime_for("README"), "application/octet-stream");
    }

    #[test]
    fn data_uri_has_prefix() {
        assert_eq!(data_uri("a.gif", b"GIF"), "data:image/gif;base64,R0lG");
    }

    #[test]
    fn blank_preset_is_rejected() {
        let err = UploadSink::new(&UploadSettings {
            endpoint: "https://api.cloudinary.com/v1_1/demo/image/upload".into(),
            preset: "".into(),
        })
        .expect_err("blank preset");
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
