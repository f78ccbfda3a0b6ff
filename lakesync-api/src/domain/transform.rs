//! Client for the external text-extraction service.

use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::error::{PipelineError, Result};

const TARGET_TEXT_MIME: &str = "text/plain";
const TARGET_EXTENSION: &str = "txt";
const CONFIG_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Client for the extraction service's `/transform` endpoint.
///
/// The service's supported source→target matrix (`GET /transform/config`) is
/// cached for five minutes; when the config cannot be read the support check
/// fails open and the actual transform request decides.
pub struct TransformClient {
    http: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
    cached_config: Mutex<Option<(EngineConfig, Instant)>>,
}

#[derive(Debug, Clone, Deserialize)]
struct EngineConfig {
    #[serde(default)]
    transformers: Vec<TransformerDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransformerDef {
    #[serde(default)]
    supported_source_and_target_list: Vec<SupportedPair>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SupportedPair {
    source_media_type: String,
    target_media_type: String,
}

impl TransformClient {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
            cached_config: Mutex::new(None),
        }
    }

    /// Sends content to the extraction service and returns the transformed
    /// bytes.
    pub async fn transform(
        &self,
        content: Vec<u8>,
        source_mime: &str,
        target_mime: &str,
    ) -> Result<Vec<u8>> {
        if source_mime.trim().is_empty() {
            return Err(PipelineError::InvariantViolation(
                "source mime type is required for transformation".to_string(),
            ));
        }

        let file_name = format!("content{}", extension_for_mime(source_mime));
        let part = Part::bytes(content)
            .file_name(file_name)
            .mime_str(source_mime)
            .map_err(|e| PipelineError::Backend(format!("invalid mime type: {}", e)))?;

        let form = Form::new()
            .part("file", part)
            .text("sourceMimetype", source_mime.to_string())
            .text("targetMimetype", target_mime.to_string())
            .text("targetExtension", TARGET_EXTENSION.to_string());

        let resp = self
            .http
            .post(format!(
                "{}/transform?timeout={}",
                self.base_url, self.timeout_ms
            ))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!(source_mime, target_mime, error = %e, "Transform request failed");
                PipelineError::Backend(format!("transform request failed: {}", e))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(PipelineError::Backend(format!(
                "transform endpoint returned status {} for {} -> {}",
                status, source_mime, target_mime
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PipelineError::Backend(format!("transform response failed: {}", e)))?;
        Ok(bytes.to_vec())
    }

    /// Reads a file and extracts `text/plain` from it, decoding the response
    /// as UTF-8.
    pub async fn transform_to_text(&self, path: &Path, source_mime: &str) -> Result<String> {
        if !self.is_supported(source_mime, TARGET_TEXT_MIME).await {
            return Err(PipelineError::Backend(format!(
                "extraction service does not support {} -> {}",
                source_mime, TARGET_TEXT_MIME
            )));
        }

        let content = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::Backend(format!("failed to read temp file: {}", e)))?;

        let out = self.transform(content, source_mime, TARGET_TEXT_MIME).await?;
        let text = String::from_utf8_lossy(&out).into_owned();
        debug!(chars = text.len(), source_mime, "Extraction successful");
        Ok(text)
    }

    /// Checks whether the service supports a source→target transformation.
    /// Unknown configuration fails open.
    pub async fn is_supported(&self, source_mime: &str, target_mime: &str) -> bool {
        if source_mime.trim().is_empty() || target_mime.trim().is_empty() {
            return false;
        }

        let Some(config) = self.engine_config_cached().await else {
            return true;
        };

        config.transformers.iter().any(|t| {
            t.supported_source_and_target_list
                .iter()
                .any(|s| s.source_media_type == source_mime && s.target_media_type == target_mime)
        })
    }

    async fn engine_config_cached(&self) -> Option<EngineConfig> {
        let mut cached = self.cached_config.lock().await;

        if let Some((config, fetched_at)) = cached.as_ref() {
            if fetched_at.elapsed() < CONFIG_CACHE_TTL {
                return Some(config.clone());
            }
        }

        match self.fetch_engine_config().await {
            Ok(config) => {
                *cached = Some((config.clone(), Instant::now()));
                Some(config)
            }
            Err(e) => {
                debug!(error = %e, "Could not read extraction engine config");
                cached.as_ref().map(|(config, _)| config.clone())
            }
        }
    }

    async fn fetch_engine_config(&self) -> Result<EngineConfig> {
        let resp = self
            .http
            .get(format!("{}/transform/config", self.base_url))
            .send()
            .await
            .map_err(|e| PipelineError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PipelineError::Backend(format!(
                "config endpoint returned status {}",
                resp.status()
            )));
        }

        resp.json::<EngineConfig>()
            .await
            .map_err(|e| PipelineError::Backend(e.to_string()))
    }
}

/// File extension for a mime type, used to name uploaded content.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "application/pdf" => ".pdf",
        "application/msword" => ".doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => ".docx",
        "application/vnd.ms-excel" => ".xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => ".xlsx",
        "application/vnd.ms-powerpoint" => ".ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => ".pptx",
        "text/html" => ".html",
        "text/xml" | "application/xml" => ".xml",
        "application/json" => ".json",
        "text/plain" => ".txt",
        "text/csv" => ".csv",
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/tiff" => ".tiff",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping_covers_office_formats() {
        assert_eq!(extension_for_mime("application/pdf"), ".pdf");
        assert_eq!(
            extension_for_mime(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            ),
            ".docx"
        );
        assert_eq!(extension_for_mime("text/csv"), ".csv");
        assert_eq!(extension_for_mime("application/x-unknown"), "");
    }

    #[tokio::test]
    async fn support_check_rejects_blank_mime_types() {
        let client = TransformClient::new("http://localhost:8090", 60_000);
        assert!(!client.is_supported("", "text/plain").await);
        assert!(!client.is_supported("application/pdf", " ").await);
    }

    #[test]
    fn engine_config_parses_support_matrix() {
        let json = r#"{
            "transformers": [{
                "transformerName": "libreoffice",
                "supportedSourceAndTargetList": [
                    { "sourceMediaType": "application/pdf", "targetMediaType": "text/plain" }
                ]
            }]
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.transformers.len(), 1);
        assert_eq!(
            config.transformers[0].supported_source_and_target_list[0].source_media_type,
            "application/pdf"
        );
    }
}
