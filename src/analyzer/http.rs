// src/analyzer/http.rs
//
// HTTP client for the vision analysis server.
//
// POSTs one JSON request per analysis to `{url}/api/analyze`:
//   - zone context (id, display name, coordinates)
//   - the source: local files inlined as base64, URLs passed through
// The reply body is handed back untouched for the normalizer.

use super::keys::{ApiKeyPool, LeasedKey};
use super::{AnalysisRequest, AnalyzerReply, VisionAnalyzer};
use crate::error::AnalyzerError;
use crate::types::{AnalyzerConfig, GeoRef};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
pub struct AnalyzeBody {
    pub request_id: String,
    pub zone_id: String,
    pub location: String,
    pub geo: GeoRef,
    pub requested_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourcePayload>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourcePayload {
    Url { url: String },
    Inline { media_type: String, data_base64: String },
}

pub struct HttpAnalyzer {
    http_client: reqwest::Client,
    endpoint: String,
    keys: Arc<ApiKeyPool>,
    timeout: Duration,
    rate_limit_cooldown: Duration,
}

impl HttpAnalyzer {
    pub fn new(config: &AnalyzerConfig, keys: ApiKeyPool) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let endpoint = format!("{}/api/analyze", config.url.trim_end_matches('/'));
        if keys.is_empty() {
            info!("Analyzer at {} (no API keys configured)", endpoint);
        } else {
            info!("Analyzer at {} with {} API key(s)", endpoint, keys.len());
        }

        Ok(Self {
            http_client,
            endpoint,
            keys: Arc::new(keys),
            timeout,
            rate_limit_cooldown: Duration::from_secs(config.rate_limit_cooldown_secs),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn keys(&self) -> &ApiKeyPool {
        &self.keys
    }

    pub async fn build_body(request: &AnalysisRequest) -> Result<AnalyzeBody, AnalyzerError> {
        let source = match &request.source {
            None => None,
            Some(s) if is_remote(s) => Some(SourcePayload::Url { url: s.clone() }),
            Some(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    AnalyzerError::Unavailable(format!("cannot read source {}: {}", path, e))
                })?;
                Some(SourcePayload::Inline {
                    media_type: media_type(path).to_string(),
                    data_base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
                })
            }
        };

        Ok(AnalyzeBody {
            request_id: request.request_id.to_string(),
            zone_id: request.zone_id.clone(),
            location: request.display_name.clone(),
            geo: request.geo,
            requested_at: request.requested_at.to_rfc3339(),
            source,
        })
    }

    fn lease_key(&self) -> Result<Option<LeasedKey>, AnalyzerError> {
        if self.keys.is_empty() {
            return Ok(None);
        }
        self.keys.acquire().map(Some).ok_or_else(|| {
            AnalyzerError::Unavailable("all API keys rate limited or retired".to_string())
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> AnalyzerError {
        if e.is_timeout() {
            AnalyzerError::Timeout(self.timeout)
        } else {
            AnalyzerError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl VisionAnalyzer for HttpAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalyzerReply, AnalyzerError> {
        let body = Self::build_body(request).await?;
        let lease = self.lease_key()?;

        debug!(
            zone = %request.zone_id,
            "Sending analysis request {} (source: {})",
            body.request_id,
            request.source.as_deref().unwrap_or("<analyzer default>")
        );

        let mut req = self.http_client.post(&self.endpoint).json(&body);
        if let Some(lease) = &lease {
            req = req.header("x-api-key", &lease.key);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                if let Some(lease) = &lease {
                    self.keys.mark_error(lease.index);
                }
                return Err(self.map_transport_error(e));
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            if let Some(lease) = &lease {
                if status == StatusCode::TOO_MANY_REQUESTS {
                    self.keys
                        .mark_rate_limited(lease.index, self.rate_limit_cooldown);
                } else {
                    self.keys.mark_error(lease.index);
                }
            }
            warn!(zone = %request.zone_id, "Analyzer returned {}: {}", status, text);
            return Err(AnalyzerError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                if let Some(lease) = &lease {
                    self.keys.mark_error(lease.index);
                }
                return Err(self.map_transport_error(e));
            }
        };
        if let Some(lease) = &lease {
            self.keys.mark_success(lease.index);
        }

        Ok(AnalyzerReply::from_body(text))
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn is_remote(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn media_type(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
}
