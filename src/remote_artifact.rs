//! Server-backed artifact strategy.
//!
//! The snapshot is POSTed to the storefront's save endpoint, which owns
//! artifact generation and hands back a design id. Endpoint failures are
//! recoverable: the flow can park the design locally instead.

use crate::error::{Error, Result};
use crate::render::DesignImage;
use crate::snapshot::DesignSnapshot;
use crate::tracking::TrackingCode;
use crate::{Artifact, ArtifactLink, ArtifactProducer, ArtifactStatus, CaptureConfig};
use log::{debug, info};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Wire response of the save endpoint.
#[derive(Debug, Deserialize)]
struct SaveResponse {
    success: bool,
    #[serde(default)]
    design_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Persists snapshots through the remote save endpoint.
pub struct RemoteSaveProducer {
    client: Client,
    endpoint: Url,
    user_agent: String,
}

impl RemoteSaveProducer {
    pub fn new(config: &CaptureConfig, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::ConfigError(format!("save endpoint '{}': {}", endpoint, e)))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::InitializationError(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            user_agent: config.user_agent.clone(),
        })
    }

    fn post_json(&self, body: String) -> Result<SaveResponse> {
        debug!("POST {} ({} bytes)", self.endpoint, body.len());
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .header("User-Agent", &self.user_agent)
            .body(body)
            .send()
            .map_err(|e| Error::BackendError(format!("{}: {}", self.endpoint, e)))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| Error::BackendError(format!("{}: {}", self.endpoint, e)))?;
        if !status.is_success() {
            return Err(Error::BackendError(format!(
                "{}: HTTP {}",
                self.endpoint, status
            )));
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::BackendError(format!("malformed save response: {}", e)))
    }

    /// Stable artifact URL the backend serves for a saved design.
    fn artifact_url(&self, code: &TrackingCode) -> String {
        let mut url = self.endpoint.clone();
        url.set_path(&format!("/pdfs/{}.pdf", code.file_stem()));
        url.set_query(None);
        url.set_fragment(None);
        url.to_string()
    }
}

impl ArtifactProducer for RemoteSaveProducer {
    fn name(&self) -> &'static str {
        "remote-save"
    }

    fn produce(
        &mut self,
        snapshot: &DesignSnapshot,
        code: &TrackingCode,
        _canvas: Option<&DesignImage>,
    ) -> Result<Artifact> {
        let body = serde_json::to_string(snapshot)
            .map_err(|e| Error::Other(format!("snapshot serialization: {}", e)))?;
        let response = self.post_json(body)?;

        if !response.success {
            return Err(Error::BackendError(
                response
                    .error
                    .unwrap_or_else(|| "save endpoint reported failure".to_string()),
            ));
        }

        info!(
            "Design {} saved remotely as {:?} ({} pieces)",
            code,
            response.design_id,
            snapshot.total_pieces
        );

        Ok(Artifact {
            tracking_code: code.as_str().to_string(),
            link: ArtifactLink::Remote(self.artifact_url(code)),
            status: ArtifactStatus::Saved,
            design_id: response.design_id,
            digest: None,
        })
    }

    fn associate_order(&self, design_id: &str, order_id: &str) -> Result<()> {
        let body = serde_json::json!({
            "design_id": design_id,
            "shopify_order_id": order_id,
            "action": "associate_order",
        })
        .to_string();

        let response = self.post_json(body)?;
        if !response.success {
            return Err(Error::BackendError(
                response
                    .error
                    .unwrap_or_else(|| "order association rejected".to_string()),
            ));
        }
        info!("Design {} associated with order {}", design_id, order_id);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
