//! StudLink
//!
//! Checkout-assist capture for brick-mosaic storefront pages. StudLink
//! loads a design page, waits for the generate-instructions control,
//! snapshots the configured mosaic, and turns it into a shareable
//! artifact: either a locally produced PNG or a design id persisted
//! through the storefront's save endpoint. The share text lands on the
//! clipboard and designs can be parked in a small local queue for later
//! checkout.
//!
//! # Example
//!
//! ```no_run
//! use studlink::flow::CaptureFlow;
//! use studlink::{ArtifactBackend, CaptureConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CaptureConfig {
//!     backend: ArtifactBackend::Remote {
//!         endpoint: "https://visubloq.com/api/save-design-data.php".to_string(),
//!     },
//!     ..Default::default()
//! };
//!
//! let mut flow = CaptureFlow::new(config)?;
//! let report = flow.run("https://visubloq.com/pages/designer", false)?;
//! if let Some(code) = &report.tracking_code {
//!     println!("Design code: {}", code);
//! }
//! flow.close()?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

pub mod error;
pub use error::{Error, Result};

// Page fetching and DOM queries
pub mod page;

// Control detection and readiness polling
pub mod trigger;

// Design snapshot extraction
pub mod snapshot;

// Tracking codes and session ids
pub mod tracking;

// Mosaic raster helpers (canvas payload decode, placeholder, PNG)
pub mod render;

// Artifact strategies
pub mod local_artifact;
pub mod remote_artifact;

// Clipboard publishing
pub mod clipboard;

// Save-for-later queue and session state
pub mod store;

// The capture flow itself
pub mod flow;

// Async-friendly facade (worker-backed)
pub mod async_api;

// Re-export the facade at the crate root for ergonomic examples
pub use async_api::Assist;

use snapshot::DesignSnapshot;
use tracking::TrackingCode;

/// Which artifact strategy a deployment uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactBackend {
    /// Produce a PNG blob on this machine; no network involved.
    Local,
    /// Persist the snapshot through the remote save endpoint.
    Remote { endpoint: String },
}

/// DOM naming contract of the host storefront page.
#[derive(Debug, Clone)]
pub struct PageSelectors {
    /// Id of the generate-instructions control.
    pub control_id: String,
    /// Fallback phrase matched against button and anchor text.
    pub control_phrase: String,
    /// Tbody id of the pieces table.
    pub pieces_table_id: String,
    pub width_slider_id: String,
    pub height_slider_id: String,
    pub saturation_slider_id: String,
    pub brightness_slider_id: String,
    pub contrast_slider_id: String,
    /// Id of the mosaic canvas element.
    pub canvas_id: String,
    /// Attribute the host mirrors the rendered canvas into. Doubles as
    /// the render-complete marker.
    pub canvas_payload_attr: String,
    /// Meta tag name carrying the customer identity, when published.
    pub customer_meta_name: String,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            control_id: "download-instructions-button".to_string(),
            control_phrase: "Generate Instructions".to_string(),
            pieces_table_id: "studs-used-table-body".to_string(),
            width_slider_id: "width-slider".to_string(),
            height_slider_id: "height-slider".to_string(),
            saturation_slider_id: "saturation-slider".to_string(),
            brightness_slider_id: "brightness-slider".to_string(),
            contrast_slider_id: "contrast-slider".to_string(),
            canvas_id: "step-4-canvas".to_string(),
            canvas_payload_attr: "data-image".to_string(),
            customer_meta_name: "customer-email".to_string(),
        }
    }
}

/// Configuration for a capture flow.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Artifact strategy.
    pub backend: ArtifactBackend,
    /// Product page the tracking code is meant to be applied to. When
    /// set, reports include a ready-made checkout URL.
    pub product_url: Option<String>,
    /// Customer identity, when the integration knows it up front.
    pub customer_email: Option<String>,
    /// User agent for storefront requests.
    pub user_agent: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Delay between readiness polls in milliseconds.
    pub poll_interval_ms: u64,
    /// Readiness polls before giving up.
    pub poll_attempts: u32,
    /// Directory for the save queue, session state, and local artifacts.
    pub data_dir: PathBuf,
    /// Park the design locally when the remote save endpoint fails.
    pub local_fallback: bool,
    /// DOM naming contract of the host page.
    pub selectors: PageSelectors,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: ArtifactBackend::Local,
            product_url: None,
            customer_email: None,
            user_agent: "Mozilla/5.0 (compatible; StudLink/0.1)".to_string(),
            timeout_ms: 30000,
            poll_interval_ms: 1000,
            poll_attempts: 10,
            data_dir: default_data_dir(),
            local_fallback: true,
            selectors: PageSelectors::default(),
        }
    }
}

/// `STUDLINK_DATA_DIR` when set, a studlink directory under the system
/// temp dir otherwise.
pub fn default_data_dir() -> PathBuf {
    std::env::var_os("STUDLINK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("studlink"))
}

/// A transient locally stored blob backing an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    /// Producer-scoped handle id.
    pub id: u64,
    /// Where the PNG lives until released.
    pub path: PathBuf,
    /// `file://` URL for the blob.
    pub url: String,
}

/// Where an artifact's content lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLink {
    /// Stable URL served by the storefront backend.
    Remote(String),
    /// Blob on this machine, bounded to the producer's lifetime.
    Local(BlobHandle),
}

/// How far an artifact got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// Produced locally; nothing persisted remotely.
    Generated,
    /// Persisted by the remote backend.
    Saved,
    /// Production failed.
    Failed,
}

/// A shareable result of one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// The tracking code this artifact was produced under.
    pub tracking_code: String,
    pub link: ArtifactLink,
    pub status: ArtifactStatus,
    /// Backend-assigned design id, remote strategy only.
    pub design_id: Option<String>,
    /// Hex SHA-256 of the blob bytes, local strategy only.
    pub digest: Option<String>,
}

impl Artifact {
    /// What goes on the clipboard: the artifact URL when one is shareable
    /// off this machine, the tracking code otherwise.
    pub fn share_text(&self) -> String {
        match &self.link {
            ArtifactLink::Remote(url) => url.clone(),
            ArtifactLink::Local(_) => self.tracking_code.clone(),
        }
    }
}

/// An artifact production strategy.
///
/// Producers own whatever resources back their artifacts; releasing and
/// closing are explicit so blob lifetimes stay bounded.
pub trait ArtifactProducer {
    /// Strategy name for logs and reports.
    fn name(&self) -> &'static str;

    /// Turn a snapshot into a shareable artifact.
    fn produce(
        &mut self,
        snapshot: &DesignSnapshot,
        code: &TrackingCode,
        canvas: Option<&render::DesignImage>,
    ) -> Result<Artifact>;

    /// Release the resources behind one artifact. No-op for strategies
    /// that hold nothing locally.
    fn release(&mut self, artifact: &Artifact) -> Result<()> {
        let _ = artifact;
        Ok(())
    }

    /// Bind a persisted design to a storefront order.
    fn associate_order(&self, design_id: &str, order_id: &str) -> Result<()> {
        let _ = (design_id, order_id);
        Err(Error::ConfigError(
            "this artifact strategy does not support order association".to_string(),
        ))
    }

    /// Tear down, releasing anything still held.
    fn close(&mut self) -> Result<()>;
}

/// Create the producer for the configured backend.
pub fn new_producer(config: &CaptureConfig) -> Result<Box<dyn ArtifactProducer>> {
    match &config.backend {
        ArtifactBackend::Local => Ok(Box::new(local_artifact::LocalBlobProducer::new(config)?)),
        ArtifactBackend::Remote { endpoint } => Ok(Box::new(
            remote_artifact::RemoteSaveProducer::new(config, endpoint)?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();
        assert_eq!(config.backend, ArtifactBackend::Local);
        assert_eq!(config.timeout_ms, 30000);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.poll_attempts, 10);
        assert!(config.local_fallback);
        assert_eq!(config.selectors.control_id, "download-instructions-button");
        assert_eq!(config.selectors.canvas_payload_attr, "data-image");
    }

    #[test]
    fn test_share_text_prefers_remote_url() {
        let remote = Artifact {
            tracking_code: "VB-20260823-ABC123".to_string(),
            link: ArtifactLink::Remote("https://visubloq.com/pdfs/VB-20260823-ABC123.pdf".to_string()),
            status: ArtifactStatus::Saved,
            design_id: Some("design-1".to_string()),
            digest: None,
        };
        assert_eq!(
            remote.share_text(),
            "https://visubloq.com/pdfs/VB-20260823-ABC123.pdf"
        );

        let local = Artifact {
            tracking_code: "VB-20260823-ABC123".to_string(),
            link: ArtifactLink::Local(BlobHandle {
                id: 1,
                path: PathBuf::from("/tmp/x.png"),
                url: "file:///tmp/x.png".to_string(),
            }),
            status: ArtifactStatus::Generated,
            design_id: None,
            digest: Some("deadbeef".to_string()),
        };
        assert_eq!(local.share_text(), "VB-20260823-ABC123");
    }

    #[test]
    fn test_new_producer_selects_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let producer = new_producer(&config).unwrap();
        assert_eq!(producer.name(), "local-blob");

        let config = CaptureConfig {
            backend: ArtifactBackend::Remote {
                endpoint: "https://visubloq.com/api/save-design-data.php".to_string(),
            },
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let producer = new_producer(&config).unwrap();
        assert_eq!(producer.name(), "remote-save");
    }
}
