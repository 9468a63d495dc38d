//! The capture flow: control detection, snapshot, artifact, clipboard.
//!
//! One [`CaptureFlow`] models one storefront session. Each `run` drives a
//! single capture from `Idle` through `Capturing` and `Producing` to a
//! terminal stage, then settles back to `Idle` for the next one.

use crate::clipboard::{ClipboardBackend, ClipboardPublisher, CopyOutcome};
use crate::error::{Error, Result};
use crate::page::{DesignPage, PageClient};
use crate::render::DesignImage;
use crate::snapshot::{DesignSnapshot, SnapshotExtractor};
use crate::store::{SavedDesignEntry, SessionRecord, StateStore};
use crate::tracking::{IdGenerator, TrackingCode};
use crate::trigger::TriggerDetector;
use crate::{new_producer, Artifact, ArtifactBackend, ArtifactProducer, CaptureConfig};
use chrono::Utc;
use log::{debug, error, info, warn};
use url::Url;

/// Stages of one capture interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    Idle,
    Capturing,
    Producing,
    Published,
    SavedLocally,
    Failed,
}

impl FlowStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStage::Published | FlowStage::SavedLocally | FlowStage::Failed)
    }
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Events emitted as the flow advances. Consumers render these however
/// they like; the flow never waits on them.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    StageChanged(FlowStage),
    /// The capture control was found; its own navigation is suppressed.
    ControlFound {
        label: String,
        suppressed_href: Option<String>,
    },
    SnapshotReady {
        total_pieces: u32,
        colors: usize,
    },
    ArtifactReady {
        share_text: String,
    },
    CopyFinished(CopyOutcome),
    Notice {
        level: NoticeLevel,
        message: String,
    },
}

/// Outcome of one finished capture.
#[derive(Debug, Clone)]
pub struct CaptureReport {
    /// Terminal stage of the capture. `Failed` together with an `Ok`
    /// return means the interaction was skipped or degraded, not that
    /// the call blew up.
    pub stage: FlowStage,
    pub session_id: String,
    pub tracking_code: Option<String>,
    pub artifact: Option<Artifact>,
    pub copy: Option<CopyOutcome>,
    /// Product page URL with the tracking code applied, when configured.
    pub checkout_url: Option<String>,
    /// Messages shown to the user along the way.
    pub notices: Vec<String>,
}

type EventHandler = Box<dyn Fn(&FlowEvent) + Send + Sync>;

/// Drives captures for one storefront session.
pub struct CaptureFlow {
    config: CaptureConfig,
    client: PageClient,
    detector: TriggerDetector,
    extractor: SnapshotExtractor,
    ids: IdGenerator,
    session_id: Option<String>,
    producer: Box<dyn ArtifactProducer>,
    clipboard: ClipboardPublisher,
    store: StateStore,
    product_url: Option<Url>,
    stage: FlowStage,
    on_event: Option<EventHandler>,
}

impl CaptureFlow {
    pub fn new(config: CaptureConfig) -> Result<Self> {
        let product_url = match &config.product_url {
            Some(raw) => Some(
                Url::parse(raw)
                    .map_err(|e| Error::ConfigError(format!("product URL '{}': {}", raw, e)))?,
            ),
            None => None,
        };

        let client = PageClient::new(&config)?;
        let detector = TriggerDetector::new(&config);
        let extractor = SnapshotExtractor::new(config.selectors.clone());
        let store = StateStore::new(&config.data_dir)?;
        let producer = new_producer(&config)?;
        let clipboard = ClipboardPublisher::new(&config.data_dir);
        let ids = IdGenerator::new(config.customer_email.clone());

        Ok(Self {
            config,
            client,
            detector,
            extractor,
            ids,
            session_id: None,
            producer,
            clipboard,
            store,
            product_url,
            stage: FlowStage::Idle,
            on_event: None,
        })
    }

    /// Register a handler for flow events. Replaces any previous one.
    pub fn on_event(&mut self, handler: EventHandler) {
        self.on_event = Some(handler);
    }

    pub fn clear_on_event(&mut self) {
        self.on_event = None;
    }

    /// Swap the clipboard writer, e.g. for environments without a
    /// clipboard utility.
    pub fn set_clipboard_backend(&mut self, backend: Box<dyn ClipboardBackend>) {
        self.clipboard = ClipboardPublisher::with_backend(backend, &self.config.data_dir);
    }

    pub fn stage(&self) -> FlowStage {
        self.stage
    }

    /// Session id of this flow, once the first capture minted it.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Run one capture against the design page at `url`.
    ///
    /// With `save_later` the design goes straight to the local queue
    /// instead of the configured artifact strategy.
    pub fn run(&mut self, url: &str, save_later: bool) -> Result<CaptureReport> {
        self.set_stage(FlowStage::Capturing);
        let mut notices = Vec::new();

        let (page, control) = match self.detector.wait_for_control(&self.client, url) {
            Ok(found) => found,
            Err(e) => {
                self.notice(
                    NoticeLevel::Error,
                    format!("Could not reach the design controls: {}", e),
                    &mut notices,
                );
                self.settle(FlowStage::Failed);
                return Err(e);
            }
        };
        self.emit(FlowEvent::ControlFound {
            label: control.label.clone(),
            suppressed_href: control.suppressed_href.clone(),
        });

        let needs_canvas =
            matches!(self.config.backend, ArtifactBackend::Local) && !save_later;

        let (page, render_ready) = if needs_canvas {
            self.detector.wait_for_render(&self.client, url, page)
        } else {
            (page, true)
        };
        if needs_canvas && !render_ready {
            self.notice(
                NoticeLevel::Info,
                "Design preview not ready; a placeholder image will be used.".to_string(),
                &mut notices,
            );
        }

        let session_id = self.ensure_session_id(&page);

        let snapshot = self.extractor.extract(&page, &session_id);
        if snapshot.is_empty() {
            warn!("No pieces on the page; nothing to capture");
            self.notice(
                NoticeLevel::Info,
                "No design pieces detected; nothing to capture.".to_string(),
                &mut notices,
            );
            // A skip, not an error: the interaction ends Failed, the call
            // itself succeeds.
            return Ok(self.finish(FlowStage::Failed, session_id, None, None, None, notices));
        }
        self.emit(FlowEvent::SnapshotReady {
            total_pieces: snapshot.total_pieces,
            colors: snapshot.piece_colors.len(),
        });

        let code = self.ids.tracking_code();
        self.set_stage(FlowStage::Producing);

        if save_later {
            return self.park_locally(code, snapshot, session_id, notices);
        }

        let canvas = if needs_canvas {
            self.decode_canvas(&page, &mut notices)
        } else {
            None
        };

        match self.producer.produce(&snapshot, &code, canvas.as_ref()) {
            Ok(artifact) => self.publish(artifact, code, session_id, notices),
            Err(Error::BackendError(msg)) => {
                self.notice(
                    NoticeLevel::Error,
                    format!("Save service unavailable: {}", msg),
                    &mut notices,
                );
                if self.config.local_fallback {
                    self.notice(
                        NoticeLevel::Info,
                        "Keeping the design on this device instead.".to_string(),
                        &mut notices,
                    );
                    self.park_locally(code, snapshot, session_id, notices)
                } else {
                    Ok(self.finish(
                        FlowStage::Failed,
                        session_id,
                        Some(code.as_str().to_string()),
                        None,
                        None,
                        notices,
                    ))
                }
            }
            Err(e) => {
                self.notice(
                    NoticeLevel::Error,
                    format!("Could not generate the design artifact: {}", e),
                    &mut notices,
                );
                self.settle(FlowStage::Failed);
                Err(e)
            }
        }
    }

    /// Designs currently parked in the save-for-later queue.
    pub fn saved_designs(&self) -> Result<Vec<SavedDesignEntry>> {
        self.store.saved_designs()
    }

    /// Bind a saved design to a storefront order. Falls back to the
    /// design id recorded by the most recent capture.
    pub fn associate_order(&mut self, order_id: &str, design_id: Option<&str>) -> Result<String> {
        let design_id = match design_id {
            Some(id) => id.to_string(),
            None => self.store.last_design()?.design_id.ok_or_else(|| {
                Error::ConfigError(
                    "no design id recorded; capture first or pass one explicitly".to_string(),
                )
            })?,
        };
        self.producer.associate_order(&design_id, order_id)?;
        Ok(design_id)
    }

    /// Tear down the flow, releasing any local artifacts.
    pub fn close(mut self) -> Result<()> {
        self.producer.close()
    }

    fn ensure_session_id(&mut self, page: &DesignPage) -> String {
        if let Some(id) = &self.session_id {
            return id.clone();
        }
        let identity = self
            .config
            .customer_email
            .clone()
            .or_else(|| self.extractor.customer_email(page));
        let generator = IdGenerator::new(identity);
        let id = generator.session_id();
        debug!("Capture session {}", id);
        self.ids = generator;
        self.session_id = Some(id.clone());
        id
    }

    fn decode_canvas(&self, page: &DesignPage, notices: &mut Vec<String>) -> Option<DesignImage> {
        let payload = page.attr(
            &self.config.selectors.canvas_id,
            &self.config.selectors.canvas_payload_attr,
        )?;
        if payload.trim().is_empty() {
            return None;
        }
        match DesignImage::from_canvas_payload(&payload) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("Canvas payload unusable: {}", e);
                self.notice(
                    NoticeLevel::Info,
                    "Design preview unreadable; a placeholder image will be used.".to_string(),
                    notices,
                );
                None
            }
        }
    }

    fn publish(
        &mut self,
        artifact: Artifact,
        code: TrackingCode,
        session_id: String,
        mut notices: Vec<String>,
    ) -> Result<CaptureReport> {
        if let Err(e) = self.store.record_session(&SessionRecord {
            tracking_code: Some(code.as_str().to_string()),
            design_id: artifact.design_id.clone(),
        }) {
            warn!("Session record not written: {}", e);
        }

        let share_text = artifact.share_text();
        self.emit(FlowEvent::ArtifactReady {
            share_text: share_text.clone(),
        });

        let copy = self.clipboard.publish(&share_text);
        match &copy {
            CopyOutcome::Copied => self.notice(
                NoticeLevel::Success,
                format!("Design {} ready; share text copied to the clipboard.", code),
                &mut notices,
            ),
            CopyOutcome::CopiedFallback { path } => self.notice(
                NoticeLevel::Info,
                format!("Clipboard unavailable; copy the share text from {}.", path.display()),
                &mut notices,
            ),
            CopyOutcome::Failed => self.notice(
                NoticeLevel::Error,
                "Automatic copy failed; take the share text from this report.".to_string(),
                &mut notices,
            ),
        }
        self.emit(FlowEvent::CopyFinished(copy.clone()));

        Ok(self.finish(
            FlowStage::Published,
            session_id,
            Some(code.as_str().to_string()),
            Some(artifact),
            Some(copy),
            notices,
        ))
    }

    fn park_locally(
        &mut self,
        code: TrackingCode,
        snapshot: DesignSnapshot,
        session_id: String,
        mut notices: Vec<String>,
    ) -> Result<CaptureReport> {
        let entry = SavedDesignEntry {
            tracking_code: code.as_str().to_string(),
            created_at: Utc::now(),
            design_data: snapshot,
        };
        let kept = match self.store.save_for_later(entry) {
            Ok(kept) => kept,
            Err(e) => {
                self.notice(
                    NoticeLevel::Error,
                    format!("Could not save the design on this device: {}", e),
                    &mut notices,
                );
                self.settle(FlowStage::Failed);
                return Err(e);
            }
        };
        if let Err(e) = self.store.record_session(&SessionRecord {
            tracking_code: Some(code.as_str().to_string()),
            design_id: None,
        }) {
            warn!("Session record not written: {}", e);
        }

        self.notice(
            NoticeLevel::Success,
            format!("Design {} saved on this device ({} kept).", code, kept.len()),
            &mut notices,
        );

        let copy = self.clipboard.publish(code.as_str());
        self.emit(FlowEvent::CopyFinished(copy.clone()));

        Ok(self.finish(
            FlowStage::SavedLocally,
            session_id,
            Some(code.as_str().to_string()),
            None,
            Some(copy),
            notices,
        ))
    }

    fn checkout_url(&self, code: &str) -> Option<String> {
        let mut url = self.product_url.clone()?;
        url.query_pairs_mut().append_pair("visubloq_code", code);
        Some(url.to_string())
    }

    fn finish(
        &mut self,
        stage: FlowStage,
        session_id: String,
        tracking_code: Option<String>,
        artifact: Option<Artifact>,
        copy: Option<CopyOutcome>,
        notices: Vec<String>,
    ) -> CaptureReport {
        let checkout_url = match (&tracking_code, stage) {
            (Some(code), FlowStage::Published | FlowStage::SavedLocally) => {
                self.checkout_url(code)
            }
            _ => None,
        };

        self.set_stage(stage);
        let report = CaptureReport {
            stage,
            session_id,
            tracking_code,
            artifact,
            copy,
            checkout_url,
            notices,
        };
        self.set_stage(FlowStage::Idle);
        report
    }

    fn settle(&mut self, terminal: FlowStage) {
        self.set_stage(terminal);
        self.set_stage(FlowStage::Idle);
    }

    fn set_stage(&mut self, stage: FlowStage) {
        if self.stage != stage {
            debug!("Flow stage {:?} -> {:?}", self.stage, stage);
            self.stage = stage;
            self.emit(FlowEvent::StageChanged(stage));
        }
    }

    fn emit(&self, event: FlowEvent) {
        if let Some(handler) = &self.on_event {
            handler(&event);
        }
    }

    fn notice(&self, level: NoticeLevel, message: String, notices: &mut Vec<String>) {
        match level {
            NoticeLevel::Error => error!("{}", message),
            NoticeLevel::Info | NoticeLevel::Success => info!("{}", message),
        }
        self.emit(FlowEvent::Notice {
            level,
            message: message.clone(),
        });
        notices.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow_with(config: CaptureConfig) -> CaptureFlow {
        CaptureFlow::new(config).unwrap()
    }

    #[test]
    fn test_new_flow_starts_idle() {
        let dir = tempfile::tempdir().unwrap();
        let flow = flow_with(CaptureConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        assert_eq!(flow.stage(), FlowStage::Idle);
        assert_eq!(flow.session_id(), None);
    }

    #[test]
    fn test_invalid_product_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = CaptureFlow::new(CaptureConfig {
            data_dir: dir.path().to_path_buf(),
            product_url: Some("::nope::".to_string()),
            ..Default::default()
        });
        match result {
            Err(Error::ConfigError(_)) => {}
            _ => panic!("expected config error"),
        }
    }

    #[test]
    fn test_checkout_url_appends_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut flow = flow_with(CaptureConfig {
            data_dir: dir.path().to_path_buf(),
            product_url: Some("https://visubloq.com/products/custom?variant=1".to_string()),
            ..Default::default()
        });
        let code = flow.ids.tracking_code();
        let url = flow.checkout_url(code.as_str()).unwrap();
        assert!(url.starts_with("https://visubloq.com/products/custom?"));
        assert!(url.contains("variant=1"));
        assert!(url.contains(&format!("visubloq_code={}", code.as_str())));
    }

    #[test]
    fn test_stage_terminality() {
        assert!(FlowStage::Published.is_terminal());
        assert!(FlowStage::SavedLocally.is_terminal());
        assert!(FlowStage::Failed.is_terminal());
        assert!(!FlowStage::Idle.is_terminal());
        assert!(!FlowStage::Capturing.is_terminal());
        assert!(!FlowStage::Producing.is_terminal());
    }

    #[test]
    fn test_associate_without_recorded_design_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut flow = flow_with(CaptureConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        match flow.associate_order("ORD-1", None) {
            Err(Error::ConfigError(_)) => {}
            _ => panic!("expected config error"),
        }
    }
}
