//! Detection of the generate-instructions control and render readiness.
//!
//! Both waits are bounded by the configured poll schedule. The control's
//! own navigation target is recorded but never followed; the capture
//! flow replaces it entirely.

use crate::error::{Error, Result};
use crate::page::{DesignPage, PageClient};
use crate::{CaptureConfig, PageSelectors};
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

/// How a control was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Matched by element id.
    Id,
    /// Matched by visible text.
    Phrase,
}

/// The intercepted control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlHandle {
    pub label: String,
    pub matched_by: MatchRule,
    /// Navigation the control would have performed on its own.
    pub suppressed_href: Option<String>,
}

/// Polls the page for the capture control and the render-complete marker.
pub struct TriggerDetector {
    selectors: PageSelectors,
    poll_interval: Duration,
    poll_attempts: u32,
    timeout_ms: u64,
}

impl TriggerDetector {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            selectors: config.selectors.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_attempts: config.poll_attempts.max(1),
            timeout_ms: config.poll_interval_ms.saturating_mul(config.poll_attempts.max(1) as u64),
        }
    }

    /// One detection pass. The id match wins over the phrase match and at
    /// most one handle comes back per pass.
    pub fn locate(&self, page: &DesignPage) -> Option<ControlHandle> {
        if let Some(control) = page.control_by_id(&self.selectors.control_id) {
            return Some(ControlHandle {
                label: control.label,
                matched_by: MatchRule::Id,
                suppressed_href: control.href,
            });
        }
        page.control_by_phrase(&self.selectors.control_phrase)
            .map(|control| ControlHandle {
                label: control.label,
                matched_by: MatchRule::Phrase,
                suppressed_href: control.href,
            })
    }

    /// Fetch `url` until the control shows up. Errors with
    /// [`Error::Timeout`] once the configured attempts are spent.
    pub fn wait_for_control(
        &self,
        client: &PageClient,
        url: &str,
    ) -> Result<(DesignPage, ControlHandle)> {
        let mut last_err: Option<Error> = None;
        for attempt in 1..=self.poll_attempts {
            match client.fetch(url) {
                Ok(page) => {
                    last_err = None;
                    if let Some(control) = self.locate(&page) {
                        info!(
                            "Capture control '{}' found on attempt {} ({})",
                            control.label,
                            attempt,
                            match control.matched_by {
                                MatchRule::Id => "by id",
                                MatchRule::Phrase => "by text",
                            }
                        );
                        return Ok((page, control));
                    }
                    debug!("Attempt {}: control not present yet", attempt);
                }
                Err(e) => {
                    warn!("Attempt {}: {}", attempt, e);
                    last_err = Some(e);
                }
            }
            if attempt < self.poll_attempts {
                thread::sleep(self.poll_interval);
            }
        }
        match last_err {
            // The final fetch itself failed; that error beats a bare timeout.
            Some(e) => Err(e),
            None => Err(Error::Timeout(self.timeout_ms)),
        }
    }

    /// Poll until the canvas payload marker is present. Returns the most
    /// recent page and whether the marker ever appeared; the capture
    /// proceeds either way.
    pub fn wait_for_render(
        &self,
        client: &PageClient,
        url: &str,
        page: DesignPage,
    ) -> (DesignPage, bool) {
        if self.render_ready(&page) {
            return (page, true);
        }

        let mut latest = page;
        for attempt in 1..=self.poll_attempts {
            thread::sleep(self.poll_interval);
            match client.fetch(url) {
                Ok(fresh) => {
                    let ready = self.render_ready(&fresh);
                    latest = fresh;
                    if ready {
                        debug!("Render marker present on attempt {}", attempt);
                        return (latest, true);
                    }
                }
                Err(e) => warn!("Render poll {}: {}", attempt, e),
            }
        }
        info!("Render marker never appeared; continuing without it");
        (latest, false)
    }

    fn render_ready(&self, page: &DesignPage) -> bool {
        page.attr(&self.selectors.canvas_id, &self.selectors.canvas_payload_attr)
            .map(|payload| !payload.trim().is_empty())
            .unwrap_or(false)
    }
}
