//! Design snapshot extraction from a loaded storefront page.
//!
//! Extraction only reads the page; it never mutates host state. Missing
//! DOM pieces degrade to documented fallbacks instead of failing.

use crate::page::DesignPage;
use crate::PageSelectors;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fallback mosaic dimension when a size slider is absent.
pub const DEFAULT_DIMENSION: i32 = 50;
/// Fallback when an adjustment slider is absent.
pub const DEFAULT_ADJUSTMENT: i32 = 0;

/// Mosaic parameters read from the page sliders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignConfig {
    pub width: i32,
    pub height: i32,
    /// `"{width}x{height}"`, kept alongside the split fields for the wire.
    pub resolution: String,
    pub saturation: i32,
    pub brightness: i32,
    pub contrast: i32,
    pub timestamp: DateTime<Utc>,
}

impl DesignConfig {
    pub fn new(width: i32, height: i32, saturation: i32, brightness: i32, contrast: i32) -> Self {
        Self {
            width,
            height,
            resolution: format!("{}x{}", width, height),
            saturation,
            brightness,
            contrast,
            timestamp: Utc::now(),
        }
    }
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_DIMENSION,
            DEFAULT_DIMENSION,
            DEFAULT_ADJUSTMENT,
            DEFAULT_ADJUSTMENT,
            DEFAULT_ADJUSTMENT,
        )
    }
}

/// Everything the save endpoint needs to reproduce a design.
///
/// Field names are the wire contract; the save endpoint matches on them
/// verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSnapshot {
    pub session_id: String,
    /// Color name to piece count. Ordered so serialization is stable.
    pub piece_colors: BTreeMap<String, u32>,
    #[serde(rename = "visubloq_config")]
    pub config: DesignConfig,
    pub total_pieces: u32,
}

impl DesignSnapshot {
    pub fn new(
        session_id: impl Into<String>,
        piece_colors: BTreeMap<String, u32>,
        config: DesignConfig,
    ) -> Self {
        let total_pieces = piece_colors.values().sum();
        Self {
            session_id: session_id.into(),
            piece_colors,
            config,
            total_pieces,
        }
    }

    /// A snapshot with no pieces captures nothing worth keeping.
    pub fn is_empty(&self) -> bool {
        self.total_pieces == 0
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.config.timestamp
    }
}

/// Reads the pieces table and sliders into a [`DesignSnapshot`].
pub struct SnapshotExtractor {
    selectors: PageSelectors,
}

impl SnapshotExtractor {
    pub fn new(selectors: PageSelectors) -> Self {
        Self { selectors }
    }

    pub fn extract(&self, page: &DesignPage, session_id: &str) -> DesignSnapshot {
        let piece_colors = self.extract_pieces(page);
        let config = self.extract_config(page);
        DesignSnapshot::new(session_id, piece_colors, config)
    }

    /// Customer identity exposed by the page, if the host publishes one.
    pub fn customer_email(&self, page: &DesignPage) -> Option<String> {
        page.meta_content(&self.selectors.customer_meta_name)
    }

    /// Rows need at least a name cell and a count cell; the count lives in
    /// the last cell so extra middle columns are tolerated. Zero counts
    /// are dropped, malformed counts read as zero, and a repeated color
    /// name overwrites the earlier row.
    fn extract_pieces(&self, page: &DesignPage) -> BTreeMap<String, u32> {
        let mut pieces = BTreeMap::new();
        for row in page.table_rows(&self.selectors.pieces_table_id) {
            if row.len() < 2 {
                continue;
            }
            let color = row[0].trim();
            if color.is_empty() {
                continue;
            }
            let count = row
                .last()
                .map(|cell| cell.trim().parse::<u32>().unwrap_or(0))
                .unwrap_or(0);
            if count == 0 {
                continue;
            }
            if pieces.insert(color.to_string(), count).is_some() {
                warn!("Duplicate color row '{}'; keeping the later count", color);
            }
        }
        pieces
    }

    fn extract_config(&self, page: &DesignPage) -> DesignConfig {
        let sel = &self.selectors;
        DesignConfig::new(
            page.slider_value(&sel.width_slider_id)
                .unwrap_or(DEFAULT_DIMENSION),
            page.slider_value(&sel.height_slider_id)
                .unwrap_or(DEFAULT_DIMENSION),
            page.slider_value(&sel.saturation_slider_id)
                .unwrap_or(DEFAULT_ADJUSTMENT),
            page.slider_value(&sel.brightness_slider_id)
                .unwrap_or(DEFAULT_ADJUSTMENT),
            page.slider_value(&sel.contrast_slider_id)
                .unwrap_or(DEFAULT_ADJUSTMENT),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> SnapshotExtractor {
        SnapshotExtractor::new(PageSelectors::default())
    }

    fn page(body: &str) -> DesignPage {
        DesignPage::from_html(format!("<html><body>{}</body></html>", body), "http://test.local/")
    }

    #[test]
    fn test_extract_pieces_drops_zero_and_malformed() {
        let page = page(
            r#"<table><tbody id="studs-used-table-body">
                <tr><td>Red</td><td>1x1</td><td>12</td></tr>
                <tr><td>Blue</td><td>1x1</td><td>0</td></tr>
                <tr><td>Green</td><td>1x1</td><td>lots</td></tr>
                <tr><td>White</td><td>7</td></tr>
            </tbody></table>"#,
        );
        let snapshot = extractor().extract(&page, "vb_test");

        let mut expected = BTreeMap::new();
        expected.insert("Red".to_string(), 12);
        expected.insert("White".to_string(), 7);
        assert_eq!(snapshot.piece_colors, expected);
        assert_eq!(snapshot.total_pieces, 19);
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_extract_pieces_last_duplicate_wins() {
        let page = page(
            r#"<table><tbody id="studs-used-table-body">
                <tr><td>Red</td><td>3</td></tr>
                <tr><td>Red</td><td>9</td></tr>
            </tbody></table>"#,
        );
        let snapshot = extractor().extract(&page, "vb_test");
        assert_eq!(snapshot.piece_colors.get("Red"), Some(&9));
        assert_eq!(snapshot.total_pieces, 9);
    }

    #[test]
    fn test_missing_table_yields_empty_snapshot() {
        let page = page("<p>nothing here</p>");
        let snapshot = extractor().extract(&page, "vb_test");
        assert!(snapshot.is_empty());
        assert!(snapshot.piece_colors.is_empty());
    }

    #[test]
    fn test_config_fallbacks_when_sliders_missing() {
        let page = page(r#"<input id="width-slider" value="32">"#);
        let snapshot = extractor().extract(&page, "vb_test");

        assert_eq!(snapshot.config.width, 32);
        assert_eq!(snapshot.config.height, DEFAULT_DIMENSION);
        assert_eq!(snapshot.config.resolution, "32x50");
        assert_eq!(snapshot.config.saturation, DEFAULT_ADJUSTMENT);
        assert_eq!(snapshot.config.brightness, DEFAULT_ADJUSTMENT);
        assert_eq!(snapshot.config.contrast, DEFAULT_ADJUSTMENT);
    }

    #[test]
    fn test_zero_slider_value_is_kept() {
        let page = page(
            r#"<input id="saturation-slider" value="0">
               <input id="brightness-slider" value="-20">"#,
        );
        let snapshot = extractor().extract(&page, "vb_test");
        assert_eq!(snapshot.config.saturation, 0);
        assert_eq!(snapshot.config.brightness, -20);
    }

    #[test]
    fn test_wire_shape() {
        let mut pieces = BTreeMap::new();
        pieces.insert("Red".to_string(), 3);
        let snapshot = DesignSnapshot::new("vb_abc_1", pieces, DesignConfig::default());

        let value = serde_json::to_value(&snapshot).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["piece_colors", "session_id", "total_pieces", "visubloq_config"]
        );
        assert_eq!(value["total_pieces"], 3);
        assert_eq!(value["visubloq_config"]["resolution"], "50x50");
    }

    #[test]
    fn test_customer_email_from_meta() {
        let page = DesignPage::from_html(
            r#"<html><head><meta name="customer-email" content="b@c.d"></head><body></body></html>"#,
            "http://test.local/",
        );
        assert_eq!(extractor().customer_email(&page).as_deref(), Some("b@c.d"));
    }
}
