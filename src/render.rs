//! Mosaic raster helpers.
//!
//! The storefront mirrors its rendered canvas into a base64 payload on the
//! page; this module decodes that payload, synthesizes a stud-grid
//! placeholder when the payload is absent, and encodes PNG bytes for the
//! local artifact strategy.

use crate::error::{Error, Result};
use crate::snapshot::DesignSnapshot;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{imageops, DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;

const PLACEHOLDER_CELLS: u32 = 10;
const PLACEHOLDER_CELL_PX: u32 = 20;
const STUD_RADIUS: i32 = 6;

/// Decoded pixels of a design image.
#[derive(Debug, Clone)]
pub struct DesignImage {
    pixels: RgbaImage,
}

impl DesignImage {
    pub fn from_pixels(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Decode a canvas payload: either a `data:image/...;base64,` URL or
    /// bare base64 image bytes.
    pub fn from_canvas_payload(payload: &str) -> Result<Self> {
        let trimmed = payload.trim();
        let encoded = match trimmed.split_once("base64,") {
            Some((_, rest)) => rest,
            None if trimmed.starts_with("data:") => {
                return Err(Error::RenderError("canvas payload is not base64".into()))
            }
            None => trimmed,
        };
        let cleaned: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| Error::RenderError(format!("canvas payload: {}", e)))?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| Error::RenderError(format!("canvas image: {}", e)))?;
        Ok(Self {
            pixels: decoded.to_rgba8(),
        })
    }

    /// Deterministic stud-grid stand-in built from the snapshot's colors,
    /// used when the page never exposed a canvas payload.
    pub fn placeholder(snapshot: &DesignSnapshot) -> Self {
        let size = PLACEHOLDER_CELLS * PLACEHOLDER_CELL_PX;
        let mut pixels = RgbaImage::from_pixel(size, size, Rgba([245, 245, 245, 255]));

        let cells = cell_colors(snapshot);
        for (idx, color) in cells.iter().enumerate() {
            let cx = (idx as u32 % PLACEHOLDER_CELLS) * PLACEHOLDER_CELL_PX;
            let cy = (idx as u32 / PLACEHOLDER_CELLS) * PLACEHOLDER_CELL_PX;
            draw_stud(&mut pixels, cx, cy, *color);
        }

        Self { pixels }
    }

    /// Encode as PNG bytes.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(self.pixels.clone())
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .map_err(|e| Error::RenderError(format!("PNG encode: {}", e)))?;
        Ok(bytes)
    }

    /// Downscaled copy capped at `max_width`, aspect preserved.
    pub fn preview(&self, max_width: u32) -> Self {
        if self.width() <= max_width || self.width() == 0 {
            return self.clone();
        }
        let height = (self.height() as u64 * max_width as u64 / self.width() as u64).max(1) as u32;
        Self {
            pixels: imageops::resize(&self.pixels, max_width, height, imageops::FilterType::Triangle),
        }
    }
}

/// Spread the snapshot's colors over the placeholder grid, each color
/// claiming cells proportional to its piece count.
fn cell_colors(snapshot: &DesignSnapshot) -> Vec<Rgba<u8>> {
    let cell_count = (PLACEHOLDER_CELLS * PLACEHOLDER_CELLS) as usize;
    if snapshot.piece_colors.is_empty() {
        return vec![Rgba([200, 200, 200, 255]); cell_count];
    }

    let total: u64 = snapshot.piece_colors.values().map(|&c| c as u64).sum::<u64>().max(1);
    let mut cells = Vec::with_capacity(cell_count);
    for (name, &count) in &snapshot.piece_colors {
        let share = ((count as u64 * cell_count as u64) / total).max(1) as usize;
        let color = brick_color(name);
        for _ in 0..share {
            if cells.len() == cell_count {
                break;
            }
            cells.push(color);
        }
    }
    let pad = *cells.last().unwrap_or(&Rgba([200, 200, 200, 255]));
    while cells.len() < cell_count {
        cells.push(pad);
    }
    cells
}

fn draw_stud(pixels: &mut RgbaImage, cx: u32, cy: u32, color: Rgba<u8>) {
    let cell = PLACEHOLDER_CELL_PX;
    for dy in 0..cell {
        for dx in 0..cell {
            pixels.put_pixel(cx + dx, cy + dy, color);
        }
    }
    // Lightened circle in the cell center reads as the stud.
    let center = cell as i32 / 2;
    for dy in 0..cell as i32 {
        for dx in 0..cell as i32 {
            let ddx = dx - center;
            let ddy = dy - center;
            if ddx * ddx + ddy * ddy <= STUD_RADIUS * STUD_RADIUS {
                let lightened = Rgba([
                    lighten(color.0[0]),
                    lighten(color.0[1]),
                    lighten(color.0[2]),
                    255,
                ]);
                pixels.put_pixel(cx + dx as u32, cy + dy as u32, lightened);
            }
        }
    }
}

fn lighten(channel: u8) -> u8 {
    channel.saturating_add((255 - channel) / 3)
}

/// Display color for a storefront brick color name. Unknown names map to
/// a stable palette entry so placeholders stay deterministic.
pub fn brick_color(name: &str) -> Rgba<u8> {
    match name.to_ascii_lowercase().as_str() {
        "red" => Rgba([196, 40, 27, 255]),
        "dark red" => Rgba([123, 46, 47, 255]),
        "blue" => Rgba([13, 105, 172, 255]),
        "dark blue" => Rgba([32, 58, 86, 255]),
        "yellow" => Rgba([245, 205, 47, 255]),
        "green" => Rgba([40, 127, 70, 255]),
        "lime" => Rgba([164, 189, 70, 255]),
        "black" => Rgba([27, 42, 52, 255]),
        "white" => Rgba([242, 243, 242, 255]),
        "orange" => Rgba([218, 133, 64, 255]),
        "brown" => Rgba([105, 64, 39, 255]),
        "tan" => Rgba([222, 198, 156, 255]),
        "light gray" | "light bluish gray" => Rgba([160, 165, 169, 255]),
        "dark gray" | "dark bluish gray" => Rgba([99, 95, 97, 255]),
        "pink" => Rgba([230, 178, 206, 255]),
        "purple" => Rgba([123, 46, 146, 255]),
        other => {
            const FALLBACK: [[u8; 3]; 6] = [
                [196, 40, 27],
                [13, 105, 172],
                [245, 205, 47],
                [40, 127, 70],
                [218, 133, 64],
                [123, 46, 146],
            ];
            let idx = other.bytes().fold(0usize, |acc, b| acc + b as usize) % FALLBACK.len();
            let [r, g, b] = FALLBACK[idx];
            Rgba([r, g, b, 255])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{DesignConfig, DesignSnapshot};
    use std::collections::BTreeMap;

    fn snapshot(colors: &[(&str, u32)]) -> DesignSnapshot {
        let mut pieces = BTreeMap::new();
        for (name, count) in colors {
            pieces.insert(name.to_string(), *count);
        }
        DesignSnapshot::new("vb_test", pieces, DesignConfig::default())
    }

    #[test]
    fn test_placeholder_dimensions_and_determinism() {
        let snap = snapshot(&[("Red", 30), ("Blue", 10)]);
        let a = DesignImage::placeholder(&snap);
        let b = DesignImage::placeholder(&snap);
        assert_eq!(a.width(), 200);
        assert_eq!(a.height(), 200);
        assert_eq!(a.to_png().unwrap(), b.to_png().unwrap());
    }

    #[test]
    fn test_png_magic_bytes() {
        let png = DesignImage::placeholder(&snapshot(&[("Red", 1)]))
            .to_png()
            .unwrap();
        assert_eq!(&png[..8], &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn test_canvas_payload_roundtrip() {
        let original = DesignImage::placeholder(&snapshot(&[("Green", 5)]));
        let png = original.to_png().unwrap();
        let payload = format!("data:image/png;base64,{}", STANDARD.encode(&png));

        let decoded = DesignImage::from_canvas_payload(&payload).unwrap();
        assert_eq!(decoded.width(), original.width());
        assert_eq!(decoded.height(), original.height());

        // Bare base64 without the data-URL wrapper also decodes.
        let bare = DesignImage::from_canvas_payload(&STANDARD.encode(&png)).unwrap();
        assert_eq!(bare.width(), original.width());
    }

    #[test]
    fn test_invalid_payload_is_render_error() {
        match DesignImage::from_canvas_payload("!!not-base64!!") {
            Err(Error::RenderError(_)) => {}
            other => panic!("expected render error, got {:?}", other.map(|i| i.width())),
        }
    }

    #[test]
    fn test_preview_caps_width() {
        let snap = snapshot(&[("Red", 4)]);
        let image = DesignImage::placeholder(&snap);
        let preview = image.preview(50);
        assert_eq!(preview.width(), 50);
        assert_eq!(preview.height(), 50);

        // Already small enough: untouched.
        let same = image.preview(400);
        assert_eq!(same.width(), 200);
    }

    #[test]
    fn test_unknown_color_is_stable() {
        assert_eq!(brick_color("Chartreuse"), brick_color("Chartreuse"));
        assert_eq!(brick_color("Red"), Rgba([196, 40, 27, 255]));
    }
}
