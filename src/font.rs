use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use image::{Rgb, RgbImage};

use crate::error::{ConvertError, Result};
use crate::raster::GlyphPainter;

/// Monospace fonts commonly installed on Linux, macOS and Windows, in the
/// order they are tried.
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu-sans-mono-fonts/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/usr/share/fonts/liberation-mono/LiberationMono-Regular.ttf",
    "/usr/share/fonts/truetype/ubuntu/UbuntuMono-R.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansMono-Regular.ttf",
    "/System/Library/Fonts/Menlo.ttc",
    "/System/Library/Fonts/Monaco.ttf",
    "/Library/Fonts/Courier New.ttf",
    "C:\\Windows\\Fonts\\consola.ttf",
    "C:\\Windows\\Fonts\\cour.ttf",
];

/// Pick the font file to draw with: the configured one if given, otherwise
/// the first system candidate that exists.
pub fn resolve_font_path(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ConvertError::Font(format!(
            "font file {} does not exist",
            path.display()
        )));
    }
    SYSTEM_FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .ok_or_else(|| {
            ConvertError::Font(format!(
                "no monospace font found (tried {}); pass one with --font or set font_path",
                SYSTEM_FONT_CANDIDATES.join(", ")
            ))
        })
}

/// Coverage of one glyph drawn with its baseline origin at (0, 0).
#[derive(Debug, Clone)]
struct GlyphMask {
    left: i32,
    top: i32,
    width: u32,
    height: u32,
    coverage: Vec<f32>,
}

/// Anti-aliased glyph painter backed by a TrueType/OpenType font.
///
/// Glyphs are always placed at whole-pixel origins, so each glyph is
/// rasterized once and its coverage mask reused for every cell.
pub struct FontPainter {
    font: FontVec,
    scale: PxScale,
    masks: HashMap<char, Option<GlyphMask>>,
}

impl FontPainter {
    pub fn from_file(path: &Path, px_height: f32) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            ConvertError::Font(format!("reading font {}: {}", path.display(), e))
        })?;
        Self::from_bytes(bytes, px_height)
            .map_err(|e| ConvertError::Font(format!("{} ({})", e, path.display())))
    }

    pub fn from_bytes(bytes: Vec<u8>, px_height: f32) -> Result<Self> {
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| ConvertError::Font(format!("invalid font data: {}", e)))?;
        Ok(Self {
            font,
            scale: PxScale::from(px_height),
            masks: HashMap::new(),
        })
    }

    pub fn px_height(&self) -> f32 {
        self.scale.y
    }

    /// Widest horizontal advance among `glyphs`, in pixels.
    pub fn max_advance(&self, glyphs: &[char]) -> f32 {
        let scaled = self.font.as_scaled(self.scale);
        glyphs
            .iter()
            .map(|&c| scaled.h_advance(scaled.glyph_id(c)))
            .fold(0.0, f32::max)
    }

    fn mask(&mut self, glyph: char) -> Option<&GlyphMask> {
        let font = &self.font;
        let scale = self.scale;
        self.masks
            .entry(glyph)
            .or_insert_with(|| rasterize_glyph(font, scale, glyph))
            .as_ref()
    }
}

fn rasterize_glyph(font: &FontVec, scale: PxScale, glyph: char) -> Option<GlyphMask> {
    let id = font.glyph_id(glyph);
    if id.0 == 0 {
        log::warn!("font has no glyph for {:?}; cells using it stay blank", glyph);
        return None;
    }
    let outlined = font.outline_glyph(id.with_scale_and_position(scale, point(0.0, 0.0)))?;
    let bounds = outlined.px_bounds();
    let width = bounds.width().max(0.0) as u32;
    let height = bounds.height().max(0.0) as u32;
    let mut coverage = vec![0.0f32; (width * height) as usize];
    outlined.draw(|x, y, c| {
        if x < width && y < height {
            coverage[(y * width + x) as usize] = c;
        }
    });
    Some(GlyphMask {
        left: bounds.min.x as i32,
        top: bounds.min.y as i32,
        width,
        height,
        coverage,
    })
}

impl GlyphPainter for FontPainter {
    fn paint(&mut self, canvas: &mut RgbImage, glyph: char, origin: (i32, i32), color: Rgb<u8>) {
        let (canvas_w, canvas_h) = (canvas.width() as i32, canvas.height() as i32);
        let Some(mask) = self.mask(glyph) else {
            return;
        };
        for my in 0..mask.height {
            let y = origin.1 + mask.top + my as i32;
            if y < 0 || y >= canvas_h {
                continue;
            }
            for mx in 0..mask.width {
                let x = origin.0 + mask.left + mx as i32;
                if x < 0 || x >= canvas_w {
                    continue;
                }
                let c = mask.coverage[(my * mask.width + mx) as usize].clamp(0.0, 1.0);
                if c <= 0.0 {
                    continue;
                }
                let dst = canvas.get_pixel_mut(x as u32, y as u32);
                for ch in 0..3 {
                    let blended = dst[ch] as f32 * (1.0 - c) + color[ch] as f32 * c;
                    dst[ch] = blended.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}
