//! Luminance quantization: pixel color to brightness to ramp index.
//!
//! The mapping is purely linear. There is no gamma correction and no
//! dithering, so identical frames always produce identical grids.

use image::{Rgb, RgbImage};

use crate::config::LuminanceWeights;
use crate::ramp::CharacterRamp;

/// One grid position: the chosen glyph and the color it is drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub glyph: char,
    pub index: usize,
    pub color: Rgb<u8>,
}

/// A frame expressed as one (glyph, color) pair per cell, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiGrid {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
}

impl AsciiGrid {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cell(&self, x: u32, y: u32) -> &Cell {
        &self.cells[(y * self.width + x) as usize]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Cells with their grid coordinates, row by row.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, &Cell)> {
        let width = self.width.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (i as u32 % width, i as u32 / width, cell))
    }

    /// Ramp indices in row-major order.
    pub fn indices(&self) -> Vec<usize> {
        self.cells.iter().map(|c| c.index).collect()
    }

    /// Plain-text rendering, one line per row.
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity((self.width as usize + 1) * self.height as usize);
        for row in self.cells.chunks(self.width.max(1) as usize) {
            out.extend(row.iter().map(|c| c.glyph));
            out.push('\n');
        }
        out
    }
}

impl LuminanceWeights {
    /// Weighted brightness of an RGB triple scaled to nominally `[0, 1]`.
    ///
    /// Takes floats so that synthetic out-of-range channels can be fed in;
    /// the result is not clamped here.
    pub fn luminance(&self, r: f64, g: f64, b: f64) -> f64 {
        (self.r * r + self.g * g + self.b * b) / 255.0
    }

    pub fn luminance_of(&self, px: Rgb<u8>) -> f64 {
        self.luminance(px[0] as f64, px[1] as f64, px[2] as f64)
    }
}

/// Clamp to `[0, 1]`. NaN maps to 0.
pub fn clamp_unit(v: f64) -> f64 {
    v.max(0.0).min(1.0)
}

/// Ramp index for a brightness on a ramp of `ramp_len` glyphs.
pub fn glyph_index(brightness: f64, ramp_len: usize) -> usize {
    let last = ramp_len.saturating_sub(1);
    let scaled = (clamp_unit(brightness) * last as f64).floor();
    (scaled as usize).min(last)
}

/// Map every pixel of an already downsampled frame to a grid cell.
pub fn map_frame(frame: &RgbImage, ramp: &CharacterRamp, weights: &LuminanceWeights) -> AsciiGrid {
    let (width, height) = frame.dimensions();
    let cells = frame
        .pixels()
        .map(|&px| {
            let index = glyph_index(weights.luminance_of(px), ramp.len());
            Cell {
                glyph: ramp.glyph(index),
                index,
                color: px,
            }
        })
        .collect();
    AsciiGrid {
        width,
        height,
        cells,
    }
}
