use image::{Rgb, RgbImage};

use crate::glyph::AsciiGrid;

/// Draws one glyph onto a canvas.
///
/// `origin` is the left end of the glyph's baseline in canvas pixels. It may
/// lie partly outside the canvas; implementations clip.
pub trait GlyphPainter {
    fn paint(&mut self, canvas: &mut RgbImage, glyph: char, origin: (i32, i32), color: Rgb<u8>);
}

/// Pixel geometry of a grid cell on the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellLayout {
    pub cell_width: u32,
    pub cell_height: u32,
    /// Baseline offset above the bottom edge of the cell
    pub vertical_trim: u32,
}

impl CellLayout {
    /// Canvas size for a grid of `columns` x `rows` cells.
    pub fn canvas_size(&self, columns: u32, rows: u32) -> (u32, u32) {
        (columns * self.cell_width, rows * self.cell_height)
    }

    /// Baseline origin of the glyph in cell `(x, y)`.
    pub fn origin(&self, x: u32, y: u32) -> (i32, i32) {
        (
            (x * self.cell_width) as i32,
            ((y + 1) * self.cell_height) as i32 - self.vertical_trim as i32,
        )
    }
}

/// Render `grid` onto a fresh black canvas, one glyph per cell in the
/// cell's own color.
pub fn rasterize<P: GlyphPainter + ?Sized>(grid: &AsciiGrid, layout: &CellLayout, painter: &mut P) -> RgbImage {
    let (w, h) = layout.canvas_size(grid.width(), grid.height());
    let mut canvas = RgbImage::new(w, h);
    for (x, y, cell) in grid.iter() {
        painter.paint(&mut canvas, cell.glyph, layout.origin(x, y), cell.color);
    }
    canvas
}
