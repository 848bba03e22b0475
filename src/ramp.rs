use crate::error::{ConvertError, Result};

/// Default glyph ramp, sparsest first.
pub const DEFAULT_RAMP: &str = " .'`^\",:;Il!i><~+_-?][}{1)(|\\/tfjrxnuvczXYUJCLQ0OZmwqpdbkhao*#MW&8%B@$";

/// Ordered glyph sequence used for luminance quantization.
///
/// Index 0 is the sparsest (blankest) glyph and the last index the densest.
/// A ramp always holds at least two glyphs and never changes once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterRamp {
    glyphs: Vec<char>,
}

impl CharacterRamp {
    pub fn new(glyphs: &str) -> Result<Self> {
        let glyphs: Vec<char> = glyphs.chars().collect();
        if glyphs.len() < 2 {
            return Err(ConvertError::Config(format!(
                "character ramp needs at least 2 glyphs, got {}",
                glyphs.len()
            )));
        }
        if glyphs.iter().any(|c| c.is_control()) {
            return Err(ConvertError::Config(
                "character ramp contains control characters".to_string(),
            ));
        }
        Ok(Self { glyphs })
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn glyph(&self, index: usize) -> char {
        self.glyphs[index.min(self.glyphs.len() - 1)]
    }

    pub fn glyphs(&self) -> &[char] {
        &self.glyphs
    }

    /// Brightness each glyph stands for: `i / (N - 1)`.
    pub fn brightness_table(&self) -> Vec<(char, f64)> {
        let last = (self.glyphs.len() - 1) as f64;
        self.glyphs
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as f64 / last))
            .collect()
    }
}

impl Default for CharacterRamp {
    fn default() -> Self {
        Self {
            glyphs: DEFAULT_RAMP.chars().collect(),
        }
    }
}
