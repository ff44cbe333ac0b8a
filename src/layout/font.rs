use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use ttf_parser::{Face, name_id};

use crate::document::FontWeight;

/// A font file for the target script, parsed once to validate it and to
/// answer glyph-coverage and width questions.
#[derive(Clone)]
pub struct FontFace {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    family: Option<String>,
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("family", &self.family)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl FontFace {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read font: {}", path.display()))?;
        Self::from_data(data).with_context(|| format!("failed to parse font: {}", path.display()))
    }

    /// Accepts a single-face TrueType or OpenType file. Collections are
    /// refused since the whole file would be embedded as one font.
    pub fn from_data(data: Vec<u8>) -> Result<Self> {
        if let Some(count) = ttf_parser::fonts_in_collection(&data) {
            return Err(anyhow!(
                "font collection with {} faces is not supported; use a single-face .ttf or .otf",
                count
            ));
        }
        let face = Face::parse(&data, 0).map_err(|err| anyhow!("no usable font face: {}", err))?;
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2);
        let family = extract_family_name(&face);
        Ok(Self {
            data: Arc::new(data),
            units_per_em,
            space_advance,
            family,
        })
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, 0).ok()
    }

    /// Characters of `text` (whitespace excluded) the face cannot draw.
    pub fn missing_chars(&self, text: &str) -> Vec<char> {
        let Some(face) = self.face() else {
            return text.chars().filter(|ch| !ch.is_whitespace()).collect();
        };
        text.chars()
            .filter(|ch| !ch.is_whitespace() && face.glyph_index(*ch).is_none())
            .collect()
    }

    /// Unshaped advance width of `text` in points.
    pub fn text_width_pt(&self, text: &str, font_size: f64) -> f64 {
        let Some(face) = self.face() else {
            return 0.0;
        };
        let mut advance = 0u32;
        for ch in text.chars() {
            let glyph_advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .unwrap_or(self.space_advance);
            advance = advance.saturating_add(glyph_advance as u32);
        }
        advance as f64 * font_size / self.units_per_em as f64
    }
}

/// The two substituted faces every output document registers.
#[derive(Debug, Clone)]
pub struct FontSet {
    pub normal: FontFace,
    pub bold: FontFace,
}

impl FontSet {
    pub fn load(normal: &Path, bold: &Path) -> Result<Self> {
        Ok(Self {
            normal: FontFace::load(normal)?,
            bold: FontFace::load(bold)?,
        })
    }

    pub fn face(&self, weight: FontWeight) -> &FontFace {
        match weight {
            FontWeight::Bold => &self.bold,
            FontWeight::Normal => &self.normal,
        }
    }
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
pub(crate) fn fixture_font() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/DejaVuSans.ttf")
}
