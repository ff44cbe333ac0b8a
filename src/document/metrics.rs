use serde::Serialize;

pub const DEFAULT_FONT_SIZE_PT: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    Normal,
    Bold,
}

impl FontWeight {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontWeight::Normal => "normal",
            FontWeight::Bold => "bold",
        }
    }
}

/// Size and weight inferred for one glyph item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphMetrics {
    pub font_size_pt: f64,
    pub weight: FontWeight,
}

impl GlyphMetrics {
    /// `transform` is `[scaleX, skewY, skewX, scaleY, posX, posY]`.
    pub fn infer(transform: &[f64; 6], font_name: Option<&str>) -> Self {
        Self {
            font_size_pt: infer_font_size(transform[0], transform[2]),
            weight: infer_weight(font_name),
        }
    }
}

/// Never returns NaN, infinity or a non-positive size.
pub fn infer_font_size(scale_x: f64, skew_x: f64) -> f64 {
    let size = (scale_x * scale_x + skew_x * skew_x).sqrt();
    if size.is_finite() && size > 0.0 {
        size
    } else {
        DEFAULT_FONT_SIZE_PT
    }
}

pub fn infer_weight(font_name: Option<&str>) -> FontWeight {
    match font_name {
        Some(name) if name.to_lowercase().contains("bold") => FontWeight::Bold,
        _ => FontWeight::Normal,
    }
}
