use anyhow::{Context, Result, anyhow};
use printpdf::{IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerIndex, PdfPageIndex};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use tracing::debug;

use super::font::FontSet;
use super::{Canvas, PageSize, PaintCommand};
use crate::document::FontWeight;
use crate::error::RenderError;

/// Canvas backed by a printpdf document with the two target-script faces
/// embedded.
pub struct PdfCanvas {
    document: PdfDocumentReference,
    fonts: FontSet,
    embedded: HashMap<FontWeight, IndirectFontRef>,
    registered: HashSet<FontWeight>,
    current: Option<OpenPage>,
    page_count: usize,
}

struct OpenPage {
    page: PdfPageIndex,
    layer: PdfLayerIndex,
    height: f64,
}

impl PdfCanvas {
    /// Creates the document and embeds both faces up front, so a face
    /// printpdf cannot embed fails before any translation work.
    pub fn new(title: &str, fonts: FontSet) -> Result<Self> {
        let document = PdfDocument::empty(title);
        let mut embedded = HashMap::new();
        for weight in [FontWeight::Normal, FontWeight::Bold] {
            let face = fonts.face(weight);
            let font = document
                .add_external_font(Cursor::new(face.data()))
                .map_err(|err| anyhow!("failed to embed {} font: {}", weight.as_str(), err))?;
            debug!(
                "embedded {} font {}",
                weight.as_str(),
                face.family().unwrap_or("(unnamed)")
            );
            embedded.insert(weight, font);
        }
        Ok(Self {
            document,
            fonts,
            embedded,
            registered: HashSet::new(),
            current: None,
            page_count: 0,
        })
    }
}

impl Canvas for PdfCanvas {
    type Output = Vec<u8>;

    fn register_font(&mut self, weight: FontWeight) -> Result<()> {
        if !self.embedded.contains_key(&weight) {
            return Err(anyhow!("no embedded {} font", weight.as_str()));
        }
        self.registered.insert(weight);
        Ok(())
    }

    fn add_page(&mut self, size: PageSize) -> Result<()> {
        if !(size.width.is_finite() && size.height.is_finite())
            || size.width <= 0.0
            || size.height <= 0.0
        {
            return Err(anyhow!(
                "invalid page size {}x{}",
                size.width,
                size.height
            ));
        }
        self.page_count += 1;
        let (page, layer) = self.document.add_page(
            Mm(pt_to_mm(size.width)),
            Mm(pt_to_mm(size.height)),
            format!("Layer {}", self.page_count),
        );
        self.current = Some(OpenPage {
            page,
            layer,
            height: size.height,
        });
        Ok(())
    }

    fn paint_text(&mut self, command: &PaintCommand) -> Result<(), RenderError> {
        let current = self.current.as_ref().ok_or(RenderError::NoPage)?;
        let font = self
            .embedded
            .get(&command.weight)
            .filter(|_| self.registered.contains(&command.weight))
            .ok_or(RenderError::UnregisteredFont(command.weight.as_str()))?;
        let face = self.fonts.face(command.weight);

        let missing = face.missing_chars(&command.text);
        let drawable = command.text.chars().filter(|ch| !ch.is_whitespace()).count();
        if drawable > 0 && missing.len() == drawable {
            return Err(RenderError::MissingGlyphs {
                font: face.family().unwrap_or(command.weight.as_str()).to_string(),
                text: command.text.clone(),
            });
        }
        if !missing.is_empty() {
            debug!("{} glyphs missing for {:?}", missing.len(), command.text);
        }
        let width = face.text_width_pt(&command.text, command.font_size_pt);
        if width > command.box_width {
            debug!(
                "{:?} overflows its box ({:.1}pt > {:.1}pt)",
                command.text, width, command.box_width
            );
        }

        // printpdf measures y upward from the bottom edge
        let baseline = current.height - command.y;
        self.document
            .get_page(current.page)
            .get_layer(current.layer)
            .use_text(
                command.text.as_str(),
                command.font_size_pt as f32,
                Mm(pt_to_mm(command.x)),
                Mm(pt_to_mm(baseline)),
                font,
            );
        Ok(())
    }

    fn finalize(self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        {
            let mut writer = std::io::BufWriter::new(&mut buffer);
            self.document
                .save(&mut writer)
                .with_context(|| "failed to write pdf")?;
        }
        Ok(buffer)
    }
}

fn pt_to_mm(pt: f64) -> f32 {
    let inches = pt as f32 / 72.0;
    inches * 25.4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentGeometry;
    use crate::layout::{LayoutRenderer, TextAlign};
    use crate::layout::fixture_font;
    use crate::layout::font::FontFace;
    use crate::translate::TranslatedRun;
    use crate::translate::tests::run;
    use lopdf::Document;
    use lopdf::content::Content;

    fn canvas() -> PdfCanvas {
        let face = FontFace::load(&fixture_font()).expect("fixture");
        let fonts = FontSet {
            normal: face.clone(),
            bold: face,
        };
        PdfCanvas::new("fixture", fonts).expect("canvas")
    }

    fn letter() -> PageSize {
        PageSize {
            width: 612.0,
            height: 792.0,
        }
    }

    fn command(text: &str) -> PaintCommand {
        PaintCommand {
            page: 1,
            text: text.to_string(),
            weight: FontWeight::Normal,
            font_size_pt: 12.0,
            x: 10.0,
            y: 92.0,
            box_width: 60.0,
            align: TextAlign::Left,
            wrap: false,
        }
    }

    fn text_positions(document: &Document, page_id: lopdf::ObjectId) -> Vec<(f32, f32)> {
        let raw = document.get_page_content(page_id).expect("content");
        Content::decode(&raw)
            .expect("decode")
            .operations
            .iter()
            .filter(|operation| operation.operator == "Td")
            .map(|operation| {
                (
                    operation.operands[0].as_float().expect("x"),
                    operation.operands[1].as_float().expect("y"),
                )
            })
            .collect()
    }

    #[test]
    fn points_convert_to_millimetres() {
        assert!((pt_to_mm(72.0) - 25.4).abs() < 1e-4);
        assert!((pt_to_mm(612.0) - 215.9).abs() < 1e-3);
    }

    #[test]
    fn renders_every_page_with_text_at_the_source_baseline() {
        let runs = vec![
            TranslatedRun {
                run: run("Hello", 1),
                original_text: Some("Hello".to_string()),
            },
            TranslatedRun {
                run: run("Third", 3),
                original_text: Some("Third".to_string()),
            },
        ];
        let geometry = DocumentGeometry {
            width: 612.0,
            height: 792.0,
            num_pages: 3,
        };
        let rendered = LayoutRenderer::default()
            .render(&runs, &geometry, canvas())
            .expect("render");
        assert_eq!(rendered.report.painted, 2);

        let document = Document::load_mem(&rendered.output).expect("reparse");
        let pages = document.get_pages();
        assert_eq!(pages.len(), 3);
        let first = text_positions(&document, pages[&1]);
        assert_eq!(first.len(), 1);
        assert!((first[0].0 - 10.0).abs() < 0.01, "x {}", first[0].0);
        assert!((first[0].1 - 700.0).abs() < 0.01, "y {}", first[0].1);
        assert!(text_positions(&document, pages[&2]).is_empty());
        assert_eq!(text_positions(&document, pages[&3]).len(), 1);
    }

    #[test]
    fn text_without_any_glyph_is_refused() {
        let mut canvas = canvas();
        assert_eq!(canvas.paint_text(&command("Hi")), Err(RenderError::NoPage));
        canvas.add_page(letter()).expect("page");
        assert_eq!(
            canvas.paint_text(&command("Hi")),
            Err(RenderError::UnregisteredFont("normal"))
        );
        canvas.register_font(FontWeight::Normal).expect("register");
        assert_eq!(
            canvas.paint_text(&command("नमस्ते")),
            Err(RenderError::MissingGlyphs {
                font: "DejaVu Sans".to_string(),
                text: "नमस्ते".to_string(),
            })
        );
        // partly covered text is still drawn
        assert_eq!(canvas.paint_text(&command("Hi नमस्ते")), Ok(()));
        assert!(canvas.finalize().expect("finalize").starts_with(b"%PDF"));
    }

    #[test]
    fn degenerate_page_sizes_are_rejected() {
        let mut canvas = canvas();
        let err = canvas
            .add_page(PageSize {
                width: 0.0,
                height: 792.0,
            })
            .expect_err("zero width");
        assert!(err.to_string().contains("invalid page size"));
    }
}
