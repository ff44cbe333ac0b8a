use anyhow::Result;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::error::PipelineError;

mod cmap;
mod metrics;
mod pdf;

pub use metrics::{DEFAULT_FONT_SIZE_PT, FontWeight, GlyphMetrics, infer_font_size, infer_weight};
pub use pdf::PdfSource;

const DEFAULT_BOX_WIDTH: f64 = 100.0;
const DEFAULT_BOX_HEIGHT: f64 = 15.0;
const UNKNOWN_FONT: &str = "unknown";

/// One positioned unit of extracted text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRun {
    pub text: String,
    /// 1-based page number.
    pub page: u32,
    /// Baseline origin in source document space (origin bottom-left).
    pub x: f64,
    pub y: f64,
    pub font_size_pt: f64,
    pub box_width: f64,
    pub box_height: f64,
    pub source_font_name: String,
    pub weight: FontWeight,
}

impl TextRun {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Page size shared by every output page, probed from page 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DocumentGeometry {
    pub width: f64,
    pub height: f64,
    pub num_pages: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// A text item as reported by the document parser, before any inference.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphItem {
    pub text: String,
    /// `[scaleX, skewY, skewX, scaleY, posX, posY]`; anything shorter is malformed.
    pub transform: Vec<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub font_name: Option<String>,
}

/// Read access to a paged source document.
pub trait SourceDocument {
    fn page_count(&self) -> u32;
    fn text_items(&self, page: u32) -> Result<Vec<GlyphItem>>;
    fn viewport(&self, page: u32, scale: f64) -> Result<Viewport>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionDiagnostic {
    pub page: u32,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub runs: Vec<TextRun>,
    pub diagnostics: Vec<ExtractionDiagnostic>,
}

/// Lazily walks pages `1..=N`, yielding their runs in order. Not restartable.
pub struct GlyphRunExtractor<'a, D: SourceDocument + ?Sized> {
    document: &'a D,
    next_page: u32,
    pending: VecDeque<TextRun>,
    diagnostics: Vec<ExtractionDiagnostic>,
    failed: bool,
}

impl<'a, D: SourceDocument + ?Sized> GlyphRunExtractor<'a, D> {
    pub fn new(document: &'a D) -> Self {
        Self {
            document,
            next_page: 1,
            pending: VecDeque::new(),
            diagnostics: Vec::new(),
            failed: false,
        }
    }

    pub fn into_diagnostics(self) -> Vec<ExtractionDiagnostic> {
        self.diagnostics
    }

    fn load_page(&mut self, page: u32) -> Result<(), PipelineError> {
        let count = self.document.page_count();
        debug!("extracting page {}/{}", page, count);
        let items = self
            .document
            .text_items(page)
            .map_err(|err| PipelineError::unreadable(format!("page {}: {:#}", page, err)))?;
        for item in items {
            match run_from_item(item, page) {
                Ok(run) => self.pending.push_back(run),
                Err(message) => {
                    warn!("skipping text item on page {}: {}", page, message);
                    self.diagnostics.push(ExtractionDiagnostic { page, message });
                }
            }
        }
        Ok(())
    }
}

impl<D: SourceDocument + ?Sized> Iterator for GlyphRunExtractor<'_, D> {
    type Item = Result<TextRun, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(run) = self.pending.pop_front() {
                return Some(Ok(run));
            }
            if self.failed || self.next_page > self.document.page_count() {
                return None;
            }
            let page = self.next_page;
            self.next_page += 1;
            if let Err(err) = self.load_page(page) {
                self.failed = true;
                return Some(Err(err));
            }
        }
    }
}

pub fn extract_runs<D: SourceDocument + ?Sized>(document: &D) -> Result<Extraction, PipelineError> {
    let mut extractor = GlyphRunExtractor::new(document);
    let mut runs = Vec::new();
    for run in extractor.by_ref() {
        runs.push(run?);
    }
    let diagnostics = extractor.into_diagnostics();
    info!(
        "extracted {} text runs ({} items skipped)",
        runs.len(),
        diagnostics.len()
    );
    Ok(Extraction { runs, diagnostics })
}

pub fn probe_geometry<D: SourceDocument + ?Sized>(
    document: &D,
) -> Result<DocumentGeometry, PipelineError> {
    let num_pages = document.page_count();
    if num_pages == 0 {
        return Err(PipelineError::unreadable("document has no pages"));
    }
    let viewport = document
        .viewport(1, 1.0)
        .map_err(|err| PipelineError::unreadable(format!("{:#}", err)))?;
    if !(viewport.width.is_finite() && viewport.height.is_finite())
        || viewport.width <= 0.0
        || viewport.height <= 0.0
    {
        return Err(PipelineError::unreadable(format!(
            "invalid page size {}x{}",
            viewport.width, viewport.height
        )));
    }
    Ok(DocumentGeometry {
        width: viewport.width,
        height: viewport.height,
        num_pages,
    })
}

fn run_from_item(item: GlyphItem, page: u32) -> Result<TextRun, String> {
    let transform: [f64; 6] = match item.transform.get(..6) {
        Some(slice) => [slice[0], slice[1], slice[2], slice[3], slice[4], slice[5]],
        None => {
            return Err(format!(
                "malformed transform with {} components",
                item.transform.len()
            ));
        }
    };
    let metrics = GlyphMetrics::infer(&transform, item.font_name.as_deref());
    Ok(TextRun {
        text: item.text,
        page,
        x: finite_or(transform[4], 0.0),
        y: finite_or(transform[5], 0.0),
        font_size_pt: metrics.font_size_pt,
        box_width: positive_or(item.width, DEFAULT_BOX_WIDTH),
        box_height: positive_or(item.height, DEFAULT_BOX_HEIGHT),
        source_font_name: item
            .font_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_FONT.to_string()),
        weight: metrics.weight,
    })
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

fn positive_or(value: Option<f64>, fallback: f64) -> f64 {
    value
        .filter(|value| value.is_finite() && *value > 0.0)
        .unwrap_or(fallback)
}
