use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::document::{DocumentGeometry, FontWeight};
use crate::error::RenderError;
use crate::translate::TranslatedRun;

mod font;
mod pdf;

pub use font::{FontFace, FontSet};
pub use pdf::PdfCanvas;
#[cfg(test)]
pub(crate) use font::fixture_font;

pub const DEFAULT_BOX_WIDTH_MULTIPLIER: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// One text placement. `y` is the baseline measured downward from the top
/// edge of the page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaintCommand {
    pub page: u32,
    pub text: String,
    pub weight: FontWeight,
    pub font_size_pt: f64,
    pub x: f64,
    pub y: f64,
    pub box_width: f64,
    pub align: TextAlign,
    pub wrap: bool,
}

/// A paginated output document that paints text at absolute top-left
/// coordinates.
pub trait Canvas {
    type Output;

    fn register_font(&mut self, weight: FontWeight) -> Result<()>;
    fn add_page(&mut self, size: PageSize) -> Result<()>;
    fn paint_text(&mut self, command: &PaintCommand) -> Result<(), RenderError>;
    fn finalize(self) -> Result<Self::Output>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRun {
    pub page: u32,
    pub text: String,
    pub reason: RenderError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub pages: u32,
    pub painted: usize,
    pub blank: usize,
    pub skipped: Vec<SkippedRun>,
}

#[derive(Debug)]
pub struct Rendered<T> {
    pub output: T,
    pub report: RenderReport,
}

#[derive(Debug, Clone)]
pub struct LayoutRenderer {
    box_width_multiplier: f64,
}

impl Default for LayoutRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_BOX_WIDTH_MULTIPLIER)
    }
}

impl LayoutRenderer {
    pub fn new(box_width_multiplier: f64) -> Self {
        let box_width_multiplier = if box_width_multiplier.is_finite() && box_width_multiplier > 0.0
        {
            box_width_multiplier
        } else {
            DEFAULT_BOX_WIDTH_MULTIPLIER
        };
        Self {
            box_width_multiplier,
        }
    }

    /// Maps a run onto the canvas, or says why it cannot be painted.
    /// `Ok(None)` means the run is blank.
    pub fn place(
        &self,
        run: &TranslatedRun,
        geometry: &DocumentGeometry,
    ) -> Result<Option<PaintCommand>, RenderError> {
        let run = &run.run;
        if run.is_blank() {
            return Ok(None);
        }
        if !(run.x.is_finite() && run.y.is_finite() && run.font_size_pt.is_finite()) {
            return Err(RenderError::InvalidGeometry {
                x: run.x,
                y: run.y,
                size: run.font_size_pt,
            });
        }
        Ok(Some(PaintCommand {
            page: run.page,
            text: run.text.clone(),
            weight: run.weight,
            font_size_pt: run.font_size_pt,
            x: run.x,
            y: geometry.height - run.y,
            box_width: run.box_width * self.box_width_multiplier,
            align: TextAlign::Left,
            wrap: false,
        }))
    }

    /// Paints every page `1..=num_pages` and finalizes the canvas. Per-run
    /// failures are recorded in the report; only canvas-level failures
    /// return an error, and then the canvas is dropped unfinalized.
    pub fn render<C: Canvas>(
        &self,
        runs: &[TranslatedRun],
        geometry: &DocumentGeometry,
        mut canvas: C,
    ) -> Result<Rendered<C::Output>> {
        let mut by_page: BTreeMap<u32, Vec<&TranslatedRun>> = BTreeMap::new();
        for run in runs {
            if run.run.page == 0 || run.run.page > geometry.num_pages {
                warn!(
                    "dropping run on page {} outside 1..={}",
                    run.run.page, geometry.num_pages
                );
                continue;
            }
            by_page.entry(run.run.page).or_default().push(run);
        }

        canvas.register_font(FontWeight::Normal)?;
        canvas.register_font(FontWeight::Bold)?;

        let size = PageSize {
            width: geometry.width,
            height: geometry.height,
        };
        let mut report = RenderReport::default();
        for page in 1..=geometry.num_pages {
            canvas
                .add_page(size)
                .with_context(|| format!("failed to add page {}", page))?;
            report.pages += 1;
            let page_runs = by_page.get(&page).map(Vec::as_slice).unwrap_or(&[]);
            debug!("page {}: {} runs", page, page_runs.len());
            for run in page_runs {
                let outcome = self
                    .place(run, geometry)
                    .and_then(|command| match command {
                        Some(command) => canvas.paint_text(&command).map(|_| true),
                        None => Ok(false),
                    });
                match outcome {
                    Ok(true) => report.painted += 1,
                    Ok(false) => report.blank += 1,
                    Err(reason) => {
                        warn!("skipping run on page {}: {}", page, reason);
                        report.skipped.push(SkippedRun {
                            page,
                            text: run.run.text.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        let output = canvas
            .finalize()
            .with_context(|| "failed to finalize document")?;
        info!(
            "rendered {} pages ({} runs painted, {} skipped)",
            report.pages,
            report.painted,
            report.skipped.len()
        );
        Ok(Rendered { output, report })
    }
}
