use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::document::{self, DocumentGeometry, ExtractionDiagnostic, PdfSource};
use crate::error::PipelineError;
use crate::languages;
use crate::layout::{
    Canvas, DEFAULT_BOX_WIDTH_MULTIPLIER, FontSet, LayoutRenderer, PdfCanvas, RenderReport,
};
use crate::translate::{
    BatchTranslator, DEFAULT_CHUNK_SIZE, DEFAULT_INTER_BATCH_DELAY, TranslateBackend,
    TranslationReport,
};

#[derive(Debug, Clone, PartialEq)]
pub struct FontPaths {
    pub normal: PathBuf,
    pub bold: PathBuf,
}

/// Everything one translation request needs, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub source_language: String,
    pub target_language: String,
    pub chunk_size: usize,
    pub inter_batch_delay_ms: u64,
    pub box_width_multiplier: f64,
    pub fonts: FontPaths,
}

impl PipelineConfig {
    pub fn new(
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        fonts: FontPaths,
    ) -> Self {
        Self {
            source_language: source_language.into(),
            target_language: target_language.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            inter_batch_delay_ms: DEFAULT_INTER_BATCH_DELAY.as_millis() as u64,
            box_width_multiplier: DEFAULT_BOX_WIDTH_MULTIPLIER,
            fonts,
        }
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub geometry: DocumentGeometry,
    pub runs_extracted: usize,
    pub extraction_diagnostics: Vec<ExtractionDiagnostic>,
    pub translation: TranslationReport,
    pub render: RenderReport,
}

/// Extract, translate and re-render one document at a time.
pub struct Pipeline<B> {
    config: PipelineConfig,
    translator: BatchTranslator<B>,
    renderer: LayoutRenderer,
}

impl<B: TranslateBackend> Pipeline<B> {
    pub fn new(config: PipelineConfig, backend: B) -> Result<Self, PipelineError> {
        let (source, target) =
            languages::validate_pair(&config.source_language, &config.target_language)?;
        if config.chunk_size == 0 {
            return Err(PipelineError::Config("chunk size must be positive".to_string()));
        }
        if !(config.box_width_multiplier.is_finite() && config.box_width_multiplier > 0.0) {
            return Err(PipelineError::Config(format!(
                "box width multiplier must be positive, got {}",
                config.box_width_multiplier
            )));
        }
        let translator = BatchTranslator::new(backend, source.clone(), target.clone())
            .with_chunk_size(config.chunk_size)
            .with_inter_batch_delay(config.inter_batch_delay());
        let renderer = LayoutRenderer::new(config.box_width_multiplier);
        Ok(Self {
            config: PipelineConfig {
                source_language: source,
                target_language: target,
                ..config
            },
            translator,
            renderer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Translates `input` into a new PDF at `output`. The output file only
    /// appears once it has been completely written.
    pub async fn translate_file(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<PipelineSummary, PipelineError> {
        if same_file(input, output) {
            return Err(PipelineError::Config(format!(
                "output would overwrite the input: {}",
                output.display()
            )));
        }
        let title = input
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("translated");
        let canvas = FontSet::load(&self.config.fonts.normal, &self.config.fonts.bold)
            .and_then(|fonts| PdfCanvas::new(title, fonts))
            .map_err(|err| PipelineError::Config(format!("{:#}", err)))?;
        let bytes = std::fs::read(input).map_err(|err| {
            PipelineError::unreadable(format!("{}: {}", input.display(), err))
        })?;

        let target = output.display().to_string();
        let (rendered, summary) = self.run(&bytes, canvas, &target).await?;

        write_atomic(output, &rendered).map_err(|err| PipelineError::write_failed(&target, &err))?;
        info!("wrote {} ({} bytes)", target, rendered.len());
        Ok(summary)
    }

    /// Runs every stage against in-memory PDF bytes, painting onto `canvas`.
    pub async fn translate_document<C: Canvas>(
        &self,
        bytes: &[u8],
        canvas: C,
    ) -> Result<(C::Output, PipelineSummary), PipelineError> {
        self.run(bytes, canvas, "output document").await
    }

    async fn run<C: Canvas>(
        &self,
        bytes: &[u8],
        canvas: C,
        target: &str,
    ) -> Result<(C::Output, PipelineSummary), PipelineError> {
        let (geometry, extraction) = {
            let source = PdfSource::from_bytes(bytes)?;
            let geometry = document::probe_geometry(&source)?;
            let extraction = document::extract_runs(&source)?;
            (geometry, extraction)
        };
        info!(
            "{} pages ({}x{}pt), {} runs, translating {} -> {}",
            geometry.num_pages,
            geometry.width,
            geometry.height,
            extraction.runs.len(),
            self.config.source_language,
            self.config.target_language
        );
        let runs_extracted = extraction.runs.len();

        let (translated, translation) = self.translator.translate(extraction.runs).await;
        debug!(
            "{} batches sent, {} failed",
            translation.batches_sent,
            translation.failed_batches.len()
        );

        let rendered = self
            .renderer
            .render(&translated, &geometry, canvas)
            .map_err(|err| PipelineError::write_failed(target, &err))?;
        Ok((
            rendered.output,
            PipelineSummary {
                geometry,
                runs_extracted,
                extraction_diagnostics: extraction.diagnostics,
                translation,
                render: rendered.report,
            },
        ))
    }
}

/// `<stem>.<target>.pdf` beside the input.
pub fn default_output_path(input: &Path, target_language: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{}.{}.pdf", stem, target_language))
}

fn same_file(input: &Path, output: &Path) -> bool {
    match (input.canonicalize(), output.canonicalize()) {
        (Ok(input), Ok(output)) => input == output,
        _ => input == output,
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    file.write_all(bytes)
        .with_context(|| "failed to write output")?;
    file.as_file()
        .sync_all()
        .with_context(|| "failed to flush output")?;
    file.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to move output into place: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::tests::RecordingCanvas;
    use crate::test_util::{PageSpec, TextSpec, build_pdf};
    use crate::translate::tests::PrefixBackend;

    fn config() -> PipelineConfig {
        PipelineConfig::new(
            "en",
            "hi",
            FontPaths {
                normal: PathBuf::from("/nonexistent/Regular.ttf"),
                bold: PathBuf::from("/nonexistent/Bold.ttf"),
            },
        )
    }

    #[test]
    fn rejects_bad_configuration() {
        let backend = PrefixBackend::default();
        let same = PipelineConfig {
            target_language: "EN".to_string(),
            ..config()
        };
        assert!(matches!(
            Pipeline::new(same, &backend),
            Err(PipelineError::Config(_))
        ));
        let zero = PipelineConfig {
            chunk_size: 0,
            ..config()
        };
        assert!(matches!(
            Pipeline::new(zero, &backend),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn default_output_sits_beside_input() {
        assert_eq!(
            default_output_path(Path::new("/tmp/report.pdf"), "hi"),
            PathBuf::from("/tmp/report.hi.pdf")
        );
        assert_eq!(
            default_output_path(Path::new("scan"), "ta"),
            PathBuf::from("scan.ta.pdf")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stages_run_in_order_over_one_document() {
        let bytes = build_pdf(&[
            PageSpec::letter(vec![
                TextSpec::new("Hello", "Helvetica", 12, 10, 700),
                TextSpec::new("Title", "Helvetica-Bold", 18, 72, 740),
            ]),
            PageSpec::letter(vec![]),
        ]);
        let backend = PrefixBackend::default();
        let pipeline = Pipeline::new(config(), &backend).expect("pipeline");
        let (canvas, summary) = pipeline
            .translate_document(&bytes, RecordingCanvas::default())
            .await
            .expect("translate");

        assert_eq!(summary.geometry.num_pages, 2);
        assert_eq!(summary.runs_extracted, 2);
        assert_eq!(summary.translation.batches_sent, 1);
        assert_eq!(canvas.pages.len(), 2);
        let painted: Vec<_> = canvas
            .commands
            .iter()
            .map(|command| (command.text.as_str(), command.weight, command.y.round()))
            .collect();
        assert_eq!(
            painted,
            vec![
                ("T:Hello", crate::document::FontWeight::Normal, 92.0),
                ("T:Title", crate::document::FontWeight::Bold, 52.0),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_document_fails_before_any_translation() {
        let backend = PrefixBackend::default();
        let pipeline = Pipeline::new(config(), &backend).expect("pipeline");
        let err = pipeline
            .translate_document(b"not a pdf", RecordingCanvas::default())
            .await
            .expect_err("unreadable");
        assert_eq!(err.stage(), "extraction");
        assert!(backend.calls.lock().expect("calls").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_fonts_are_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("in.pdf");
        std::fs::write(&input, build_pdf(&[PageSpec::letter(vec![])])).expect("write");
        let backend = PrefixBackend::default();
        let pipeline = Pipeline::new(config(), &backend).expect("pipeline");
        let err = pipeline
            .translate_file(&input, &dir.path().join("out.pdf"))
            .await
            .expect_err("fonts missing");
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(!dir.path().join("out.pdf").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn translates_a_file_with_embedded_fonts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("in.pdf");
        let output = dir.path().join("in.hi.pdf");
        std::fs::write(
            &input,
            build_pdf(&[
                PageSpec::letter(vec![TextSpec::new("Hello", "Helvetica", 12, 10, 700)]),
                PageSpec::letter(vec![]),
                PageSpec::letter(vec![TextSpec::new("End", "Helvetica-Bold", 12, 72, 72)]),
            ]),
        )
        .expect("write");
        let config = PipelineConfig {
            fonts: FontPaths {
                normal: crate::layout::fixture_font(),
                bold: crate::layout::fixture_font(),
            },
            ..config()
        };
        let backend = PrefixBackend::default();
        let pipeline = Pipeline::new(config, &backend).expect("pipeline");
        let summary = pipeline
            .translate_file(&input, &output)
            .await
            .expect("translate");

        assert_eq!(summary.render.pages, 3);
        assert_eq!(summary.render.painted, 2);
        let written = lopdf::Document::load(&output).expect("reparse output");
        assert_eq!(written.get_pages().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn font_collections_are_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("in.pdf");
        std::fs::write(&input, build_pdf(&[PageSpec::letter(vec![])])).expect("write");
        let collection = dir.path().join("fonts.ttc");
        let mut header = b"ttcf".to_vec();
        header.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 2]);
        std::fs::write(&collection, header).expect("write font");
        let config = PipelineConfig {
            fonts: FontPaths {
                normal: collection,
                bold: crate::layout::fixture_font(),
            },
            ..config()
        };
        let backend = PrefixBackend::default();
        let pipeline = Pipeline::new(config, &backend).expect("pipeline");
        let err = pipeline
            .translate_file(&input, &dir.path().join("out.pdf"))
            .await
            .expect_err("collection");
        assert_eq!(err.stage(), "configuration");
        assert!(err.to_string().contains("font collection"));
    }

    #[test]
    fn atomic_write_replaces_whole_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.pdf");
        std::fs::write(&path, b"old contents that are longer").expect("seed");
        write_atomic(&path, b"new").expect("write");
        assert_eq!(std::fs::read(&path).expect("read"), b"new");
        let leftovers = std::fs::read_dir(dir.path()).expect("dir").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn atomic_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("out.pdf");
        assert!(write_atomic(&path, b"x").is_err());
        assert!(!path.exists());
    }
}
