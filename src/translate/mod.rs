use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::document::TextRun;
use crate::error::BatchFailure;

mod bhashini;
mod retry;
mod scheduler;

pub use bhashini::{Bhashini, DEFAULT_ENDPOINT};
pub use scheduler::BatchScheduler;

pub const DEFAULT_CHUNK_SIZE: usize = 20;
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_millis(300);

pub type BackendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<String>, BatchFailure>> + Send + 'a>>;

/// Batch text translation. A successful call returns one string per input,
/// in input order.
pub trait TranslateBackend: Send + Sync {
    fn translate<'a>(
        &'a self,
        source_language: &'a str,
        target_language: &'a str,
        texts: &'a [String],
    ) -> BackendFuture<'a>;
}

impl<T: TranslateBackend + ?Sized> TranslateBackend for &T {
    fn translate<'a>(
        &'a self,
        source_language: &'a str,
        target_language: &'a str,
        texts: &'a [String],
    ) -> BackendFuture<'a> {
        (**self).translate(source_language, target_language, texts)
    }
}

/// A run after translation. `original_text` is `None` for blank runs, which
/// are never sent out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedRun {
    #[serde(flatten)]
    pub run: TextRun,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
}

impl TranslatedRun {
    pub fn text(&self) -> &str {
        &self.run.text
    }

    /// True when the run was sent for translation but kept its source text.
    pub fn is_fallback(&self) -> bool {
        self.original_text.as_deref() == Some(self.run.text.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedBatch {
    /// 0-based batch position.
    pub index: usize,
    pub size: usize,
    pub reason: BatchFailure,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationReport {
    pub batches_sent: usize,
    pub failed_batches: Vec<FailedBatch>,
    pub translatable_runs: usize,
}

#[derive(Debug, Clone)]
pub struct BatchTranslator<B> {
    backend: B,
    source_language: String,
    target_language: String,
    chunk_size: usize,
    inter_batch_delay: Duration,
}

impl<B: TranslateBackend> BatchTranslator<B> {
    pub fn new(
        backend: B,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            source_language: source_language.into(),
            target_language: target_language.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }

    /// Translates every non-blank run. The output has the same length and
    /// order as `runs`; a failed batch keeps its runs' original text.
    pub async fn translate(&self, runs: Vec<TextRun>) -> (Vec<TranslatedRun>, TranslationReport) {
        let translatable: Vec<usize> = runs
            .iter()
            .enumerate()
            .filter(|(_, run)| !run.is_blank())
            .map(|(index, _)| index)
            .collect();
        let mut report = TranslationReport {
            translatable_runs: translatable.len(),
            ..TranslationReport::default()
        };
        if translatable.is_empty() {
            info!("no text to translate");
        }

        let mut translations: Vec<Option<String>> = vec![None; runs.len()];
        let mut scheduler = BatchScheduler::new(self.inter_batch_delay);
        let batch_count = translatable.len().div_ceil(self.chunk_size);
        for (batch_index, positions) in translatable.chunks(self.chunk_size).enumerate() {
            let texts: Vec<String> = positions
                .iter()
                .map(|&position| runs[position].text.clone())
                .collect();
            scheduler.ready().await;
            info!(
                "translating batch {}/{} ({} items)",
                batch_index + 1,
                batch_count,
                texts.len()
            );
            let outcome = self
                .backend
                .translate(&self.source_language, &self.target_language, &texts)
                .await
                .and_then(|translated| check_count(translated, texts.len()));
            scheduler.complete();
            report.batches_sent += 1;

            match outcome {
                Ok(translated) => {
                    for (&position, text) in positions.iter().zip(translated) {
                        translations[position] = Some(text);
                    }
                }
                Err(reason) => {
                    warn!(
                        "batch {}/{} failed, keeping original text: {}",
                        batch_index + 1,
                        batch_count,
                        reason
                    );
                    report.failed_batches.push(FailedBatch {
                        index: batch_index,
                        size: texts.len(),
                        reason,
                    });
                }
            }
        }

        let output = runs
            .into_iter()
            .zip(translations)
            .map(|(run, translated)| merge(run, translated))
            .collect();
        (output, report)
    }
}

fn check_count(translated: Vec<String>, expected: usize) -> Result<Vec<String>, BatchFailure> {
    if translated.len() == expected {
        Ok(translated)
    } else {
        Err(BatchFailure::CountMismatch {
            expected,
            received: translated.len(),
        })
    }
}

fn merge(mut run: TextRun, translated: Option<String>) -> TranslatedRun {
    if run.is_blank() {
        return TranslatedRun {
            run,
            original_text: None,
        };
    }
    let original = run.text.clone();
    match translated {
        Some(text) if !text.trim().is_empty() => run.text = text,
        _ => debug!("run on page {} keeps its original text", run.page),
    }
    TranslatedRun {
        run,
        original_text: Some(original),
    }
}
