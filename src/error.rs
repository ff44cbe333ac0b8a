use thiserror::Error;

/// Failures that end a translation request.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("document unreadable: {0}")]
    DocumentUnreadable(String),

    #[error("failed to write output to {target}: {reason}")]
    OutputWriteFailed { target: String, reason: String },
}

impl PipelineError {
    pub(crate) fn unreadable(err: impl std::fmt::Display) -> Self {
        PipelineError::DocumentUnreadable(err.to_string())
    }

    pub(crate) fn write_failed(target: impl Into<String>, err: &anyhow::Error) -> Self {
        PipelineError::OutputWriteFailed {
            target: target.into(),
            reason: format!("{:#}", err),
        }
    }

    /// Name of the stage that failed, for terminal error reporting.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "configuration",
            PipelineError::DocumentUnreadable(_) => "extraction",
            PipelineError::OutputWriteFailed { .. } => "rendering",
        }
    }
}

/// Why a translation batch fell back to its original text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchFailure {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("translation service responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("expected {expected} translations, received {received}")]
    CountMismatch { expected: usize, received: usize },
}

/// Why a single run was not painted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("non-finite placement (x={x}, y={y}, size={size})")]
    InvalidGeometry { x: f64, y: f64, size: f64 },

    #[error("font '{font}' has no glyphs for {text:?}")]
    MissingGlyphs { font: String, text: String },

    #[error("no page is open")]
    NoPage,

    #[error("font for {0} weight was never registered")]
    UnregisteredFont(&'static str),
}
