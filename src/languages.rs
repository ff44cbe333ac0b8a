use crate::error::PipelineError;

/// Languages the translation service accepts, as `(code, name)`.
const SUPPORTED: &[(&str, &str)] = &[
    ("as", "Assamese"),
    ("bn", "Bengali"),
    ("brx", "Bodo"),
    ("doi", "Dogri"),
    ("en", "English"),
    ("gom", "Konkani"),
    ("gu", "Gujarati"),
    ("hi", "Hindi"),
    ("kn", "Kannada"),
    ("ks", "Kashmiri"),
    ("mai", "Maithili"),
    ("ml", "Malayalam"),
    ("mni", "Manipuri"),
    ("mr", "Marathi"),
    ("ne", "Nepali"),
    ("or", "Odia"),
    ("pa", "Punjabi"),
    ("sa", "Sanskrit"),
    ("sat", "Santali"),
    ("sd", "Sindhi"),
    ("ta", "Tamil"),
    ("te", "Telugu"),
    ("ur", "Urdu"),
];

pub fn is_supported(code: &str) -> bool {
    display_name(code).is_some()
}

pub fn display_name(code: &str) -> Option<&'static str> {
    let code = normalize_code(code);
    SUPPORTED
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, name)| *name)
}

/// Normalizes and checks a source/target pair.
pub fn validate_pair(source: &str, target: &str) -> Result<(String, String), PipelineError> {
    let source = normalize_code(source);
    let target = normalize_code(target);
    for (role, code) in [("source", &source), ("target", &target)] {
        if code.is_empty() {
            return Err(PipelineError::Config(format!("{} language is empty", role)));
        }
        if !is_supported(code) {
            return Err(PipelineError::Config(format!(
                "unsupported {} language: {}",
                role, code
            )));
        }
    }
    if source == target {
        return Err(PipelineError::Config(format!(
            "source and target language are both {}",
            source
        )));
    }
    Ok((source, target))
}

/// One `code<TAB>name` line per supported language.
pub fn format_supported() -> String {
    SUPPORTED
        .iter()
        .map(|(code, name)| format!("{}\t{}", code, name))
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}
