use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pdf_layout_translator::PipelineError;

#[derive(Parser, Debug)]
#[command(
    name = "pdf-layout-translator",
    version,
    about = "Translate a PDF's text while keeping every line where it was"
)]
struct Cli {
    /// PDF to translate
    #[arg(required_unless_present = "show_languages")]
    input: Option<PathBuf>,

    /// Output path (default: <input-stem>.<target>.pdf next to the input)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Source language code (default from settings)
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// Target language code (default from settings)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// API key for the translation service (overrides BHASHINI_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Runs per translation request
    #[arg(long = "chunk-size")]
    chunk_size: Option<usize>,

    /// Minimum pause between translation requests, in milliseconds
    #[arg(long = "delay-ms")]
    delay_ms: Option<u64>,

    /// Regular-weight font for the target script
    #[arg(long = "font")]
    font: Option<PathBuf>,

    /// Bold font for the target script
    #[arg(long = "bold-font")]
    bold_font: Option<PathBuf>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// List supported language codes and exit
    #[arg(long = "show-languages")]
    show_languages: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = pdf_layout_translator::logging::init(cli.verbose) {
        eprintln!("error: {:#}", err);
        return ExitCode::FAILURE;
    }

    let result = pdf_layout_translator::run(pdf_layout_translator::Config {
        input: cli.input,
        output: cli.output,
        source_lang: cli.source_lang,
        target_lang: cli.lang,
        key: cli.key,
        chunk_size: cli.chunk_size,
        delay_ms: cli.delay_ms,
        font: cli.font,
        bold_font: cli.bold_font,
        settings_path: cli.read_settings,
        show_languages: cli.show_languages,
    })
    .await;

    match result {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(err) => {
            match err.downcast_ref::<PipelineError>() {
                Some(pipeline_err) => eprintln!("error ({}): {}", pipeline_err.stage(), pipeline_err),
                None => eprintln!("error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
