use anyhow::Result;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Installs a stderr subscriber when `verbose` is set; otherwise the run is
/// silent apart from the final summary.
pub fn init(verbose: bool) -> Result<()> {
    if !verbose {
        return Ok(());
    }
    // lopdf logs every text decode at info
    let filter = Targets::new()
        .with_default(Level::DEBUG)
        .with_target("lopdf", Level::WARN);
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true),
        )
        .with(filter)
        .try_init();
    Ok(())
}
