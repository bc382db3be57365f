use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter for a given `-v` count. `RUST_LOG` always wins.
pub fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "queuedash=info,warn",
        2 => "queuedash=debug,info",
        _ => "trace",
    }
}

/// Installs the global subscriber. Logs go to stderr so rendered tables on
/// stdout stay clean.
pub fn init(verbose: u8, quiet: bool) -> anyhow::Result<()> {
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbose, quiet)))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::Layer::default().with_writer(std::io::stderr).with_target(false))
        .try_init()?;

    Ok(())
}
