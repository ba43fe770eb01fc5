use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set
pub fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "warn";
    }

    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize tracing on stderr. `RUST_LOG` (e.g. `RUST_LOG=probe_rs=debug`) overrides the flags.
pub fn init_logging(verbose: u8, quiet: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
