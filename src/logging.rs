use tracing_subscriber::EnvFilter;

/// Initialize stderr logging.
///
/// `RUST_LOG` wins when set; otherwise `verbose` switches the crate from
/// info to debug.
pub fn init_logging(verbose: bool) {
    let default = if verbose {
        "warn,stream_extractor=debug,stream_extractor_lib=debug"
    } else {
        "warn,stream_extractor=info,stream_extractor_lib=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
