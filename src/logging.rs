use env_logger::{Builder, Env};

/// Initialize the `log` backend. `RUST_LOG` wins; otherwise `info`, or `debug` when verbose.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let _ = Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .try_init();
}
