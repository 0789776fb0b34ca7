//! Installs the process-wide [`tracing`] subscriber.
//!
//! `RUST_LOG` always wins when set, matching the convention `tracing-subscriber`
//! itself documents; otherwise `-v`/`-vv` raises the default filter from
//! `warn` through `info` and `debug` to `trace`.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber writing to stderr so stdout stays reserved
/// for summary/plan output the CLI's own caller may want to pipe or diff.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
