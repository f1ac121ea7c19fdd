//! Entry point for the `eta` binary.
#![forbid(unsafe_code)]

use tracing_subscriber::EnvFilter;

fn main() {
    // Library crates log through `log`; the fmt subscriber bridges those
    // records alongside poem's own tracing events.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = eta_cli::run() {
        eprintln!("eta: {err}");
        std::process::exit(1);
    }
}
