use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` filter (default `info`); `PAYNODE_LOG_JSON=1` for JSON lines.
/// Both go to stderr so command output on stdout stays parseable.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var("PAYNODE_LOG_JSON")
        .map(|value| value == "1")
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
