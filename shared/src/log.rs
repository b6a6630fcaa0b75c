use tracing::Level;

/// One structured JSON record per line, CloudWatch friendly.
pub fn init() {
    tracing_subscriber::fmt()
        .json()
        .with_max_level(level_from_env())
        .with_current_span(false)
        .with_span_list(false)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .init();
}

fn level_from_env() -> Level {
    match std::env::var("LOG_LEVEL").as_deref() {
        Ok("trace") => Level::TRACE,
        Ok("debug") => Level::DEBUG,
        Ok("warn") => Level::WARN,
        Ok("error") => Level::ERROR,
        _ => Level::INFO,
    }
}
