use std::env;

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
    Compact,
}

/// Diagnostics always go to stderr; stdout carries only results.
pub fn init(verbose: bool, silent: bool) {
    let filter = build_filter(env::var("DATAGEN_LOG").ok(), verbose, silent);
    let registry = Registry::default().with(filter);

    match parse_format(env::var("DATAGEN_LOG_FORMAT").ok().as_deref()) {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr);
            let _ = registry.with(layer).try_init();
        }
        LogFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr);
            let _ = registry.with(layer).try_init();
        }
        LogFormat::Compact => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr);
            let _ = registry.with(layer).try_init();
        }
    }
}

fn build_filter(directive: Option<String>, verbose: bool, silent: bool) -> EnvFilter {
    match directive.filter(|value| !value.trim().is_empty()) {
        Some(value) => EnvFilter::new(value),
        None if silent => EnvFilter::new("off"),
        None if verbose => EnvFilter::new("debug"),
        None => EnvFilter::new("warn"),
    }
}

fn parse_format(value: Option<&str>) -> LogFormat {
    match value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_ascii_lowercase())
    {
        Some(value) if value == "json" => LogFormat::Json,
        Some(value) if value == "pretty" => LogFormat::Pretty,
        _ => LogFormat::Compact,
    }
}
