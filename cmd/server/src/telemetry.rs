//! `tracing-subscriber` wiring: an `EnvFilter` layered with either a
//! human-readable or JSON formatter, selected by `--log-format`.

use clap::ValueEnum;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

pub fn init(filter: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(true).init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }
}
