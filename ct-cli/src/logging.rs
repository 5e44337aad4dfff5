//! Tracing-subscriber setup, grounded on the teacher's `init_tracing`
//! (`cmd/ethrex/initializers.rs`): an `EnvFilter` seeded from a CLI-chosen
//! default directive, falling back to `RUST_LOG`, plus TTY-aware color.
//!
//! Unlike the teacher's version this crate has no file-logging sink (no
//! `tracing-appender` in the workspace's dependency table for this repo --
//! the CLI only ever writes to stdout/stderr), so there is no reload handle
//! or worker guard to return.

use std::io::IsTerminal;

use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogColor {
    #[default]
    Auto,
    Always,
    Never,
}

impl std::fmt::Display for LogColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogColor::Auto => write!(f, "auto"),
            LogColor::Always => write!(f, "always"),
            LogColor::Never => write!(f, "never"),
        }
    }
}

pub fn init_tracing(level: Level, color: LogColor) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let use_color = match color {
        LogColor::Always => true,
        LogColor::Never => false,
        LogColor::Auto => std::io::stderr().is_terminal(),
    };

    let include_target = matches!(level, Level::DEBUG | Level::TRACE);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(include_target)
        .with_ansi(use_color)
        .with_writer(std::io::stderr)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("tracing subscriber already set");
    }
}
