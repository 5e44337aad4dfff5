//! Argument parsing, grounded on the teacher's `cmd/ethrex/cli.rs` split
//! between a flat `Options` struct (flags common to every subcommand) and a
//! `Subcommand` enum carrying the per-command arguments -- scaled down from
//! the teacher's node-operator surface to the seven commands spec.md §6
//! names.

use std::path::PathBuf;

use clap::{Parser, Subcommand as ClapSubcommand};
use tracing::Level;

use crate::logging::LogColor;

#[derive(Parser)]
#[command(
    name = "ct",
    author,
    version,
    about = "Conformance-testing engine for a stack-based VM instruction set"
)]
pub struct Cli {
    #[command(flatten)]
    pub opts: CommonOptions,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Parser, Debug, Clone)]
pub struct CommonOptions {
    #[arg(long = "log.level", default_value_t = Level::INFO, env = "CT_LOG_LEVEL", help = "Verbosity of structured logs")]
    pub log_level: Level,
    #[arg(long = "log.color", default_value_t = LogColor::Auto, env = "CT_LOG_COLOR")]
    pub log_color: LogColor,
}

#[derive(ClapSubcommand)]
pub enum Command {
    /// Lists every rule name in the specification.
    List {
        #[arg(long, help = "Only list rules whose name matches this regex")]
        filter: Option<String>,
    },
    /// Reports rule-count statistics: totals, per-instruction breakdown,
    /// and the four canonical rule kinds vs. bespoke rules.
    Stats,
    /// Prints, per rule, the boundary property groups and total enumerated
    /// case count `enumerate` would produce, without generating any states.
    GeneratorInfo {
        #[arg(long, help = "Only report rules whose name matches this regex")]
        filter: Option<String>,
    },
    /// Runs the harness against the bundled reference VM (a self-check: the
    /// rule compendium applying its own effects).
    Test(RunArgs),
    /// Runs the harness against an external VM binary speaking the
    /// line-delimited JSON protocol (see `ct-cli::subprocess_vm`).
    Run {
        /// Path to the VM-under-test binary.
        vm: PathBuf,
        #[command(flatten)]
        args: RunArgs,
    },
    /// Runs a single rule's enumerated cases against `vm` and stops at the
    /// first disagreement, printing a diff (no full-corpus pass).
    Probe {
        vm: PathBuf,
        #[arg(long, help = "Exact rule name to probe")]
        rule: String,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Replays a recorded JSON regression corpus against `vm`.
    Regressions {
        vm: PathBuf,
        #[arg(help = "Path to the regression corpus JSON file")]
        corpus: PathBuf,
    },
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    #[arg(long, help = "Only run rules whose name matches this regex")]
    pub filter: Option<String>,
    #[arg(long, default_value_t = num_cpus::get(), help = "Worker thread count")]
    pub jobs: usize,
    #[arg(long, default_value_t = 0, help = "Seed for deterministic enumeration")]
    pub seed: u64,
    #[arg(long, help = "Disable per-rule condition filtering of generated states")]
    pub full_mode: bool,
    #[arg(long = "cpuprofile", help = "Write a pprof flamegraph to this path on completion")]
    pub cpuprofile: Option<PathBuf>,
    #[arg(long, default_value_t = 100, help = "Abort after this many recorded issues")]
    pub max_errors: usize,
    #[arg(long, help = "Abort after this many minutes regardless of progress")]
    pub timeout: Option<u64>,
    #[arg(long, help = "Directory to dump failed pre/post states as JSON")]
    pub dump_dir: Option<PathBuf>,
}
