//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Molt - Python build pipeline
///
/// Prepares a Python application source tree for launch: resolves the
/// runtime version, installs it with the app's dependencies, and keeps
/// a cache so subsequent builds are incremental.
#[derive(Parser, Debug)]
#[command(name = "molt")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Application source tree to build in place
    pub build_dir: PathBuf,

    /// Cache directory persisted between builds
    pub cache_dir: PathBuf,

    /// Directory of per-file platform environment variables
    pub env_dir: PathBuf,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
