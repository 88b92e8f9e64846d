//! Command line.

use std::path::PathBuf;

use clap::Parser;

/// VERDANT - autonomous garden bot
#[derive(Parser, Debug)]
#[command(name = "verdant", version)]
#[command(about = "Keeps a garden harvested, its pets fed and its shop stock topped up")]
pub struct Args {
    /// Config file (TOML)
    #[arg(long, short = 'c', default_value = "verdant.toml")]
    pub config: PathBuf,

    /// Room tried before the configured ones
    #[arg(long)]
    pub room_id: Option<String>,

    /// Append every sent and received frame to this file
    #[arg(long)]
    pub journal: Option<PathBuf>,

    /// Seconds between status lines, 0 to disable
    #[arg(long, default_value_t = 60)]
    pub status_interval: u64,

    /// Check the config and exit
    #[arg(long)]
    pub check: bool,
}
