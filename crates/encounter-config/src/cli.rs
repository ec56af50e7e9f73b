//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Encounter server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "encounter-server", about = "Dynamic encounter backend")]
pub struct CliArgs {
    /// World service address.
    #[arg(long)]
    pub world_address: Option<String>,

    /// World service port.
    #[arg(long)]
    pub world_port: Option<u16>,

    /// Admin HTTP port.
    #[arg(long)]
    pub admin_port: Option<u16>,

    /// Disable the admin HTTP surface.
    #[arg(long)]
    pub no_admin: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Directory for JSON log files.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.world_address {
            self.network.world_address = addr.clone();
        }
        if let Some(port) = args.world_port {
            self.network.world_port = port;
        }
        if let Some(port) = args.admin_port {
            self.admin.port = port;
        }
        if args.no_admin {
            self.admin.enabled = false;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(ref dir) = args.log_dir {
            self.debug.log_dir = Some(dir.clone());
        }
    }
}
