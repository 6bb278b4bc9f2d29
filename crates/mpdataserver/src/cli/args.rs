//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::config::ServerConfig;
use crate::logging::LogFormat;

/// Multiplayer data server for Splinter Cell: Blacklist
///
/// Issues its own CA and leaf certificate on first run, then serves the
/// multiplayer tuning blob over HTTPS.
#[derive(Parser, Debug)]
#[command(name = "mpdataserver")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (missing file means defaults)
    #[arg(
        short,
        long,
        env = "MPDATASERVER_CONFIG",
        global = true,
        default_value = "mpdataserver.toml"
    )]
    pub config: PathBuf,

    /// Listen address (overrides config)
    #[arg(short, long, global = true)]
    pub listen: Option<SocketAddr>,

    /// Directory holding ca.pem, ca.key, cert.pem and key.pem (overrides config)
    #[arg(long, global = true)]
    pub identity_dir: Option<PathBuf>,

    /// Serve this file instead of the built-in payload (overrides config)
    #[arg(long, global = true)]
    pub payload: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Increase verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Provision the identity if needed, then serve (default)
    Serve,

    /// Provision the identity if needed and exit
    Provision,

    /// Show the persisted certificates and verify the chain
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct InspectArgs {
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config.
    pub fn apply_overrides(&self, config: &mut ServerConfig) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(dir) = &self.identity_dir {
            config.identity_dir.clone_from(dir);
        }
        if let Some(payload) = &self.payload {
            config.payload_path = Some(payload.clone());
        }
    }
}
