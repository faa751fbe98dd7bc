//! Command-line interface.
//!
//! - `serve` (default): run the HTTP pairing service
//! - `restore`: decode a delivered session into `creds.json`

mod restore;
mod serve;

pub use restore::{RestoreArgs, restore_to, run_restore_command};
pub use serve::{ServeArgs, run_serve};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pairlink")]
#[command(about = "Links messaging accounts by pairing code and delivers the session to self-chat")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Service options used when no subcommand is given
    #[command(flatten)]
    pub serve: ServeArgs,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pairing service (default if no subcommand given)
    Serve(ServeArgs),

    /// Decode a delivered session payload into creds.json
    Restore(RestoreArgs),
}
