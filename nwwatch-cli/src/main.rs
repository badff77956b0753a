//! nwwatch: live viewer backend for nWave step folders.
//!
//! # Usage
//!
//! ```text
//! nwwatch serve <dir> [--host <ip>] [--port <n>] [--debounce-ms <n>] [--client-buffer <n>]
//!                     [--static-dir <dir>] [--strict-stop] [--log-json]
//! nwwatch health [--url <base>]
//! nwwatch status [--url <base>] [--json]
//! nwwatch steps <dir> [--json]
//! nwwatch emulate <dir> [--project <id>] [--steps <n>] [--delay-ms <n>]
//!                       [--failure-rate <p>] [--seed <n>] [--clean] [--interactive]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    emulate::EmulateArgs, health::HealthArgs, serve::ServeArgs, status::StatusArgs,
    steps::StepsArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "nwwatch",
    version,
    about = "Watch a folder of step files and stream changes to viewers",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch a steps folder and serve the viewer WebSocket in the foreground.
    Serve(ServeArgs),

    /// Check that a running server answers on /health.
    Health(HealthArgs),

    /// Show watch state, step and viewer counts of a running server.
    Status(StatusArgs),

    /// Parse a steps folder once and print its steps.
    Steps(StepsArgs),

    /// Simulate a workflow by writing step files over time.
    Emulate(EmulateArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Health(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Steps(args) => args.run(),
        Commands::Emulate(args) => args.run(),
    }
}
