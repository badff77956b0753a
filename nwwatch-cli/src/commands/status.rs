//! `nwwatch status`: watch state of a running server.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use tabled::{settings::Style, Table, Tabled};

use nwwatch_daemon::config::STATUS_ROUTE;

use super::health::get_json;
use super::{endpoint, DEFAULT_URL};

/// Arguments for `nwwatch status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Base URL of the server.
    #[arg(long, default_value = DEFAULT_URL)]
    pub url: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    watching: bool,
    steps: usize,
    clients: usize,
    #[serde(default)]
    pending_changes: usize,
    steps_dir: String,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "folder")]
    folder: String,
    #[tabled(rename = "watching")]
    watching: String,
    #[tabled(rename = "steps")]
    steps: usize,
    #[tabled(rename = "viewers")]
    clients: usize,
    #[tabled(rename = "pending")]
    pending: usize,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let url = endpoint(&self.url, STATUS_ROUTE);
        let body = get_json(&url)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&body).context("failed to render status JSON")?
            );
            return Ok(());
        }

        let status: StatusBody =
            serde_json::from_value(body).with_context(|| format!("unexpected status body from {url}"))?;
        println!("nwwatch v{} | {}", env!("CARGO_PKG_VERSION"), self.url);

        let watching = if status.watching {
            "yes".green().bold().to_string()
        } else {
            "no".red().bold().to_string()
        };
        let mut table = Table::new([StatusTableRow {
            folder: status.steps_dir,
            watching,
            steps: status.steps,
            clients: status.clients,
            pending: status.pending_changes,
        }]);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
