//! `nwwatch health`: check that a running server answers.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use nwwatch_daemon::config::HEALTH_ROUTE;

use super::{endpoint, DEFAULT_URL};

/// Arguments for `nwwatch health`.
#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Base URL of the server.
    #[arg(long, default_value = DEFAULT_URL)]
    pub url: String,
}

impl HealthArgs {
    pub fn run(self) -> Result<()> {
        let url = endpoint(&self.url, HEALTH_ROUTE);
        let body = get_json(&url)?;
        println!(
            "{}",
            serde_json::to_string_pretty(&body).context("failed to render health JSON")?
        );

        if body.get("status").and_then(Value::as_str) != Some("healthy") {
            bail!("server at {} is not healthy", self.url);
        }
        eprintln!("{} {}", "■".green().bold(), self.url);
        Ok(())
    }
}

/// GET `url` and decode the JSON body.
pub fn get_json(url: &str) -> Result<Value> {
    let agent = ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(3))
        .build();
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("request to {url} failed; is `nwwatch serve` running?"))?;
    response
        .into_json::<Value>()
        .with_context(|| format!("invalid JSON from {url}"))
}
