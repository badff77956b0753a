//! `nwwatch steps`: one-shot parse of a steps folder.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use nwwatch_core::{JsonStepSource, Step, StepStatus};

/// Arguments for `nwwatch steps`.
#[derive(Args, Debug)]
pub struct StepsArgs {
    /// Folder containing `<id>.json` step files.
    pub dir: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StepsReportJson<'a> {
    steps: &'a [Step],
    rejected: Vec<RejectedJson>,
}

#[derive(Serialize)]
struct RejectedJson {
    #[serde(rename = "taskId")]
    task_id: String,
    error: String,
}

#[derive(Tabled)]
struct StepTableRow {
    #[tabled(rename = "task")]
    task_id: String,
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "description")]
    description: String,
}

impl StepsArgs {
    pub fn run(self) -> Result<()> {
        let source = JsonStepSource::new(&self.dir);
        let scanned = source
            .scan()
            .with_context(|| format!("failed to read steps folder '{}'", self.dir.display()))?;

        let mut steps = Vec::new();
        let mut rejected = Vec::new();
        for (id, loaded) in scanned {
            match loaded {
                Ok(step) => steps.push(step),
                Err(err) => rejected.push(RejectedJson {
                    task_id: id.to_string(),
                    error: err.to_string(),
                }),
            }
        }
        steps.sort_by_key(|step| (step.major(), step.minor()));

        if self.json {
            let payload = StepsReportJson {
                steps: &steps,
                rejected,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize steps JSON")?
            );
            return Ok(());
        }

        print_table(&steps);
        for entry in &rejected {
            println!("{} {}: {}", "skipped".yellow().bold(), entry.task_id, entry.error);
        }
        Ok(())
    }
}

fn print_table(steps: &[Step]) {
    let done = steps
        .iter()
        .filter(|step| matches!(step.status(), StepStatus::Completed | StepStatus::Skipped))
        .count();
    println!("{} steps | {} done", steps.len(), done);
    if steps.is_empty() {
        println!("No step files found.");
        return;
    }

    let rows: Vec<StepTableRow> = steps
        .iter()
        .map(|step| StepTableRow {
            task_id: step.id().to_string(),
            phase: step.phase().to_string(),
            status: status_label(step.status()),
            description: step.description().to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn status_label(status: StepStatus) -> String {
    let label = status.as_str().to_uppercase();
    match status {
        StepStatus::Pending => label.bright_black().to_string(),
        StepStatus::InProgress => label.cyan().bold().to_string(),
        StepStatus::Completed => label.green().bold().to_string(),
        StepStatus::Failed => label.red().bold().to_string(),
        StepStatus::Skipped => label.yellow().to_string(),
    }
}
