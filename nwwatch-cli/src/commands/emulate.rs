//! `nwwatch emulate`: drive a steps folder through a fake workflow.
//!
//! All steps are first written as `pending`, then progressed one at a time:
//! `in_progress` → `completed`, or on a simulated failure
//! `failed` → `in_progress` → `completed` (80%) / `skipped`.
//!
//! With `--interactive` the folder is reset and progression is driven by
//! commands read from stdin instead.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use nwwatch_core::{write_step, StepRecord, StepStatus};

const PHASES: [(&str, &[&str]); 5] = [
    (
        "research",
        &[
            "Analyze existing codebase structure",
            "Research best practices for implementation",
            "Identify dependencies and constraints",
            "Review related documentation",
        ],
    ),
    (
        "design",
        &[
            "Design component architecture",
            "Define API contracts",
            "Create data models",
            "Plan integration points",
        ],
    ),
    (
        "implement",
        &[
            "Implement core functionality",
            "Add error handling",
            "Create unit tests",
            "Refactor for clarity",
            "Add logging and monitoring",
        ],
    ),
    (
        "test",
        &[
            "Run integration tests",
            "Perform load testing",
            "Validate edge cases",
            "Fix failing tests",
        ],
    ),
    (
        "deploy",
        &[
            "Prepare deployment configuration",
            "Deploy to staging environment",
            "Run smoke tests",
            "Deploy to production",
        ],
    ),
];

const RETRY_SUCCESS_RATE: f64 = 0.8;
const CREATE_PAUSE: Duration = Duration::from_millis(100);

/// Arguments for `nwwatch emulate`.
#[derive(Args, Debug)]
pub struct EmulateArgs {
    /// Folder to write step files into (created if missing).
    pub dir: PathBuf,

    #[arg(long, short = 'p', default_value = "test-project")]
    pub project: String,

    /// Number of steps to create.
    #[arg(long, short = 'n', default_value_t = 15)]
    pub steps: usize,

    /// Base delay between transitions.
    #[arg(long, short = 'd', default_value_t = 2000)]
    pub delay_ms: u64,

    /// Probability that a step fails before being retried (0.0–1.0).
    #[arg(long, short = 'f', default_value_t = 0.1)]
    pub failure_rate: f64,

    /// Seed for a reproducible run.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Remove the folder and everything in it before starting.
    #[arg(long)]
    pub clean: bool,

    /// Drive progression by hand from stdin (always starts from a clean folder).
    #[arg(long, short = 'i')]
    pub interactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedStep {
    task_id: String,
    phase: &'static str,
    description: &'static str,
}

/// Spread `count` steps across the phases, numbering `<phase>-<index>`.
fn plan_steps(count: usize) -> Vec<PlannedStep> {
    let per_phase = count / PHASES.len() + 1;
    let mut steps = Vec::with_capacity(count);

    for (major, &(phase, descriptions)) in PHASES.iter().enumerate() {
        for (minor, description) in descriptions.iter().copied().take(per_phase).enumerate() {
            if steps.len() >= count {
                return steps;
            }
            steps.push(PlannedStep {
                task_id: format!("{:02}-{:02}", major + 1, minor + 1),
                phase,
                description,
            });
        }
    }
    steps
}

impl EmulateArgs {
    pub fn run(self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            bail!("--failure-rate must be between 0.0 and 1.0, got {}", self.failure_rate);
        }

        if self.clean || self.interactive {
            reset_dir(&self.dir)?;
        } else {
            fs::create_dir_all(&self.dir)
                .with_context(|| format!("failed to create '{}'", self.dir.display()))?;
        }

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut emulator = Emulator {
            dir: self.dir,
            project: self.project,
            delay: Duration::from_millis(self.delay_ms),
            failure_rate: self.failure_rate,
            rng,
        };
        let plan = plan_steps(self.steps);
        if self.interactive {
            emulator.run_interactive(&plan, io::stdin().lock())
        } else {
            emulator.run(&plan)
        }
    }
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("failed to clean '{}'", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("failed to create '{}'", dir.display()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Next,
    Fail,
    Skip,
    Auto,
    Restart,
    Quit,
}

impl FromStr for Control {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "n" | "next" => Ok(Self::Next),
            "f" | "fail" => Ok(Self::Fail),
            "s" | "skip" => Ok(Self::Skip),
            "a" | "auto" => Ok(Self::Auto),
            "r" | "restart" => Ok(Self::Restart),
            "q" | "quit" | "exit" => Ok(Self::Quit),
            other => Err(other.to_string()),
        }
    }
}

const CONTROL_HELP: &str = "\
Commands:
  n / next     complete the current step and start the next
  f / fail     fail the current step (then n to retry or s to skip)
  s / skip     skip the current step
  a / auto     finish the remaining steps automatically
  r / restart  reset the folder and start over
  q / quit     exit";

struct Emulator {
    dir: PathBuf,
    project: String,
    delay: Duration,
    failure_rate: f64,
    rng: StdRng,
}

impl Emulator {
    fn run(&mut self, plan: &[PlannedStep]) -> Result<()> {
        println!(
            "Emulating {} steps for '{}' in {}",
            plan.len(),
            self.project,
            self.dir.display()
        );

        for step in plan {
            self.write(step, StepStatus::Pending)?;
            println!("  {} {}: {}", tag(StepStatus::Pending), step.task_id, step.description);
            sleep(self.delay.min(CREATE_PAUSE));
        }
        sleep(self.delay);

        for (index, step) in plan.iter().enumerate() {
            println!("{}", format!("Step {}/{}: {}", index + 1, plan.len(), step.task_id).bold());
            self.transition(step, StepStatus::Pending, StepStatus::InProgress)?;
            let work = self.delay.mul_f64(self.rng.gen_range(0.5..1.5));
            sleep(work);

            if self.rng.gen_bool(self.failure_rate) {
                self.transition(step, StepStatus::InProgress, StepStatus::Failed)?;
                sleep(self.delay / 2);
                self.transition(step, StepStatus::Failed, StepStatus::InProgress)?;
                sleep(self.delay / 2);

                let outcome = if self.rng.gen_bool(RETRY_SUCCESS_RATE) {
                    StepStatus::Completed
                } else {
                    StepStatus::Skipped
                };
                self.transition(step, StepStatus::InProgress, outcome)?;
            } else {
                self.transition(step, StepStatus::InProgress, StepStatus::Completed)?;
            }
        }

        println!("{}", "Emulation complete.".green().bold());
        Ok(())
    }

    /// Create every step as pending, start the first, then obey `input` line
    /// by line until quit or end of input.
    fn run_interactive(&self, plan: &[PlannedStep], input: impl BufRead) -> Result<()> {
        println!("Interactive mode for '{}' in {}", self.project, self.dir.display());
        println!("{CONTROL_HELP}");
        let mut current = self.begin(plan)?;
        print!("> ");
        io::stdout().flush().context("failed to flush stdout")?;

        for line in input.lines() {
            let line = line.context("failed to read command")?;
            if line.trim().is_empty() {
                continue;
            }
            let control = match line.parse::<Control>() {
                Ok(control) => control,
                Err(unknown) => {
                    println!("Unknown command '{unknown}'. Use: n(ext), f(ail), s(kip), a(uto), r(estart), q(uit)");
                    continue;
                }
            };

            match control {
                Control::Quit => break,
                Control::Next => current = self.advance(plan, current, StepStatus::Completed)?,
                Control::Skip => current = self.advance(plan, current, StepStatus::Skipped)?,
                Control::Fail => {
                    if let Some(step) = plan.get(current) {
                        self.write(step, StepStatus::Failed)?;
                        println!("  {} {}: use n to retry or s to skip", tag(StepStatus::Failed), step.task_id);
                    }
                }
                Control::Auto => {
                    println!("{}", "Switching to automatic mode".bold());
                    while current < plan.len() {
                        sleep(self.delay / 2);
                        current = self.advance(plan, current, StepStatus::Completed)?;
                    }
                    break;
                }
                Control::Restart => {
                    println!("{}", "Restarting".bold());
                    reset_dir(&self.dir)?;
                    current = self.begin(plan)?;
                }
            }
            print!("> ");
            io::stdout().flush().context("failed to flush stdout")?;
        }

        println!("Exiting.");
        Ok(())
    }

    /// Write every step as pending and start the first. Returns its index.
    fn begin(&self, plan: &[PlannedStep]) -> Result<usize> {
        for step in plan {
            self.write(step, StepStatus::Pending)?;
        }
        println!("Created {} steps.", plan.len());
        if let Some(first) = plan.first() {
            self.transition(first, StepStatus::Pending, StepStatus::InProgress)?;
        }
        Ok(0)
    }

    /// Finish the current step with `outcome` and start the next one.
    fn advance(&self, plan: &[PlannedStep], current: usize, outcome: StepStatus) -> Result<usize> {
        let Some(step) = plan.get(current) else {
            return Ok(current);
        };
        self.write(step, outcome)?;
        println!("  {} {}", tag(outcome), step.task_id);
        match plan.get(current + 1) {
            Some(next) => self.transition(next, StepStatus::Pending, StepStatus::InProgress)?,
            None => println!("{}", "All steps processed.".green().bold()),
        }
        Ok(current + 1)
    }

    fn transition(&self, step: &PlannedStep, from: StepStatus, to: StepStatus) -> Result<()> {
        self.write(step, to)?;
        println!("  {} -> {} {}", tag(from), tag(to), step.task_id);
        Ok(())
    }

    fn write(&self, step: &PlannedStep, status: StepStatus) -> Result<()> {
        let record = StepRecord::new(
            step.task_id.as_str(),
            self.project.as_str(),
            step.phase,
            step.description,
            status,
        );
        write_step(&self.dir, &record)
            .with_context(|| format!("failed to write step {}", step.task_id))?;
        Ok(())
    }
}

fn tag(status: StepStatus) -> String {
    let text = format!("[{:<11}]", status.as_str().to_uppercase());
    match status {
        StepStatus::Pending => text.bright_black().to_string(),
        StepStatus::InProgress => text.cyan().to_string(),
        StepStatus::Completed => text.green().to_string(),
        StepStatus::Failed => text.red().to_string(),
        StepStatus::Skipped => text.yellow().to_string(),
    }
}
