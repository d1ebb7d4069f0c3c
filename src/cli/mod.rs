//! Command-line interface for stackup.
//!
//! There are no subcommands: every invocation provisions the stack once and
//! prints a report.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::config::{self, Overrides};
use crate::core::{Providers, Sequencer};
use crate::domain::{ProvisionRun, ResourceStatus, RunState, StepKind, StepStatus};

/// stackup - Idempotent provisioning of a demo web stack
#[derive(Parser, Debug)]
#[command(name = "stackup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Key pair name [default: ubuntu_ag]
    #[arg(long, env = "STACKUP_KEY")]
    pub key: Option<String>,

    /// Name tag of the instance [default: "Demo Instance From Script"]
    #[arg(long, env = "STACKUP_TAG")]
    pub tag: Option<String>,

    /// Security group name [default: launch-wizard-1]
    #[arg(long, env = "STACKUP_SEC")]
    pub sec: Option<String>,

    /// AWS region [default: us-east-1]
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// AWS CLI profile
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Directory the private key file is written to [default: .]
    #[arg(long)]
    pub key_dir: Option<PathBuf>,

    /// Config file (skips .stackup/config.yaml discovery)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Do not open the sites in a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Do not write a run journal
    #[arg(long)]
    pub no_journal: bool,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            key: self.key.clone(),
            tag: self.tag.clone(),
            security_group: self.sec.clone(),
            region: self.region.clone(),
            profile: self.profile.clone(),
            key_dir: self.key_dir.clone(),
            no_browser: self.no_browser,
            no_journal: self.no_journal,
        }
    }

    /// Provision the stack; exits with status 1 when a fatal step failed
    pub async fn execute(self) -> Result<()> {
        let config = config::load(self.config.as_deref(), &self.overrides())?;
        if let Some(path) = &config.config_file {
            info!(path = %path.display(), "Using config file");
        }

        let providers = Providers::aws(config.aws.clone(), config.ssh_timeout, config.fetch_timeout);
        let mut sequencer = Sequencer::new(providers)
            .with_retry_policy(config.retry.clone())
            .with_wait_policy(config.wait.clone());
        if let Some(runs_dir) = &config.runs_dir {
            sequencer = sequencer.with_journal_dir(runs_dir);
        }

        let run = sequencer.run(&config.request).await;
        print!("{}", render_report(&run));

        if let RunState::Aborted { step, error } = &run.state {
            eprintln!("\n[Run {} aborted at {}: {}]", run.id, step, error);
            std::process::exit(run.exit_code());
        }

        Ok(())
    }
}

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "not run",
        StepStatus::Running => "running",
        StepStatus::Succeeded => "ok",
        StepStatus::Unchanged => "unchanged",
        StepStatus::Failed => "FAILED",
    }
}

fn resource_label(status: ResourceStatus, preexisting: bool) -> &'static str {
    match status {
        ResourceStatus::Ready if preexisting => "existing",
        ResourceStatus::Ready => "created",
        ResourceStatus::Creating => "creating",
        ResourceStatus::Absent => "absent",
        ResourceStatus::Failed => "failed",
    }
}

/// Human-readable run report
pub fn render_report(run: &ProvisionRun) -> String {
    let mut out = String::new();

    let state = match &run.state {
        RunState::Running => "running".to_string(),
        RunState::Completed => match run.failed_steps().len() {
            0 => "completed".to_string(),
            n => format!("completed with {} failed step(s)", n),
        },
        RunState::Aborted { step, .. } => format!("aborted at {}", step),
    };

    let _ = writeln!(out, "Run ID: {}", run.id);
    let _ = writeln!(out, "Tag: {}", run.tag);
    let _ = writeln!(out, "State: {}", state);

    let _ = writeln!(out, "\nSteps:");
    for step in StepKind::ORDER {
        let (status, detail) = match run.step(step) {
            Some(record) => {
                let detail = match (&record.error, &record.detail) {
                    (Some(error), _) => format!("error: {}", error),
                    (None, Some(detail)) => detail.clone(),
                    (None, None) => String::new(),
                };
                (record.status, detail)
            }
            None => (StepStatus::Pending, String::new()),
        };
        let line = format!("  {:<24} {:<10} {}", step.name(), status_label(status), detail);
        let _ = writeln!(out, "{}", line.trim_end());
    }

    if !run.resources.is_empty() {
        let _ = writeln!(out, "\nResources:");
        for resource in &run.resources {
            let _ = writeln!(
                out,
                "  {:<16} {:<10} {} {}",
                resource.kind.label(),
                resource_label(resource.status, resource.preexisting),
                resource.name,
                resource
                    .id
                    .as_deref()
                    .map(|id| format!("({})", id))
                    .unwrap_or_default()
            );
        }
    }

    if run.instance_site.is_some() || run.bucket_site.is_some() {
        let _ = writeln!(out, "\nSites:");
        if let Some(url) = &run.instance_site {
            let _ = writeln!(out, "  instance: {}", url);
        }
        if let Some(url) = &run.bucket_site {
            let _ = writeln!(out, "  website:  {}", url);
        }
    }

    out
}
