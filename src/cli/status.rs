//! `binswap status`: show installed builds and what each remote source reports.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use super::common::CliConfig;
use crate::upgrade::{
    BuildNumber, LocalBinaryRecord, LocalInventory, ProbeReport, RemoteVersionProber,
};

/// Show local and remote build information.
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Do not contact remote sources
    #[arg(long)]
    offline: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    install_dir: PathBuf,
    current_image: Option<PathBuf>,
    local: Vec<LocalBinaryRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote: Option<ProbeReport>,
    latest_remote: Option<BuildNumber>,
}

impl StatusCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = cli.load_config().await?;
        let context = config.context()?;

        let inventory =
            LocalInventory::scan(&context.install_dir, &context.naming, context.current_image.as_deref())
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    LocalInventory::default()
                });

        let remote = if self.offline {
            None
        } else {
            let prober = RemoteVersionProber::from_config(&config.remote, config.http_client()?);
            Some(prober.probe_all().await)
        };

        let report = StatusReport {
            install_dir: context.install_dir.clone(),
            current_image: context.current_image.clone(),
            local: inventory.records().to_vec(),
            latest_remote: remote.as_ref().and_then(ProbeReport::latest),
            remote,
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

fn print_report(report: &StatusReport) {
    println!("{}", "Local builds".bold());
    println!("  Install dir: {}", report.install_dir.display());
    if report.local.is_empty() {
        println!("  (none)");
    }
    for record in &report.local {
        let marker = if record.is_current_image { " (running)".green().to_string() } else { String::new() };
        println!("  {:>6}  {}{}", record.build, record.path.display(), marker);
    }

    let Some(remote) = &report.remote else {
        return;
    };

    println!("\n{}", "Remote sources".bold());
    for record in &remote.records {
        println!("  {:<15} {:>6}  {}", record.source, record.build, record.raw_evidence.dimmed());
    }
    for failure in &remote.failures {
        println!("  {:<15} {}  {}", failure.source, "failed".red(), failure.error);
    }
    match report.latest_remote {
        Some(build) => println!("\nLatest published build: {}", build.to_string().cyan()),
        None => println!("\nLatest published build: {}", "unknown".yellow()),
    }
}
