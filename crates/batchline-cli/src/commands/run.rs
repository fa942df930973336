use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use batchline_cli::resolve;
use batchline_engine::JobReport;
use batchline_types::state::BatchStatus;

/// Execute the `run` command: parse, validate and run a job to completion
/// or until interrupted.
pub async fn execute(job_path: &Path, restart: Option<bool>) -> Result<ExitCode> {
    let config = resolve::load_job(job_path)?;
    tracing::info!(
        job = config.job,
        steps = config.steps.len(),
        restart_enabled = restart.unwrap_or(config.restart_enabled),
        "Job validated"
    );

    let store = resolve::open_state_store(&config.state)?;
    let mut job = resolve::build_job(&config)?;
    if let Some(enabled) = restart {
        job = job.restart_enabled(enabled);
    }

    let stop = job.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current chunk");
            stop.stop();
        }
    });

    let report = tokio::task::spawn_blocking(move || job.run(&store))
        .await
        .context("Job task panicked")??;

    print_report(&report);

    Ok(match report.status {
        BatchStatus::Completed => ExitCode::SUCCESS,
        BatchStatus::Stopped => ExitCode::from(2),
        _ => ExitCode::from(1),
    })
}

fn print_report(report: &JobReport) {
    let resumed = if report.resumed { ", resumed" } else { "" };
    println!(
        "Job '{}' (instance {}{resumed}): {}",
        report.job,
        report.instance,
        report.status.as_str().to_uppercase()
    );
    for step in &report.steps {
        println!(
            "  Step '{}': {}",
            step.step,
            step.status.as_str().to_uppercase()
        );
        println!("    Items read:      {}", step.counts.read);
        println!("    Items written:   {}", step.counts.written);
        println!("    Items skipped:   {}", step.counts.skipped);
        if step.counts.failed > 0 {
            println!("    Items failed:    {}", step.counts.failed);
        }
        println!("    Chunks:          {}", step.chunks_committed);
        match step.last_checkpoint {
            Some(position) => println!("    Checkpoint:      {position}"),
            None => println!("    Checkpoint:      none"),
        }
        if let Some(error) = &step.error {
            println!("    Error:           {error}");
        }
    }
    println!("  Duration:        {:.2}s", report.duration_secs);
}
