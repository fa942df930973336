use std::path::Path;

use anyhow::Result;
use batchline_cli::resolve;
use batchline_state::ExecutionStateStore;
use batchline_types::state::{ExecutionState, JobName};

/// Execute the `status` command: show the latest instance of the job and
/// the latest attempt of each of its steps.
pub fn execute(job_path: &Path) -> Result<()> {
    let config = resolve::load_job(job_path)?;
    let store = resolve::open_state_store(&config.state)?;
    let job = JobName::new(config.job.as_str());

    let Some(instance) = store.latest_job_instance(&job)? else {
        println!("No runs recorded for job '{job}'.");
        return Ok(());
    };

    println!(
        "Job '{job}' instance {}: {} (created {})",
        instance.id,
        instance.status.as_str().to_uppercase(),
        instance.created_at
    );
    let steps = store.list_step_states(instance.id)?;
    if steps.is_empty() {
        println!("  No step executions.");
    }
    for state in &steps {
        print_step(state);
    }
    Ok(())
}

fn print_step(state: &ExecutionState) {
    println!(
        "  Step '{}' (attempt {}): {}",
        state.step,
        state.attempt,
        state.status().as_str().to_uppercase()
    );
    match &state.checkpoint {
        Some(cp) => {
            println!("    Checkpoint:      {} ({})", cp.position, cp.updated_at);
            println!("    Items read:      {}", cp.counters.read);
            println!("    Items written:   {}", cp.counters.written);
            println!(
                "    Items skipped:   {} ({} on error)",
                cp.counters.skipped, cp.counters.skipped_on_error
            );
        }
        None => println!("    Checkpoint:      none"),
    }
    if let Some(message) = state.error_message() {
        println!("    Last error:      {message}");
    }
}
