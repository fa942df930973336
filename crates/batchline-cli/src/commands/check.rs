use std::path::Path;

use anyhow::Result;
use batchline_cli::resolve;

/// Execute the `check` command: validate the job file, its components and
/// the state store, without running anything.
pub fn execute(job_path: &Path) -> Result<()> {
    let config = resolve::load_job(job_path)?;
    println!("Job structure:     OK");

    let mut ok = true;
    for step in &config.steps {
        let label = format!("Step '{}':", step.name);
        match resolve::check_step(step) {
            Ok(()) => println!("{label:18} OK"),
            Err(e) => {
                ok = false;
                println!("{label:18} FAILED");
                println!("  {e:#}");
            }
        }
    }

    match resolve::open_state_store(&config.state) {
        Ok(_) => println!("State backend:     OK"),
        Err(e) => {
            ok = false;
            println!("State backend:     FAILED");
            println!("  {e:#}");
        }
    }

    if ok {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}
