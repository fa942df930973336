use batchline_cli::resolve;
use batchline_e2e::harness::{JobFile, Workspace, FIXTURE_JOB};
use batchline_engine::ItemCounts;
use batchline_types::error::ErrorCategory;
use batchline_types::position::ReadPosition;
use batchline_types::state::BatchStatus;
use rstest::rstest;

/// Ids of the fixture file minus the blank one (5) and the malformed one (17).
fn importable_ids() -> Vec<i64> {
    (1..=30).filter(|id| *id != 5 && *id != 17).collect()
}

fn counts(read: u64, written: u64, skipped: u64, failed: u64) -> ItemCounts {
    ItemCounts {
        read,
        written,
        skipped,
        failed,
    }
}

#[test]
fn fixture_job_passes_check() {
    let ws = Workspace::from_fixtures().unwrap();
    let config = resolve::load_job(&ws.job_path()).unwrap();
    for step in &config.steps {
        resolve::check_step(step).unwrap();
    }
}

#[test]
fn fixture_job_imports_and_cleans_customers() {
    let ws = Workspace::from_fixtures().unwrap();
    let report = ws.run().unwrap();

    assert_eq!(report.status, BatchStatus::Completed);
    assert!(!report.resumed);
    let step = &report.steps[0];
    assert_eq!(step.counts, counts(30, 28, 2, 0));
    assert_eq!(step.last_checkpoint, Some(ReadPosition::new(30)));

    let customers = ws.customers().unwrap();
    assert_eq!(
        customers.iter().map(|c| c.id).collect::<Vec<_>>(),
        importable_ids()
    );
    let alan = customers.iter().find(|c| c.id == 3).unwrap();
    assert_eq!(alan.first_name.as_deref(), Some("Alan"));
    let edsger = customers.iter().find(|c| c.id == 4).unwrap();
    assert_eq!(
        edsger.email.as_deref(),
        Some("edsger.dijkstra@example.com")
    );

    // Only the processing error is recorded; the blank id is a filter.
    let skips = ws.skipped_items().unwrap();
    assert_eq!(skips.len(), 1);
    assert_eq!(skips[0].position, 16);
    assert!(skips[0].item_repr.contains("x17"));
    assert!(skips[0].error_message.contains("invalid customer id"));

    assert_eq!(
        ws.latest_status(FIXTURE_JOB).unwrap(),
        Some(BatchStatus::Completed)
    );
}

#[test]
fn failed_import_resumes_after_enabling_skips() {
    let ws = Workspace::from_fixtures().unwrap();
    ws.write_job(&JobFile::default()).unwrap();

    let first = ws.run().unwrap();
    assert_eq!(first.status, BatchStatus::Failed);
    let failure = first.steps[0].error.as_ref().unwrap();
    assert_eq!(failure.category, ErrorCategory::Process);
    assert!(failure.message.contains("position 16"));
    // The first chunk committed; the second rolled back.
    assert_eq!(ws.customer_ids().unwrap(), (1..=10).filter(|id| *id != 5).collect::<Vec<_>>());
    assert_eq!(first.steps[0].last_checkpoint, Some(ReadPosition::new(10)));
    assert_eq!(
        ws.latest_status(FIXTURE_JOB).unwrap(),
        Some(BatchStatus::Failed)
    );

    ws.write_job(&JobFile::default().with_skips(Some(5))).unwrap();
    let second = ws.run().unwrap();
    assert!(second.resumed);
    assert_eq!(second.instance, first.instance);
    assert_eq!(second.status, BatchStatus::Completed);
    assert_eq!(second.steps[0].counts, counts(30, 28, 2, 0));
    assert_eq!(ws.customer_ids().unwrap(), importable_ids());
}

#[test]
fn skip_limit_of_zero_fails_the_step() {
    let ws = Workspace::from_fixtures().unwrap();
    ws.write_job(&JobFile::default().with_skips(Some(0))).unwrap();

    let report = ws.run().unwrap();
    assert_eq!(report.status, BatchStatus::Failed);
    let failure = report.steps[0].error.as_ref().unwrap();
    assert_eq!(failure.category, ErrorCategory::Process);
    assert!(failure.message.contains("skip limit of 0 exceeded"));
    assert!(ws.skipped_items().unwrap().is_empty());
}

#[test]
fn completed_job_runs_again_as_a_new_instance() {
    let ws = Workspace::from_fixtures().unwrap();
    let first = ws.run().unwrap();
    let second = ws.run().unwrap();

    assert_eq!(second.status, BatchStatus::Completed);
    assert!(!second.resumed);
    assert_ne!(second.instance, first.instance);
    // Rows are keyed by id, so a second full pass replaces rather than adds.
    assert_eq!(ws.customer_ids().unwrap(), importable_ids());
    assert_eq!(ws.skipped_items().unwrap().len(), 2);
}

#[rstest]
fn import_is_independent_of_chunking(
    #[values(1, 3, 7, 50)] chunk_size: usize,
    #[values(1, 4)] workers: usize,
) {
    let ws = Workspace::from_fixtures().unwrap();
    ws.write_job(&JobFile {
        chunk_size,
        workers,
        ..JobFile::default().with_skips(None)
    })
    .unwrap();

    let report = ws.run().unwrap();
    assert_eq!(report.status, BatchStatus::Completed);
    assert_eq!(report.steps[0].counts, counts(30, 28, 2, 0));
    assert_eq!(ws.customer_ids().unwrap(), importable_ids());
}

#[test]
fn stopped_job_resumes_on_next_run() {
    let ws = Workspace::from_fixtures().unwrap();
    let stopped = ws
        .run_with(|job| {
            job.stop_handle().stop();
            job
        })
        .unwrap();

    assert_eq!(stopped.status, BatchStatus::Stopped);
    assert!(ws.customers().unwrap().is_empty());
    assert_eq!(
        ws.latest_status(FIXTURE_JOB).unwrap(),
        Some(BatchStatus::Stopped)
    );

    let resumed = ws.run().unwrap();
    assert!(resumed.resumed);
    assert_eq!(resumed.instance, stopped.instance);
    assert_eq!(resumed.status, BatchStatus::Completed);
    assert_eq!(ws.customer_ids().unwrap(), importable_ids());
}

#[test]
fn restart_disabled_reprocesses_from_the_start() {
    let ws = Workspace::from_fixtures().unwrap();
    let job = JobFile {
        restart_enabled: false,
        ..JobFile::default()
    };
    ws.write_job(&job).unwrap();

    let first = ws.run().unwrap();
    let second = ws.run().unwrap();
    assert_eq!(second.status, BatchStatus::Failed);
    assert!(!second.resumed);
    assert_ne!(second.instance, first.instance);
    assert_eq!(second.steps[0].counts, counts(20, 9, 1, 10));
}

#[test]
fn strict_reader_fails_on_short_record() {
    let ws = Workspace::new().unwrap();
    ws.write_data(
        "short.csv",
        "id,firstName,lastName,email,gender,contactNo,country,dob\n\
         1,Ada,Lovelace,ada@example.com,Female,555-0100,United Kingdom,1815-12-10\n\
         2,Grace\n",
    )
    .unwrap();
    ws.write_job(&JobFile {
        input: "short.csv".into(),
        strict: true,
        ..JobFile::default()
    })
    .unwrap();

    let report = ws.run().unwrap();
    assert_eq!(report.status, BatchStatus::Failed);
    let failure = report.steps[0].error.as_ref().unwrap();
    assert_eq!(failure.category, ErrorCategory::SourceRead);
    assert!(failure.message.contains("line 3: expected 8 fields, found 2"));
    assert!(ws.customers().unwrap().is_empty());
}

#[test]
fn lenient_reader_pads_short_records() {
    let ws = Workspace::new().unwrap();
    ws.write_data("short.csv", "id,firstName\n1,Ada\n2\n")
        .unwrap();
    ws.write_job(&JobFile {
        input: "short.csv".into(),
        ..JobFile::default()
    })
    .unwrap();

    let report = ws.run().unwrap();
    assert_eq!(report.status, BatchStatus::Completed);
    let customers = ws.customers().unwrap();
    assert_eq!(customers.len(), 2);
    assert_eq!(customers[1].first_name, None);
}

#[test]
fn missing_input_fails_before_running() {
    let ws = Workspace::new().unwrap();
    ws.write_job(&JobFile {
        input: "absent.csv".into(),
        ..JobFile::default()
    })
    .unwrap();

    let err = ws.run().unwrap_err();
    assert!(format!("{err:#}").contains("cannot open reader"));
}
