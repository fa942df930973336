//! Property tests over chunking, counting and restart.

mod support;

use batchline_engine::{
    ChunkStep, FnProcessor, Job, JobReport, PassThroughProcessor, ProcessOutcome, SkipPolicy,
};
use batchline_types::state::BatchStatus;
use proptest::prelude::*;

use support::{ids, settings, SharedSink, TestStore, VecReader};

fn expected_batches(n: usize, chunk: usize) -> Vec<usize> {
    let mut batches = vec![chunk; n / chunk];
    if n % chunk != 0 {
        batches.push(n % chunk);
    }
    batches
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn chunks_are_full_except_the_last(n in 0u32..200, chunk in 1usize..40) {
        let store = TestStore::new();
        let sink = SharedSink::new();

        let report = Job::new("p")
            .with_step(ChunkStep::new(
                "s",
                settings(chunk),
                VecReader::new(ids(n)),
                PassThroughProcessor::new(),
                sink.writer(),
            ))
            .run(&store)
            .unwrap();

        prop_assert_eq!(report.status, BatchStatus::Completed);
        prop_assert_eq!(sink.batches(), expected_batches(n as usize, chunk));
        prop_assert_eq!(sink.committed(), ids(n));
    }

    #[test]
    fn every_read_item_is_accounted_for(
        n in 0u32..150,
        chunk in 1usize..30,
        filter_every in 2u32..9,
        fail_every in 2u32..9,
    ) {
        let store = TestStore::new();
        let sink = SharedSink::new();
        let processor = FnProcessor::new(move |item: &u32| {
            if item % fail_every == 0 {
                anyhow::bail!("bad item {item}");
            }
            Ok(if item % filter_every == 0 {
                ProcessOutcome::Skip
            } else {
                ProcessOutcome::Item(*item)
            })
        });

        let report: JobReport = Job::new("p")
            .with_step(ChunkStep::new(
                "s",
                settings(chunk).with_skip_policy(SkipPolicy::unbounded()),
                VecReader::new(ids(n)),
                processor,
                sink.writer(),
            ))
            .run(&store)
            .unwrap();

        let counts = report.steps[0].counts;
        prop_assert_eq!(report.status, BatchStatus::Completed);
        prop_assert!(counts.is_balanced());
        prop_assert_eq!(counts.read, u64::from(n));
        prop_assert_eq!(counts.failed, 0);
        prop_assert_eq!(counts.written, sink.committed().len() as u64);
        let error_skips = (1..=n).filter(|i| i % fail_every == 0).count();
        prop_assert_eq!(store.skipped_items().len(), error_skips);
    }

    #[test]
    fn restart_after_sink_failure_writes_each_item_once(
        n in 1u32..150,
        chunk in 1usize..20,
        fail_on in 1usize..10,
    ) {
        let store = TestStore::new();
        let sink = SharedSink::new();

        let first = Job::new("p")
            .with_step(ChunkStep::new(
                "s",
                settings(chunk),
                VecReader::new(ids(n)),
                PassThroughProcessor::new(),
                sink.writer().fail_write_on(fail_on),
            ))
            .run(&store)
            .unwrap();
        prop_assert!(first.steps[0].counts.is_balanced());

        let second = Job::new("p")
            .with_step(ChunkStep::new(
                "s",
                settings(chunk),
                VecReader::new(ids(n)),
                PassThroughProcessor::new(),
                sink.writer(),
            ))
            .run(&store)
            .unwrap();

        let chunks = (n as usize).div_ceil(chunk);
        if fail_on <= chunks {
            prop_assert_eq!(first.status, BatchStatus::Failed);
            prop_assert!(second.resumed);
        } else {
            prop_assert_eq!(first.status, BatchStatus::Completed);
            prop_assert!(!second.resumed);
        }
        prop_assert_eq!(second.status, BatchStatus::Completed);
        prop_assert!(second.steps[0].counts.is_balanced());

        let committed = sink.committed();
        if first.status == BatchStatus::Failed {
            prop_assert_eq!(committed, ids(n));
        } else {
            // A completed instance is not resumed: the second run starts over.
            prop_assert_eq!(committed.len(), 2 * n as usize);
        }
    }
}
