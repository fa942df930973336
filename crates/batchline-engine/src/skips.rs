//! Skip policy enforcement and skipped-item persistence.

use std::fmt::Debug;

use batchline_state::ExecutionStateStore;
use batchline_types::error::ErrorCategory;
use batchline_types::position::ReadPosition;
use batchline_types::skip::{SkippedItem, Timestamp};
use batchline_types::state::{StepExecutionId, StepName};

use crate::errors::StepError;
use crate::item::ProcessOutcome;
use crate::settings::SkipPolicy;

/// A chunk's processed items split into the write batch and skip records.
#[derive(Debug)]
pub(crate) struct SortedChunk<T> {
    pub(crate) items: Vec<T>,
    pub(crate) skipped: u64,
    pub(crate) skipped_on_error: u64,
    pub(crate) records: Vec<SkippedItem>,
}

/// Apply `policy` to one chunk's processing results, in read order.
///
/// `prior_error_skips` is the step's error-skip total before this chunk;
/// the limit applies to the running total.
pub(crate) fn sort_outcomes<I: Debug, O>(
    step: &StepName,
    policy: SkipPolicy,
    prior_error_skips: u64,
    chunk_start: ReadPosition,
    raw: &[I],
    outcomes: Vec<anyhow::Result<ProcessOutcome<O>>>,
) -> Result<SortedChunk<O>, StepError> {
    let mut sorted = SortedChunk {
        items: Vec::with_capacity(outcomes.len()),
        skipped: 0,
        skipped_on_error: 0,
        records: Vec::new(),
    };

    for (offset, (item, outcome)) in (0u64..).zip(raw.iter().zip(outcomes)) {
        let position = chunk_start.advance(offset);
        match outcome {
            Ok(ProcessOutcome::Item(out)) => sorted.items.push(out),
            Ok(ProcessOutcome::Skip) => sorted.skipped += 1,
            Err(source) if !policy.enabled => {
                return Err(StepError::Process { position, source });
            }
            Err(source) => {
                let total = prior_error_skips + sorted.skipped_on_error + 1;
                if let Some(limit) = policy.max_skip_count {
                    if total > limit {
                        return Err(StepError::SkipLimitExceeded {
                            limit,
                            position,
                            source,
                        });
                    }
                }
                tracing::warn!(
                    step = step.as_str(),
                    position = %position,
                    error = %format!("{source:#}"),
                    "Skipping item after processing error"
                );
                sorted.records.push(SkippedItem {
                    step: step.as_str().to_string(),
                    position,
                    item_repr: format!("{item:?}"),
                    error_message: format!("{source:#}"),
                    category: ErrorCategory::Process,
                    skipped_at: Timestamp::new(chrono::Utc::now().to_rfc3339()),
                });
                sorted.skipped += 1;
                sorted.skipped_on_error += 1;
            }
        }
    }

    Ok(sorted)
}

/// Persist skip records for a committed chunk.
///
/// # Errors
///
/// Returns [`StepError::Checkpoint`] if the store rejects the records. The
/// chunk is already committed but its checkpoint has not been written, so a
/// restart replays the chunk and records its skips again.
pub(crate) fn persist_skipped_items(
    store: &dyn ExecutionStateStore,
    step: &StepName,
    execution: StepExecutionId,
    records: &[SkippedItem],
) -> Result<(), StepError> {
    if records.is_empty() {
        return Ok(());
    }

    let inserted = store
        .insert_skipped_items(execution, records)
        .map_err(|e| {
            tracing::error!(
                step = step.as_str(),
                skipped_count = records.len(),
                error = %e,
                "Failed to persist skipped items"
            );
            StepError::Checkpoint(e)
        })?;
    tracing::info!(
        step = step.as_str(),
        skipped_items = inserted,
        "Persisted skipped items to state store"
    );
    Ok(())
}
