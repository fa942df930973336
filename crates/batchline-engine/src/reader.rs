//! Position-tracking wrapper around an [`ItemReader`].

use batchline_types::position::ReadPosition;

use crate::errors::StepError;
use crate::item::{ItemReader, Resume};

/// Wraps a reader and counts consumed items so the step can checkpoint and
/// resume.
pub struct ChunkReader<R> {
    inner: R,
    position: ReadPosition,
}

impl<R> ChunkReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            position: ReadPosition::START,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: ItemReader> ChunkReader<R> {
    /// Next raw item, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::SourceRead`] if the underlying reader fails; the
    /// position is not advanced in that case.
    pub fn next_item(&mut self) -> Result<Option<R::Item>, StepError> {
        match self.inner.read() {
            Ok(Some(item)) => {
                self.position = self.position.advance(1);
                Ok(Some(item))
            }
            Ok(None) => Ok(None),
            Err(source) => Err(StepError::SourceRead {
                position: self.position,
                source,
            }),
        }
    }

    #[must_use]
    pub fn current_position(&self) -> ReadPosition {
        self.position
    }

    /// Reposition to `target`.
    ///
    /// Readers that cannot seek are fast-forwarded by reading and discarding
    /// items, which only works forwards.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::SourceRead`] if the reader fails, cannot rewind to
    /// an earlier position, or runs out of items before `target`.
    pub fn seek(&mut self, target: ReadPosition) -> Result<(), StepError> {
        let resume = self
            .inner
            .seek(target)
            .map_err(|source| StepError::SourceRead {
                position: self.position,
                source,
            })?;

        match resume {
            Resume::Seeked => {
                tracing::debug!(position = %target, "Reader repositioned");
                self.position = target;
                Ok(())
            }
            Resume::Unsupported => self.fast_forward(target),
        }
    }

    fn fast_forward(&mut self, target: ReadPosition) -> Result<(), StepError> {
        if target < self.position {
            return Err(StepError::SourceRead {
                position: self.position,
                source: anyhow::anyhow!(
                    "reader cannot rewind from position {} to {target}",
                    self.position
                ),
            });
        }

        let to_discard = target.distance_from(self.position);
        if to_discard > 0 {
            tracing::warn!(
                from = %self.position,
                to = %target,
                items = to_discard,
                "Reader cannot seek, fast-forwarding by re-reading"
            );
        }
        while self.position < target {
            if self.next_item()?.is_none() {
                return Err(StepError::SourceRead {
                    position: self.position,
                    source: anyhow::anyhow!(
                        "source exhausted at position {} before checkpoint {target}",
                        self.position
                    ),
                });
            }
        }
        Ok(())
    }
}
