//! Reader, processor and writer contracts.
//!
//! These are the three pluggable stages of a chunk-oriented step. They are
//! deliberately small: the engine owns transactions, positions, retries and
//! skip accounting, and implementations only move items.
//!
//! Implementations return [`anyhow::Result`]; the engine classifies a
//! failure by the stage it came from (see [`StepError`](crate::StepError)).

use std::marker::PhantomData;

use batchline_types::position::ReadPosition;

/// How a reader responded to a resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// The reader repositioned itself; the next `read` yields the item at
    /// the requested position.
    Seeked,
    /// The reader cannot reposition; the engine fast-forwards by reading
    /// and discarding items.
    Unsupported,
}

/// Source of raw items.
pub trait ItemReader: Send {
    type Item: Send;

    /// Next raw item, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or corrupt input.
    fn read(&mut self) -> anyhow::Result<Option<Self::Item>>;

    /// Reposition so the next `read` yields the item at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader supports seeking but could not reach
    /// `position`.
    fn seek(&mut self, position: ReadPosition) -> anyhow::Result<Resume> {
        let _ = position;
        Ok(Resume::Unsupported)
    }
}

impl<R: ItemReader + ?Sized> ItemReader for &mut R {
    type Item = R::Item;

    fn read(&mut self) -> anyhow::Result<Option<Self::Item>> {
        (**self).read()
    }

    fn seek(&mut self, position: ReadPosition) -> anyhow::Result<Resume> {
        (**self).seek(position)
    }
}

impl<R: ItemReader + ?Sized> ItemReader for Box<R> {
    type Item = R::Item;

    fn read(&mut self) -> anyhow::Result<Option<Self::Item>> {
        (**self).read()
    }

    fn seek(&mut self, position: ReadPosition) -> anyhow::Result<Resume> {
        (**self).seek(position)
    }
}

/// Result of processing one raw item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome<T> {
    /// Transformed item to include in the write batch.
    Item(T),
    /// Intentionally excluded; still advances the read position.
    Skip,
}

/// Transforms raw items one at a time.
///
/// Processors must not rely on state shared between items: within a chunk
/// items may be processed concurrently and in any order.
pub trait ItemProcessor: Send + Sync {
    type Input: Send + Sync;
    type Output: Send;

    /// # Errors
    ///
    /// Returns an error when the item cannot be transformed. Whether that
    /// fails the chunk or becomes a skip depends on the step's skip policy.
    fn process(&self, item: &Self::Input) -> anyhow::Result<ProcessOutcome<Self::Output>>;
}

impl<P: ItemProcessor + ?Sized> ItemProcessor for &P {
    type Input = P::Input;
    type Output = P::Output;

    fn process(&self, item: &Self::Input) -> anyhow::Result<ProcessOutcome<Self::Output>> {
        (**self).process(item)
    }
}

/// Destination of transformed items, written one chunk per transaction.
///
/// The engine calls `begin`, at most one `write_batch`, then exactly one of
/// `commit` or `rollback` per chunk.
pub trait ItemWriter: Send {
    type Item;

    /// Open the chunk transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot start a transaction.
    fn begin(&mut self) -> anyhow::Result<()>;

    /// Write the whole chunk inside the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any item is rejected; the engine rolls back.
    fn write_batch(&mut self, items: &[Self::Item]) -> anyhow::Result<()>;

    /// # Errors
    ///
    /// Returns an error if the transaction could not be committed.
    fn commit(&mut self) -> anyhow::Result<()>;

    /// Discard everything written since `begin`.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination could not roll back.
    fn rollback(&mut self) -> anyhow::Result<()>;
}

impl<W: ItemWriter + ?Sized> ItemWriter for &mut W {
    type Item = W::Item;

    fn begin(&mut self) -> anyhow::Result<()> {
        (**self).begin()
    }

    fn write_batch(&mut self, items: &[Self::Item]) -> anyhow::Result<()> {
        (**self).write_batch(items)
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> anyhow::Result<()> {
        (**self).rollback()
    }
}

impl<W: ItemWriter + ?Sized> ItemWriter for Box<W> {
    type Item = W::Item;

    fn begin(&mut self) -> anyhow::Result<()> {
        (**self).begin()
    }

    fn write_batch(&mut self, items: &[Self::Item]) -> anyhow::Result<()> {
        (**self).write_batch(items)
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> anyhow::Result<()> {
        (**self).rollback()
    }
}

/// Processor that forwards every item unchanged.
pub struct PassThroughProcessor<T> {
    _item: PhantomData<fn() -> T>,
}

impl<T> PassThroughProcessor<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { _item: PhantomData }
    }
}

impl<T> Default for PassThroughProcessor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> ItemProcessor for PassThroughProcessor<T> {
    type Input = T;
    type Output = T;

    fn process(&self, item: &T) -> anyhow::Result<ProcessOutcome<T>> {
        Ok(ProcessOutcome::Item(item.clone()))
    }
}

/// Processor backed by a closure.
///
/// ```
/// use batchline_engine::item::{FnProcessor, ItemProcessor, ProcessOutcome};
///
/// let evens = FnProcessor::new(|n: &u32| {
///     Ok(if n % 2 == 0 { ProcessOutcome::Item(n * 10) } else { ProcessOutcome::Skip })
/// });
/// assert_eq!(evens.process(&4).unwrap(), ProcessOutcome::Item(40));
/// assert_eq!(evens.process(&3).unwrap(), ProcessOutcome::Skip);
/// ```
pub struct FnProcessor<I, O, F> {
    f: F,
    _types: PhantomData<fn(&I) -> O>,
}

impl<I, O, F> FnProcessor<I, O, F>
where
    F: Fn(&I) -> anyhow::Result<ProcessOutcome<O>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

impl<I, O, F> ItemProcessor for FnProcessor<I, O, F>
where
    I: Send + Sync,
    O: Send,
    F: Fn(&I) -> anyhow::Result<ProcessOutcome<O>> + Send + Sync,
{
    type Input = I;
    type Output = O;

    fn process(&self, item: &I) -> anyhow::Result<ProcessOutcome<O>> {
        (self.f)(item)
    }
}
