use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::{Id, JoinSet};

use crate::error::{Error, Result};
use crate::executor::TrialExecutor;
use crate::optimizer::Candidate;
use crate::outcome::Outcome;

/// A batch that finished, successfully or not.
#[derive(Debug)]
pub struct CompletedJob {
    /// The slot the batch occupied. Already free again.
    pub slot: usize,
    pub candidate: Candidate,
    /// Games requested from the executor.
    pub games: usize,
    /// The outcomes, [`Error::ExecutorFailure`] if the batch failed, or
    /// [`Error::TaskError`] if its task was cancelled.
    pub result: Result<Vec<Outcome>>,
}

#[derive(Debug)]
struct InFlight {
    candidate: Candidate,
    games: usize,
}

/// A fixed pool of `concurrency` slots, each running at most one batch on
/// a blocking worker thread.
///
/// The dispatcher does no scheduling of its own: the caller submits into
/// free slots and waits on [`await_any`](Self::await_any), which hands back
/// whichever batch finishes first and frees its slot in the same step.
///
/// Must be used from within a tokio runtime.
///
/// # Examples
///
/// ```
/// use pairtune::{BatchDispatcher, Candidate, CanonicalPoint, Outcome, ParameterPoint};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> pairtune::Result<()> {
/// let executor = |_: &CanonicalPoint, games: usize| -> pairtune::Result<Vec<Outcome>> {
///     Ok(vec![Outcome::Draw; games])
/// };
/// let mut dispatcher = BatchDispatcher::new(executor, 2);
///
/// let candidate = Candidate::new(0, ParameterPoint::new().with("x", 1.0));
/// let slot = dispatcher.submit(candidate, 4)?;
///
/// let done = dispatcher.await_any().await.unwrap();
/// assert_eq!(done.slot, slot);
/// assert_eq!(done.result?.len(), 4);
/// assert!(dispatcher.await_any().await.is_none());
/// # Ok(())
/// # }
/// ```
pub struct BatchDispatcher<E> {
    executor: Arc<E>,
    slots: Vec<Option<InFlight>>,
    tasks: JoinSet<(usize, Result<Vec<Outcome>>)>,
    task_slots: HashMap<Id, usize>,
}

impl<E: TrialExecutor> BatchDispatcher<E> {
    /// Creates a pool with `concurrency` slots.
    ///
    /// # Panics
    ///
    /// Panics if `concurrency` is 0.
    #[must_use]
    pub fn new(executor: E, concurrency: usize) -> Self {
        assert!(concurrency > 0, "concurrency must be at least 1");
        Self {
            executor: Arc::new(executor),
            slots: (0..concurrency).map(|_| None).collect(),
            tasks: JoinSet::new(),
            task_slots: HashMap::new(),
        }
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.slots.len()
    }

    /// Number of batches currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    #[must_use]
    pub fn has_free_slot(&self) -> bool {
        self.slots.iter().any(Option::is_none)
    }

    /// Starts a batch of `games` games for `candidate` in the lowest free
    /// slot and returns that slot.
    ///
    /// The executor sees the candidate's canonical point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFreeSlot`] if every slot is occupied.
    pub fn submit(&mut self, candidate: Candidate, games: usize) -> Result<usize> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::NoFreeSlot {
                concurrency: self.slots.len(),
            })?;

        let params = candidate.point.canonical();
        trace_debug!(slot, games, candidate = candidate.id, %params, "batch submitted");

        let executor = Arc::clone(&self.executor);
        let handle = self.tasks.spawn(async move {
            let result = tokio::task::spawn_blocking(move || executor.run(&params, games))
                .await
                .map_err(|e| Error::ExecutorFailure(format!("executor task failed: {e}")))
                .and_then(|r| r);
            (slot, result)
        });
        self.task_slots.insert(handle.id(), slot);
        self.slots[slot] = Some(InFlight { candidate, games });
        Ok(slot)
    }

    /// Waits for the next batch to finish and frees its slot.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn await_any(&mut self) -> Option<CompletedJob> {
        while let Some(joined) = self.tasks.join_next().await {
            let (slot, result) = match joined {
                Ok((slot, result)) => {
                    self.task_slots.retain(|_, s| *s != slot);
                    (slot, result)
                }
                Err(e) => {
                    let Some(slot) = self.task_slots.remove(&e.id()) else {
                        continue;
                    };
                    trace_warn!(slot, error = %e, "batch task did not finish");
                    (slot, Err(Error::TaskError(e.to_string())))
                }
            };
            let Some(InFlight { candidate, games }) = self.slots[slot].take() else {
                continue;
            };
            trace_debug!(slot, games, ok = result.is_ok(), "batch completed");
            return Some(CompletedJob {
                slot,
                candidate,
                games,
                result,
            });
        }
        None
    }
}

impl<E> core::fmt::Debug for BatchDispatcher<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BatchDispatcher")
            .field("slots", &self.slots)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
