use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::accumulator::ResultAccumulator;
use crate::config::TuneConfig;
use crate::dispatcher::{BatchDispatcher, CompletedJob};
use crate::error::{Error, Result};
use crate::executor::TrialExecutor;
use crate::optimizer::{Candidate, Optimizer};
use crate::outcome::Outcome;
use crate::persistence::{EvalRecord, OptimalRecord, OutputLayout};
use crate::point::CanonicalPoint;
use crate::stats::Summary;

/// Lifecycle of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Not started, or submitting the initial batches.
    #[default]
    Filling,
    /// Every completion is followed by a new submission.
    Steady,
    /// The budget is spent; waiting for in-flight batches.
    Draining,
    Done,
}

/// Controller counters and game histories, persisted after every
/// evaluation so a run can be resumed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationState {
    /// Number of recommendation changes so far.
    pub iteration: u64,
    /// Evaluations handed to the dispatcher (retries not counted).
    pub submitted: usize,
    /// Evaluations whose statistics were computed and told.
    pub completed: usize,
    /// Games played across all batches.
    pub total_games: u64,
    /// Games requested per new batch.
    pub games_per_batch: usize,
    /// The last recorded recommendation.
    pub recommendation: Option<CanonicalPoint>,
    #[serde(default)]
    histories: Vec<HistoryEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct HistoryEntry {
    point: CanonicalPoint,
    outcomes: Vec<Outcome>,
}

/// Summary of a finished run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuneReport {
    /// Recommendation changes observed.
    pub iterations: u64,
    /// Evaluations completed.
    pub evaluations: usize,
    pub total_games: u64,
    /// Batch size at the end of the run.
    pub games_per_batch: usize,
    /// The last recorded recommendation.
    pub recommendation: Option<CanonicalPoint>,
}

/// Drives the ask / play / tell loop.
///
/// The controller fills every dispatcher slot, then reacts to each
/// completed batch in completion order:
///
/// 1. computes the [`Summary`] of the candidate's canonical point with the
///    batch appended, then merges the batch into that history,
/// 2. tells the optimizer `-LLR`,
/// 3. rewrites the evaluation log,
/// 4. journals the recommendation if it changed, growing the batch size on
///    every change after the first,
/// 5. saves the controller state, then checkpoints the optimizer (previous
///    files kept as `.bak`),
/// 6. submits a fresh candidate while the evaluation budget lasts.
///
/// A failed batch is resubmitted up to
/// [`max_retries`](TuneConfig::max_retries) times, then aborts the run.
///
/// # Examples
///
/// ```no_run
/// use pairtune::prelude::*;
///
/// # async fn run(space: Vec<ParameterSpec>) -> pairtune::Result<()> {
/// let config = TuneConfig::builder()
///     .output_dir("run")
///     .restart_from_checkpoint(true)
///     .build()?;
/// let executor = CutechessExecutor::builder("./engine").build()?;
/// // On restart the optimizer passed here is replaced by the checkpoint.
/// let optimizer = SelfAdaptiveEs::builder().build(&space);
/// let report = IterationController::new(config, optimizer, executor)?.run().await?;
/// println!("{} games played", report.total_games);
/// # Ok(())
/// # }
/// ```
pub struct IterationController<O, E> {
    config: TuneConfig,
    optimizer: O,
    dispatcher: BatchDispatcher<E>,
    accumulator: ResultAccumulator,
    layout: OutputLayout,
    state: IterationState,
    evaluations: Vec<EvalRecord>,
    retries: HashMap<u64, usize>,
    phase: Phase,
}

impl<O: Optimizer, E: TrialExecutor> IterationController<O, E> {
    /// Prepares a run.
    ///
    /// With [`restart_from_checkpoint`](TuneConfig::restart_from_checkpoint)
    /// set, the optimizer is restored from the output directory's
    /// checkpoint (the `optimizer` argument is dropped) together with the
    /// controller counters, game histories and evaluation log. Batches that
    /// were in flight when the previous run stopped are not replayed; their
    /// slots are refilled with fresh candidates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] / [`Error::InvalidSprt`] for a bad
    /// config, [`Error::MissingRestartState`] when restarting without saved
    /// state, and [`Error::Checkpoint`] if the output directory is unusable.
    pub fn new(config: TuneConfig, optimizer: O, executor: E) -> Result<Self> {
        config.validate()?;
        let layout = OutputLayout::new(&config.output_dir);

        let (optimizer, mut state, evaluations) = if config.restart_from_checkpoint {
            let optimizer = O::load(&layout.load_checkpoint()?)?;
            let mut state: IterationState = layout.load_state()?;
            state.submitted = state.completed;
            let evaluations = layout.read_eval_log()?;
            trace_info!(
                completed = state.completed,
                iteration = state.iteration,
                "resuming from checkpoint"
            );
            (optimizer, state, evaluations)
        } else {
            layout.ensure_dir()?;
            let state = IterationState {
                games_per_batch: config.initial_batch_size,
                ..IterationState::default()
            };
            (optimizer, state, Vec::new())
        };

        let accumulator = ResultAccumulator::with_histories(
            core::mem::take(&mut state.histories)
                .into_iter()
                .map(|h| (h.point, h.outcomes))
                .collect(),
        );

        Ok(Self {
            dispatcher: BatchDispatcher::new(executor, config.concurrency),
            config,
            optimizer,
            accumulator,
            layout,
            state,
            evaluations,
            retries: HashMap::new(),
            phase: Phase::Filling,
        })
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn state(&self) -> &IterationState {
        &self.state
    }

    #[must_use]
    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    #[must_use]
    pub fn accumulator(&self) -> &ResultAccumulator {
        &self.accumulator
    }

    #[must_use]
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Runs until the evaluation budget is spent and every batch has
    /// finished. [`phase`](Self::phase) reads [`Phase::Done`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns the batch error once a failing batch has exhausted its
    /// retries, and [`Error::Checkpoint`] / [`Error::Serialization`] if
    /// state cannot be persisted. Either aborts the run.
    pub async fn run(&mut self) -> Result<TuneReport> {
        #[cfg(feature = "tracing")]
        let span = tracing::info_span!(
            "tune",
            concurrency = self.config.concurrency,
            budget = self.config.total_evaluation_budget,
            output_dir = %self.layout.dir().display()
        );
        let run = self.drive();
        #[cfg(feature = "tracing")]
        let run = tracing::Instrument::instrument(run, span);
        run.await
    }

    async fn drive(&mut self) -> Result<TuneReport> {
        self.fill()?;
        while let Some(job) = self.dispatcher.await_any().await {
            self.on_completed(job)?;
        }

        self.phase = Phase::Done;
        trace_info!(
            evaluations = self.state.completed,
            iterations = self.state.iteration,
            total_games = self.state.total_games,
            "tuning finished"
        );
        Ok(self.report())
    }

    /// Submits the initial batches, one per free slot while the budget
    /// lasts.
    fn fill(&mut self) -> Result<()> {
        self.phase = Phase::Filling;
        while self.budget_left() && self.dispatcher.has_free_slot() {
            self.submit_next()?;
        }
        self.phase = if self.budget_left() {
            Phase::Steady
        } else {
            Phase::Draining
        };
        Ok(())
    }

    fn budget_left(&self) -> bool {
        self.state.submitted < self.config.total_evaluation_budget
    }

    fn report(&self) -> TuneReport {
        TuneReport {
            iterations: self.state.iteration,
            evaluations: self.state.completed,
            total_games: self.state.total_games,
            games_per_batch: self.state.games_per_batch,
            recommendation: self.state.recommendation.clone(),
        }
    }

    fn submit_next(&mut self) -> Result<()> {
        let candidate = self.optimizer.ask();
        self.dispatcher
            .submit(candidate, self.state.games_per_batch)?;
        self.state.submitted += 1;
        if !self.budget_left() {
            self.phase = Phase::Draining;
            trace_info!(in_flight = self.dispatcher.in_flight(), "budget spent, draining");
        }
        Ok(())
    }

    fn on_completed(&mut self, job: CompletedJob) -> Result<()> {
        let CompletedJob {
            slot,
            candidate,
            games,
            result,
        } = job;

        let evaluated = result.and_then(|outcomes| self.evaluate(&candidate, &outcomes));
        match evaluated {
            Ok(()) => {
                self.retries.remove(&candidate.id);
            }
            Err(
                err @ (Error::ExecutorFailure(_)
                | Error::DegenerateHistory(_)
                | Error::TaskError(_)),
            ) => {
                return self.retry_or_abort(slot, candidate, games, err);
            }
            Err(err) => return Err(err),
        }

        if self.budget_left() {
            self.submit_next()?;
        }
        Ok(())
    }

    fn retry_or_abort(
        &mut self,
        slot: usize,
        candidate: Candidate,
        games: usize,
        err: Error,
    ) -> Result<()> {
        let attempts = self.retries.entry(candidate.id).or_insert(0);
        if *attempts >= self.config.max_retries {
            trace_warn!(slot, candidate = candidate.id, error = %err, "batch failed, aborting");
            return Err(err);
        }
        *attempts += 1;
        trace_warn!(
            slot,
            candidate = candidate.id,
            attempt = *attempts,
            error = %err,
            "batch failed, resubmitting"
        );
        self.dispatcher.submit(candidate, games)?;
        Ok(())
    }

    /// Folds one batch into the statistics, the optimizer and the files.
    ///
    /// Nothing is merged or counted unless the statistics of the merged
    /// history can be computed, so a rejected batch leaves no trace.
    fn evaluate(&mut self, candidate: &Candidate, outcomes: &[Outcome]) -> Result<()> {
        // Pairs never span batches: a trailing unpaired game is dropped.
        let paired = &outcomes[..outcomes.len() - outcomes.len() % 2];
        if paired.len() < outcomes.len() {
            trace_warn!(
                candidate = candidate.id,
                games = outcomes.len(),
                "odd batch, dropping the unpaired last game"
            );
        }
        if paired.is_empty() {
            return Err(Error::DegenerateHistory("batch holds no complete game pair"));
        }

        let key = candidate.point.canonical();
        let mut history = self.accumulator.get(&key);
        history.extend_from_slice(paired);
        let summary = Summary::from_outcomes(&history, &self.config.sprt)?;

        self.accumulator.merge(&key, paired);
        self.state.total_games += outcomes.len() as u64;
        self.state.completed += 1;
        let loss = summary.loss();
        trace_info!(
            evaluation = self.state.completed,
            params = %key,
            games = history.len(),
            score = summary.score,
            elo = summary.elo,
            llr = summary.sprt.llr,
            los = summary.sprt.los,
            loss,
            "evaluation complete"
        );

        self.optimizer.tell(candidate, loss);
        self.evaluations.push(EvalRecord {
            params: candidate.point.clone(),
            num_games: outcomes.len(),
            stats: summary,
        });
        self.layout.write_eval_log(&self.evaluations)?;

        self.track_recommendation()?;
        self.commit()
    }

    fn track_recommendation(&mut self) -> Result<()> {
        let recommendation = self.optimizer.provide_recommendation().canonical();
        if self.state.recommendation.as_ref() == Some(&recommendation) {
            return Ok(());
        }

        self.state.iteration += 1;
        trace_info!(
            iteration = self.state.iteration,
            recommendation = %recommendation,
            "recommendation changed"
        );
        self.layout.record_optimal(&OptimalRecord {
            evals_done: self.state.completed,
            recommendation: recommendation.clone(),
        })?;

        let growth = self.config.batch_growth_per_iteration;
        if self.state.iteration > 1 && growth > 0 {
            self.state.games_per_batch += growth;
            trace_info!(games_per_batch = self.state.games_per_batch, "batch size grown");
        }
        self.state.recommendation = Some(recommendation);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut histories: Vec<HistoryEntry> = self
            .accumulator
            .snapshot()
            .into_iter()
            .map(|(point, outcomes)| HistoryEntry { point, outcomes })
            .collect();
        histories.sort_by(|a, b| a.point.cmp(&b.point));
        self.state.histories = histories;

        let committed = self
            .optimizer
            .dump()
            .and_then(|checkpoint| self.layout.commit(&self.state, &checkpoint));
        self.state.histories.clear();
        committed
    }
}

impl<O, E> core::fmt::Debug for IterationController<O, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IterationController")
            .field("phase", &self.phase)
            .field("state", &self.state)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::SelfAdaptiveEs;
    use crate::outcome::Outcome::{Loss as L, Win as W};
    use crate::point::ParameterPoint;
    use crate::space::ParameterSpec;

    fn temp_dir() -> std::path::PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        std::env::temp_dir().join(format!(
            "pairtune_controller_test_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ))
    }

    #[test]
    fn test_state_serializes_histories_as_entries() {
        let state = IterationState {
            iteration: 2,
            submitted: 5,
            completed: 4,
            total_games: 16,
            games_per_batch: 68,
            recommendation: Some(ParameterPoint::new().with("a", 2.0).canonical()),
            histories: vec![HistoryEntry {
                point: ParameterPoint::new().with("a", 1.0).canonical(),
                outcomes: vec![W, L],
            }],
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""histories":[{"point":{"a":1},"outcomes":["w","l"]}]"#));
        let back: IterationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_default_phase_is_filling() {
        assert_eq!(Phase::default(), Phase::Filling);
    }

    #[tokio::test]
    async fn test_phase_follows_the_budget() {
        let dir = temp_dir();
        let config = TuneConfig::builder()
            .concurrency(2)
            .initial_batch_size(2)
            .total_evaluation_budget(3)
            .output_dir(&dir)
            .build()
            .unwrap();
        let space = vec![ParameterSpec::new("a", 5.0, 0.0, 10.0).unwrap()];
        let optimizer = SelfAdaptiveEs::builder().seed(1).build(&space);
        let executor =
            |_: &CanonicalPoint, _: usize| -> Result<Vec<Outcome>> { Ok(vec![W, L]) };

        let mut controller = IterationController::new(config, optimizer, executor).unwrap();
        assert_eq!(controller.phase(), Phase::Filling);

        controller.fill().unwrap();
        assert_eq!(controller.phase(), Phase::Steady);
        assert_eq!(controller.state().submitted, 2);

        // The completion refills its slot with the last budgeted batch.
        let job = controller.dispatcher.await_any().await.unwrap();
        controller.on_completed(job).unwrap();
        assert_eq!(controller.phase(), Phase::Draining);
        assert_eq!(controller.state().submitted, 3);

        let report = controller.run().await.unwrap();
        assert_eq!(controller.phase(), Phase::Done);
        assert_eq!(report.evaluations, 3);
        assert_eq!(controller.dispatcher.in_flight(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_cancelled_batch_is_retried() {
        let dir = temp_dir();
        let config = TuneConfig::builder()
            .concurrency(1)
            .initial_batch_size(2)
            .total_evaluation_budget(1)
            .max_retries(1)
            .output_dir(&dir)
            .build()
            .unwrap();
        let space = vec![ParameterSpec::new("a", 5.0, 0.0, 10.0).unwrap()];
        let optimizer = SelfAdaptiveEs::builder().seed(2).build(&space);
        let executor =
            |_: &CanonicalPoint, _: usize| -> Result<Vec<Outcome>> { Ok(vec![W, W]) };
        let mut controller = IterationController::new(config, optimizer, executor).unwrap();

        let candidate = Candidate::new(0, ParameterPoint::new().with("a", 5.0));
        let cancelled = CompletedJob {
            slot: 0,
            candidate,
            games: 2,
            result: Err(Error::TaskError("task 1 was cancelled".into())),
        };
        controller.state.submitted = 1;
        controller.on_completed(cancelled).unwrap();
        assert_eq!(controller.dispatcher.in_flight(), 1);
        assert_eq!(controller.state().completed, 0);

        let retried = controller.dispatcher.await_any().await.unwrap();
        controller.on_completed(retried).unwrap();
        assert_eq!(controller.state().completed, 1);
        assert_eq!(controller.state().total_games, 2);

        // A candidate cancelled again before succeeding exhausts its retries.
        let cancel = |id: u64| CompletedJob {
            slot: 0,
            candidate: Candidate::new(id, ParameterPoint::new().with("a", 6.0)),
            games: 2,
            result: Err(Error::TaskError(format!("task {id} was cancelled"))),
        };
        controller.on_completed(cancel(5)).unwrap();
        assert_eq!(controller.dispatcher.in_flight(), 1);
        assert!(matches!(
            controller.on_completed(cancel(5)),
            Err(Error::TaskError(_))
        ));

        std::fs::remove_dir_all(&dir).ok();
    }
}
