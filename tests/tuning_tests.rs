use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pairtune::Outcome::{Draw as D, Loss as L, Win as W};
use pairtune::persistence::{EvalRecord, OptimalRecord, OutputLayout};
use pairtune::prelude::*;
use pairtune::stats;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

fn temp_dir() -> PathBuf {
    use std::sync::atomic::AtomicU64;
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let dir = std::env::temp_dir().join(format!(
        "pairtune_tuning_test_{}_{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn point(a: f64) -> ParameterPoint {
    ParameterPoint::new().with("a", a)
}

/// Asks a fixed cycle of points and recommends a scripted sequence, one
/// entry per tell.
#[derive(Serialize, Deserialize)]
struct ScriptedOptimizer {
    asks: Vec<ParameterPoint>,
    recommendations: Vec<ParameterPoint>,
    asked: usize,
    told: usize,
}

impl ScriptedOptimizer {
    fn new(asks: Vec<ParameterPoint>, recommendations: Vec<ParameterPoint>) -> Self {
        Self {
            asks,
            recommendations,
            asked: 0,
            told: 0,
        }
    }
}

impl Optimizer for ScriptedOptimizer {
    fn ask(&mut self) -> Candidate {
        let p = self.asks[self.asked % self.asks.len()].clone();
        let candidate = Candidate::new(self.asked as u64, p);
        self.asked += 1;
        candidate
    }

    fn tell(&mut self, _candidate: &Candidate, _loss: f64) {
        self.told += 1;
    }

    fn provide_recommendation(&self) -> ParameterPoint {
        let i = self.told.saturating_sub(1).min(self.recommendations.len() - 1);
        self.recommendations[i].clone()
    }

    fn dump(&self) -> pairtune::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn load(bytes: &[u8]) -> pairtune::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn fixed_games(games: Vec<Outcome>) -> impl TrialExecutor {
    move |_: &CanonicalPoint, _: usize| -> pairtune::Result<Vec<Outcome>> { Ok(games.clone()) }
}

fn read_eval_log(dir: &PathBuf) -> Vec<EvalRecord> {
    OutputLayout::new(dir).read_eval_log().unwrap()
}

#[tokio::test]
async fn test_end_to_end_statistics() {
    let dir = temp_dir();
    let config = TuneConfig::builder()
        .concurrency(2)
        .initial_batch_size(4)
        .total_evaluation_budget(2)
        .output_dir(&dir)
        .build()
        .unwrap();
    let optimizer = ScriptedOptimizer::new(vec![point(1.0), point(2.0)], vec![point(1.0)]);

    let report = IterationController::new(config, optimizer, fixed_games(vec![W, L, W, W]))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.evaluations, 2);
    assert_eq!(report.total_games, 8);

    let expected_llr = Sprt::default().analytics(&[0, 0, 1, 0, 1]).llr;
    let records = read_eval_log(&dir);
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.num_games, 4);
        assert_eq!(record.stats.pentanomial, [0, 0, 1, 0, 1]);
        assert!((record.stats.score - 0.75).abs() < 1e-12);
        assert!((record.stats.elo - 190.85).abs() < 0.01);
        assert!((record.stats.sprt.llr - expected_llr).abs() < 1e-9);
    }

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_rounded_points_share_history() {
    let dir = temp_dir();
    let config = TuneConfig::builder()
        .concurrency(1)
        .initial_batch_size(4)
        .total_evaluation_budget(2)
        .output_dir(&dir)
        .build()
        .unwrap();
    let optimizer = ScriptedOptimizer::new(vec![point(3.49), point(2.51)], vec![point(3.0)]);

    IterationController::new(config, optimizer, fixed_games(vec![W, D, L, W]))
        .unwrap()
        .run()
        .await
        .unwrap();

    let records = read_eval_log(&dir);
    assert_eq!(records[0].params, point(3.49));
    assert_eq!(records[1].params, point(2.51));
    // Each record counts its own batch; the statistics cover both.
    assert_eq!(records[0].num_games, 4);
    assert_eq!(records[1].num_games, 4);
    assert_eq!(records[1].stats.games, 8);
    assert_eq!(records[1].stats.pentanomial, [0, 0, 2, 2, 0]);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_recommendation_changes_drive_batch_growth() {
    let dir = temp_dir();
    let config = TuneConfig::builder()
        .concurrency(1)
        .initial_batch_size(4)
        .batch_growth_per_iteration(64)
        .total_evaluation_budget(4)
        .output_dir(&dir)
        .build()
        .unwrap();
    let optimizer = ScriptedOptimizer::new(
        vec![point(0.0)],
        vec![point(1.0), point(1.0), point(2.0), point(2.0)],
    );

    let requested = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requested);
    let executor = move |_: &CanonicalPoint, games: usize| -> pairtune::Result<Vec<Outcome>> {
        log.lock().push(games);
        Ok(vec![W, L])
    };

    let report = IterationController::new(config, optimizer, executor)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.iterations, 2);
    assert_eq!(report.games_per_batch, 68);
    assert_eq!(report.recommendation, Some(point(2.0).canonical()));
    assert_eq!(*requested.lock(), vec![4, 4, 4, 68]);

    let layout = OutputLayout::new(&dir);
    assert_eq!(
        layout.read_optimals().unwrap(),
        vec![
            OptimalRecord {
                evals_done: 1,
                recommendation: point(1.0).canonical(),
            },
            OptimalRecord {
                evals_done: 3,
                recommendation: point(2.0).canonical(),
            },
        ]
    );
    assert_eq!(
        layout.read_latest().unwrap().map(|r| r.recommendation),
        Some(point(2.0).canonical())
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_checkpoint_is_rotated() {
    let dir = temp_dir();
    let config = TuneConfig::builder()
        .concurrency(2)
        .initial_batch_size(2)
        .total_evaluation_budget(5)
        .output_dir(&dir)
        .build()
        .unwrap();
    let space = vec![ParameterSpec::new("a", 10.0, 0.0, 20.0).unwrap()];
    let optimizer = SelfAdaptiveEs::builder().seed(11).build(&space);

    IterationController::new(config, optimizer, fixed_games(vec![W, D]))
        .unwrap()
        .run()
        .await
        .unwrap();

    let layout = OutputLayout::new(&dir);
    assert!(layout.checkpoint().exists());
    assert!(layout.checkpoint_backup().exists());
    assert!(layout.iteration_state().exists());
    assert!(SelfAdaptiveEs::load(&layout.load_checkpoint().unwrap()).is_ok());
    assert_eq!(read_eval_log(&dir).len(), 5);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_restart_continues_the_same_search() {
    let space = vec![
        ParameterSpec::new("a", 10.0, 0.0, 20.0).unwrap(),
        ParameterSpec::new("b", -5.0, -50.0, 50.0).unwrap(),
    ];
    let executor = || {
        |p: &CanonicalPoint, _: usize| -> pairtune::Result<Vec<Outcome>> {
            if p.get("a").unwrap_or(0) > 10 {
                Ok(vec![W, W, D, L])
            } else {
                Ok(vec![L, D, D, W])
            }
        }
    };
    let config = |dir: &PathBuf, budget: usize, restart: bool| {
        TuneConfig::builder()
            .concurrency(1)
            .initial_batch_size(4)
            .total_evaluation_budget(budget)
            .restart_from_checkpoint(restart)
            .output_dir(dir)
            .build()
            .unwrap()
    };

    // Uninterrupted reference run.
    let reference_dir = temp_dir();
    let optimizer = SelfAdaptiveEs::builder().population_size(2).seed(3).build(&space);
    IterationController::new(config(&reference_dir, 6, false), optimizer, executor())
        .unwrap()
        .run()
        .await
        .unwrap();

    // The same run stopped after 3 evaluations, then resumed.
    let dir = temp_dir();
    let optimizer = SelfAdaptiveEs::builder().population_size(2).seed(3).build(&space);
    IterationController::new(config(&dir, 3, false), optimizer, executor())
        .unwrap()
        .run()
        .await
        .unwrap();

    let ignored = SelfAdaptiveEs::builder().seed(999).build(&space);
    let mut resumed = IterationController::new(config(&dir, 6, true), ignored, executor()).unwrap();
    assert_eq!(resumed.state().completed, 3);
    assert_eq!(resumed.state().submitted, 3);
    let report = resumed.run().await.unwrap();
    assert_eq!(report.evaluations, 6);
    assert_eq!(report.total_games, 24);

    let expected: Vec<_> = read_eval_log(&reference_dir)
        .into_iter()
        .map(|r| (r.params, r.num_games))
        .collect();
    let actual: Vec<_> = read_eval_log(&dir)
        .into_iter()
        .map(|r| (r.params, r.num_games))
        .collect();
    assert_eq!(actual, expected);

    std::fs::remove_dir_all(&reference_dir).ok();
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_restart_without_state_fails() {
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let config = TuneConfig::builder()
        .restart_from_checkpoint(true)
        .output_dir(&dir)
        .build()
        .unwrap();
    let optimizer = ScriptedOptimizer::new(vec![point(0.0)], vec![point(0.0)]);

    let result = IterationController::new(config, optimizer, fixed_games(vec![W, L]));
    assert!(matches!(result, Err(Error::MissingRestartState(_))));

    // A checkpoint alone is not enough.
    OutputLayout::new(&dir).save_checkpoint(b"{}").unwrap();
    let config = TuneConfig::builder()
        .restart_from_checkpoint(true)
        .output_dir(&dir)
        .build()
        .unwrap();
    let optimizer = ScriptedOptimizer::new(vec![point(0.0)], vec![point(0.0)]);
    let result = IterationController::new(config, optimizer, fixed_games(vec![W, L]));
    assert!(result.is_err());

    std::fs::remove_dir_all(&dir).ok();
}

fn flaky_executor(failures: usize) -> (impl TrialExecutor, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let executor = move |_: &CanonicalPoint, _: usize| -> pairtune::Result<Vec<Outcome>> {
        if counter.fetch_add(1, Ordering::SeqCst) < failures {
            Err(Error::ExecutorFailure("engine crashed".into()))
        } else {
            Ok(vec![W, L])
        }
    };
    (executor, calls)
}

#[tokio::test]
async fn test_failed_batch_is_retried() {
    let dir = temp_dir();
    let config = TuneConfig::builder()
        .concurrency(1)
        .initial_batch_size(2)
        .total_evaluation_budget(3)
        .max_retries(1)
        .output_dir(&dir)
        .build()
        .unwrap();
    let optimizer = ScriptedOptimizer::new(vec![point(0.0)], vec![point(0.0)]);
    let (executor, calls) = flaky_executor(1);

    let report = IterationController::new(config, optimizer, executor)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.evaluations, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // A failed batch never counts as an empty one.
    assert_eq!(report.total_games, 6);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_failure_without_retries_aborts() {
    let dir = temp_dir();
    let config = TuneConfig::builder()
        .concurrency(1)
        .initial_batch_size(2)
        .total_evaluation_budget(3)
        .output_dir(&dir)
        .build()
        .unwrap();
    let optimizer = ScriptedOptimizer::new(vec![point(0.0)], vec![point(0.0)]);
    let (executor, _) = flaky_executor(1);

    let result = IterationController::new(config, optimizer, executor)
        .unwrap()
        .run()
        .await;
    assert!(matches!(result, Err(Error::ExecutorFailure(_))));
    assert!(read_eval_log(&dir).is_empty());

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_batch_without_pairs_is_a_failure() {
    let dir = temp_dir();
    let config = TuneConfig::builder()
        .concurrency(1)
        .initial_batch_size(2)
        .total_evaluation_budget(1)
        .output_dir(&dir)
        .build()
        .unwrap();
    let optimizer = ScriptedOptimizer::new(vec![point(0.0)], vec![point(0.0)]);

    let result = IterationController::new(config, optimizer, fixed_games(Vec::new()))
        .unwrap()
        .run()
        .await;
    assert!(matches!(result, Err(Error::DegenerateHistory(_))));

    std::fs::remove_dir_all(&dir).ok();
}

/// Plays the scripted batches in order, one per call.
fn scripted_batches(batches: Vec<Vec<Outcome>>) -> impl TrialExecutor {
    let calls = AtomicUsize::new(0);
    move |_: &CanonicalPoint, _: usize| -> pairtune::Result<Vec<Outcome>> {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        Ok(batches[call.min(batches.len() - 1)].clone())
    }
}

#[tokio::test]
async fn test_rejected_batch_leaves_no_games_behind() {
    let dir = temp_dir();
    let config = TuneConfig::builder()
        .concurrency(1)
        .initial_batch_size(2)
        .total_evaluation_budget(1)
        .max_retries(1)
        .output_dir(&dir)
        .build()
        .unwrap();
    let optimizer = ScriptedOptimizer::new(vec![point(0.0)], vec![point(0.0)]);
    let executor = scripted_batches(vec![vec![W], vec![W, L]]);

    let mut controller = IterationController::new(config, optimizer, executor).unwrap();
    let report = controller.run().await.unwrap();

    assert_eq!(report.evaluations, 1);
    assert_eq!(report.total_games, 2);
    assert_eq!(controller.accumulator().get(&point(0.0).canonical()), vec![W, L]);

    let records = read_eval_log(&dir);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stats.pentanomial, [0, 0, 1, 0, 0]);
    assert_eq!(records[0].stats.games, 2);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_odd_batch_keeps_later_pairs_aligned() {
    let dir = temp_dir();
    let config = TuneConfig::builder()
        .concurrency(1)
        .initial_batch_size(3)
        .total_evaluation_budget(2)
        .output_dir(&dir)
        .build()
        .unwrap();
    let optimizer = ScriptedOptimizer::new(vec![point(0.0)], vec![point(0.0)]);
    let executor = scripted_batches(vec![vec![W, W, L], vec![L, D]]);

    let report = IterationController::new(config, optimizer, executor)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(report.total_games, 5);

    let records = read_eval_log(&dir);
    assert_eq!(records[0].num_games, 3);
    assert_eq!(records[0].stats.pentanomial, [0, 0, 0, 0, 1]);
    // The dangling loss of the first batch must not pair with the second.
    assert_eq!(records[1].stats.pentanomial, [0, 1, 0, 0, 1]);
    assert_eq!(records[1].stats.games, 4);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_budget_smaller_than_pool() {
    let dir = temp_dir();
    let config = TuneConfig::builder()
        .concurrency(3)
        .initial_batch_size(2)
        .total_evaluation_budget(2)
        .output_dir(&dir)
        .build()
        .unwrap();
    let optimizer = ScriptedOptimizer::new(vec![point(0.0), point(5.0)], vec![point(0.0)]);
    let (executor, calls) = flaky_executor(0);

    let report = IterationController::new(config, optimizer, executor)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(report.evaluations, 2);
    assert_eq!(report.iterations, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_summary_matches_stats_module() {
    let games = [W, L, W, W];
    let summary = Summary::from_outcomes(&games, &Sprt::default()).unwrap();
    assert_eq!(summary.pentanomial, stats::pentanomial(&games));
    assert!((summary.loss() + summary.sprt.llr).abs() < f64::EPSILON);
}
