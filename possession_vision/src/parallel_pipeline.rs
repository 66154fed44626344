// THEORY:
// Once the team model is fitted, every frame of the third pass is independent: the
// possession decision reads only the frame, its artifacts and the immutable model.
// The only shared mutable state is the tally, and addition commutes. So stage 3
// fans out over a pool of tokio workers:
//
// - the `TeamModel` is shared read-only behind an `Arc`, and can only be handed in
//   already fitted, so no worker can ever observe a half-fitted model;
// - the tally is an `AtomicTally` (one counter per team) that workers bump directly;
// - per-frame results come back over oneshot channels and are returned in frame
//   order regardless of which worker finished first.
//
// The parallel pass does not render. Its final tally equals the sequential one.

use crate::config::PipelineConfig;
use crate::core_modules::artifact_store::ArtifactStore;
use crate::core_modules::detection::Team;
use crate::core_modules::frame_source::FrameSource;
use crate::core_modules::possession::{PossessionDecision, PossessionEngine, PossessionTally};
use crate::core_modules::team_classifier::TeamModel;
use crate::error::{PossessionError, Result};
use crate::pipeline::{SkipReason, classify_detections, read_or_skip};
use crate::report::RunReport;
use futures::future::join_all;
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Lock-free possession counters shared by the workers.
#[derive(Debug, Default)]
pub struct AtomicTally {
    team1: AtomicU64,
    team2: AtomicU64,
}

impl AtomicTally {
    pub fn record(&self, team: Team) {
        let counter = match team {
            Team::Team1 => &self.team1,
            Team::Team2 => &self.team2,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PossessionTally {
        PossessionTally {
            team1: self.team1.load(Ordering::Relaxed),
            team2: self.team2.load(Ordering::Relaxed),
        }
    }
}

/// What a worker concluded about one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameDecision {
    Skipped(SkipReason),
    Decided(PossessionDecision),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParallelRun {
    /// One entry per frame, in frame order.
    pub decisions: Vec<FrameDecision>,
    pub report: RunReport,
}

struct WorkerContext<S: ?Sized> {
    frames: Arc<S>,
    store: ArtifactStore,
    model: Arc<TeamModel>,
    engine: PossessionEngine,
    tally: AtomicTally,
}

impl<S: FrameSource + ?Sized> WorkerContext<S> {
    fn process_frame(&self, position: usize) -> Result<FrameDecision> {
        let frame = self.frames.frame(position)?;
        let detections = match read_or_skip(&self.store, self.frames.frame_number(position))? {
            Ok(detections) => detections,
            Err(reason) => return Ok(FrameDecision::Skipped(reason)),
        };

        let objects = classify_detections(&self.model, &frame, detections);
        let decision = self.engine.decide(
            objects.ball.as_ref(),
            &objects.team1,
            &objects.team2,
            frame.width(),
            frame.height(),
        );
        if let Some(team) = decision.team() {
            self.tally.record(team);
        }
        Ok(FrameDecision::Decided(decision))
    }
}

struct FrameTask {
    /// Position in the frame source.
    frame_index: usize,
    result_sender: oneshot::Sender<Result<FrameDecision>>,
}

struct WorkerPool {
    task_sender: mpsc::UnboundedSender<FrameTask>,
    dispatcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn new<S>(context: Arc<WorkerContext<S>>, worker_count: usize) -> Self
    where
        S: FrameSource + Send + Sync + ?Sized + 'static,
    {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<FrameTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<FrameTask>())
            .unzip();

        // Round-robin dispatcher
        let dispatcher = tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let workers = worker_receivers
            .into_iter()
            .enumerate()
            .map(|(worker_id, mut worker_receiver)| {
                let context = Arc::clone(&context);
                tokio::spawn(async move {
                    while let Some(task) = worker_receiver.recv().await {
                        let result = context.process_frame(task.frame_index);
                        debug!("Worker {worker_id} finished frame {}", task.frame_index);
                        let _ = task.result_sender.send(result);
                    }
                })
            })
            .collect();

        Self {
            task_sender,
            dispatcher,
            workers,
        }
    }

    async fn process_frame(&self, frame_index: usize) -> Result<FrameDecision> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.task_sender
            .send(FrameTask {
                frame_index,
                result_sender,
            })
            .map_err(|_| PossessionError::Worker("failed to send task to worker pool".to_string()))?;

        result_receiver
            .await
            .map_err(|_| PossessionError::Worker(format!("worker dropped frame {frame_index}")))?
    }

    /// Closes the task queue and waits for every worker to drain.
    async fn shutdown(self) -> Result<()> {
        drop(self.task_sender);
        self.dispatcher
            .await
            .map_err(|e| PossessionError::Worker(format!("dispatcher failed: {e}")))?;
        for worker in self.workers {
            worker
                .await
                .map_err(|e| PossessionError::Worker(format!("worker failed: {e}")))?;
        }
        Ok(())
    }
}

/// Stage 3 of the possession analysis, spread across a worker pool.
pub struct ParallelPossessionPipeline {
    config: PipelineConfig,
    store: ArtifactStore,
    model: Arc<TeamModel>,
    workers: usize,
}

impl ParallelPossessionPipeline {
    pub fn new(config: PipelineConfig, store: ArtifactStore, model: TeamModel) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            model: Arc::new(model),
            workers: num_cpus::get(),
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn model(&self) -> &TeamModel {
        &self.model
    }

    pub async fn run<S>(&self, frames: Arc<S>) -> Result<ParallelRun>
    where
        S: FrameSource + Send + Sync + ?Sized + 'static,
    {
        let frame_count = frames.len();
        let context = Arc::new(WorkerContext {
            frames,
            store: self.store.clone(),
            model: Arc::clone(&self.model),
            engine: PossessionEngine::new(self.config.possession.threshold_px),
            tally: AtomicTally::default(),
        });
        info!("Analysing {frame_count} frames on {} workers", self.workers);

        let pool = WorkerPool::new(Arc::clone(&context), self.workers);
        // join_all yields in submission order, which is frame order.
        let results = join_all((0..frame_count).map(|frame_index| pool.process_frame(frame_index))).await;
        pool.shutdown().await?;

        let mut report = RunReport {
            frames_total: frame_count,
            ..Default::default()
        };
        let mut decisions = Vec::with_capacity(frame_count);
        for result in results {
            let decision = result?;
            match decision {
                FrameDecision::Skipped(reason) => reason.count_in(&mut report),
                FrameDecision::Decided(possession) => {
                    report.frames_processed += 1;
                    if !matches!(possession, PossessionDecision::NoBall) {
                        report.frames_with_ball += 1;
                    }
                }
            }
            decisions.push(decision);
        }

        report.set_tally(context.tally.snapshot());
        info!(
            "Processed {}/{} frames ({} skipped): {}",
            report.frames_processed,
            report.frames_total,
            report.frames_skipped(),
            report.percentages
        );
        Ok(ParallelRun { decisions, report })
    }
}
