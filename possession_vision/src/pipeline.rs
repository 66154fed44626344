// THEORY:
// The `pipeline` module is the top-level API for the possession engine. It drives
// the two-pass analysis over a whole video in a fixed stage order:
//
// 1.  `collect_samples`: walk every frame's artifacts and fingerprint every player
//     crop as a CIELAB colour sample.
// 2.  `fit`: cluster all samples into two teams, once. After this the `TeamModel`
//     is never touched again.
// 3.  `process_frame`: walk the frames again, classify each player against the
//     fitted model, let the `PossessionEngine` decide and tally, and optionally
//     hand the frame to the renderer.
//
// Frame-level errors (a missing or malformed artifact) never abort a run. The frame
// is logged, counted in the `RunReport` and skipped in every stage.

use crate::config::PipelineConfig;
use crate::core_modules::artifact_store::ArtifactStore;
use crate::core_modules::detection::{ClassifiedFrame, FrameDetections};
use crate::core_modules::frame_source::FrameSource;
use crate::core_modules::possession::{PossessionDecision, PossessionEngine, PossessionTally};
use crate::core_modules::renderer::FrameRenderer;
use crate::core_modules::team_classifier::{ColorSample, TeamClassifier, TeamModel};
use crate::error::{PossessionError, Result};
use crate::report::RunReport;
use image::RgbImage;
use log::{debug, info, warn};

/// Why a frame was left out of the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingArtifact,
    InvalidDetection,
}

impl SkipReason {
    /// The skip reason for a frame-level error, `None` for anything fatal.
    pub fn of(error: &PossessionError) -> Option<Self> {
        match error {
            PossessionError::MissingArtifact(_) => Some(SkipReason::MissingArtifact),
            PossessionError::InvalidDetection { .. } => Some(SkipReason::InvalidDetection),
            _ => None,
        }
    }

    pub(crate) fn count_in(self, report: &mut RunReport) {
        match self {
            SkipReason::MissingArtifact => report.frames_skipped_missing += 1,
            SkipReason::InvalidDetection => report.frames_skipped_invalid += 1,
        }
    }
}

/// The full result of analysing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAnalysis {
    pub frame_index: usize,
    pub objects: ClassifiedFrame,
    pub decision: PossessionDecision,
    /// Running tally after this frame.
    pub tally: PossessionTally,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Skipped { frame_index: usize, reason: SkipReason },
    Analysed(FrameAnalysis),
}

impl FrameOutcome {
    pub fn frame_index(&self) -> usize {
        match self {
            FrameOutcome::Skipped { frame_index, .. } => *frame_index,
            FrameOutcome::Analysed(analysis) => analysis.frame_index,
        }
    }
}

/// Reads one frame's detections, turning frame-level failures into a skip.
pub(crate) fn read_or_skip(store: &ArtifactStore, frame_index: usize) -> Result<std::result::Result<FrameDetections, SkipReason>> {
    match store.read_frame(frame_index) {
        Ok(detections) => Ok(Ok(detections)),
        Err(error) => match SkipReason::of(&error) {
            Some(reason) => {
                warn!("Skipping frame {frame_index}: {error}");
                Ok(Err(reason))
            }
            None => Err(error),
        },
    }
}

/// Sorts a frame's players into teams with a fitted model. Players whose crop is
/// too small to sample are dropped from the frame.
pub fn classify_detections(model: &TeamModel, frame: &RgbImage, detections: FrameDetections) -> ClassifiedFrame {
    let mut classified = ClassifiedFrame {
        ball: detections.ball,
        goalkeepers: detections.goalkeepers,
        referees: detections.referees,
        ..Default::default()
    };
    for player in detections.players {
        match TeamClassifier::sample_detection(frame, &player) {
            Some(sample) => classified.push_player(model.predict(&sample), player),
            None => debug!(
                "Dropping player at ({:.3}, {:.3}): crop too small to sample",
                player.center_x, player.center_y
            ),
        }
    }
    classified
}

/// The sequential two-pass possession pipeline.
pub struct PossessionPipeline {
    config: PipelineConfig,
    store: ArtifactStore,
    classifier: TeamClassifier,
    engine: PossessionEngine,
    renderer: FrameRenderer,
}

impl PossessionPipeline {
    pub fn new(config: PipelineConfig, store: ArtifactStore) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            classifier: TeamClassifier::new(config.clustering.clone()),
            engine: PossessionEngine::new(config.possession.threshold_px),
            renderer: FrameRenderer::new(config.render.clone()),
            config,
            store,
        })
    }

    /// Reuses a previously fitted model; `run` then skips stages 1 and 2.
    pub fn with_team_model(mut self, model: TeamModel) -> Self {
        self.classifier = TeamClassifier::with_model(self.config.clustering.clone(), model);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn team_model(&self) -> Option<&TeamModel> {
        self.classifier.model()
    }

    pub fn tally(&self) -> PossessionTally {
        self.engine.tally()
    }

    /// Stage 1: one colour sample per sampleable player over every frame.
    pub fn collect_samples<S: FrameSource + ?Sized>(&self, frames: &S) -> Result<Vec<ColorSample>> {
        let mut samples = Vec::new();
        for position in 0..frames.len() {
            let Ok(detections) = read_or_skip(&self.store, frames.frame_number(position))? else {
                continue;
            };
            if detections.players.is_empty() {
                continue;
            }
            let frame = frames.frame(position)?;
            samples.extend(
                detections
                    .players
                    .iter()
                    .filter_map(|player| TeamClassifier::sample_detection(&frame, player)),
            );
        }
        info!("Collected {} player colour samples from {} frames", samples.len(), frames.len());
        Ok(samples)
    }

    /// Stage 2: fits the team model. Fails with `AlreadyFitted` once a model is in place.
    pub fn fit(&mut self, samples: &[ColorSample]) -> Result<&TeamModel> {
        self.classifier.fit(samples)
    }

    pub fn classify_frame(&self, frame: &RgbImage, detections: FrameDetections) -> Result<ClassifiedFrame> {
        let model = self.classifier.model().ok_or(PossessionError::NotFitted)?;
        Ok(classify_detections(model, frame, detections))
    }

    /// Stage 3 for a single frame: classify, decide and tally. `frame_index` is the
    /// frame number the artifacts are stored under.
    pub fn process_frame(&mut self, frame_index: usize, frame: &RgbImage) -> Result<FrameOutcome> {
        if !self.classifier.is_fitted() {
            return Err(PossessionError::NotFitted);
        }
        let detections = match read_or_skip(&self.store, frame_index)? {
            Ok(detections) => detections,
            Err(reason) => return Ok(FrameOutcome::Skipped { frame_index, reason }),
        };

        let objects = self.classify_frame(frame, detections)?;
        let decision = self.engine.update_frame(&objects, frame.width(), frame.height());
        debug!(
            "Frame {frame_index}: {} Team1, {} Team2, decision {:?}",
            objects.team1.len(),
            objects.team2.len(),
            decision
        );
        Ok(FrameOutcome::Analysed(FrameAnalysis {
            frame_index,
            objects,
            decision,
            tally: self.engine.tally(),
        }))
    }

    /// Draws an analysed frame's overlay onto `frame`.
    pub fn annotate(&self, frame: &mut RgbImage, analysis: &FrameAnalysis) {
        self.renderer
            .render(frame, &analysis.objects, &analysis.decision, &analysis.tally);
    }

    /// Runs every stage over `frames` without rendering.
    pub fn run<S: FrameSource + ?Sized>(&mut self, frames: &S) -> Result<RunReport> {
        self.run_inner(frames, None::<&mut fn(usize, &RgbImage) -> Result<()>>)
    }

    /// Runs every stage and passes each annotated frame to `sink` along with its
    /// frame number. Skipped frames are not rendered.
    pub fn run_with_sink<S, F>(&mut self, frames: &S, mut sink: F) -> Result<RunReport>
    where
        S: FrameSource + ?Sized,
        F: FnMut(usize, &RgbImage) -> Result<()>,
    {
        self.run_inner(frames, Some(&mut sink))
    }

    fn run_inner<S, F>(&mut self, frames: &S, mut sink: Option<&mut F>) -> Result<RunReport>
    where
        S: FrameSource + ?Sized,
        F: FnMut(usize, &RgbImage) -> Result<()>,
    {
        let mut report = RunReport {
            frames_total: frames.len(),
            ..Default::default()
        };

        if !self.classifier.is_fitted() {
            let samples = self.collect_samples(frames)?;
            report.samples_collected = samples.len();
            self.fit(&samples)?;
        } else {
            info!("Using the provided team model; skipping sample collection");
        }

        self.engine.reset();
        for position in 0..frames.len() {
            let frame_index = frames.frame_number(position);
            let mut frame = frames.frame(position)?;
            match self.process_frame(frame_index, &frame)? {
                FrameOutcome::Skipped { reason, .. } => reason.count_in(&mut report),
                FrameOutcome::Analysed(analysis) => {
                    report.frames_processed += 1;
                    if analysis.objects.ball.is_some() {
                        report.frames_with_ball += 1;
                    }
                    if let Some(sink) = sink.as_deref_mut() {
                        self.annotate(&mut frame, &analysis);
                        sink(frame_index, &frame)?;
                    }
                }
            }
        }

        report.set_tally(self.engine.tally());
        info!(
            "Processed {}/{} frames ({} skipped): {}",
            report.frames_processed,
            report.frames_total,
            report.frames_skipped(),
            report.percentages
        );
        Ok(report)
    }
}
