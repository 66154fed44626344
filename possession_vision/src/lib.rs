// THEORY:
// This file is the main entry point for the `possession_vision` library crate.
// It estimates, frame by frame, which of two teams controls the ball in a football
// video, and accumulates that into per-team possession percentages.
//
// The engine never touches raw video or detector weights. It consumes decoded frames
// through `FrameSource` and per-frame detections persisted by the `DetectionAdapter`
// in an `ArtifactStore`, then runs a two-pass analysis:
//
// 1.  Walk every frame once and collect a CIELAB shirt colour sample per player.
// 2.  Fit the two-team colour model on all samples, once.
// 3.  Walk every frame again: classify players, decide possession, tally, render.
//
// `PossessionPipeline` is the sequential top-level API; `ParallelPossessionPipeline`
// runs the third pass across a worker pool against the already fitted model.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod report;

pub use config::PipelineConfig;
pub use core_modules::detection::{ClassifiedFrame, Detection, DetectionClass, FrameDetections, Role, Team};
pub use core_modules::possession::{PossessionDecision, PossessionTally};
pub use core_modules::team_classifier::{ColorSample, TeamModel};
pub use error::{PossessionError, Result};
pub use report::RunReport;
