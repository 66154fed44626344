// THEORY:
// `PipelineConfig` gathers every tunable of the engine in one serde-friendly tree.
// Each section has its own defaults, so a JSON file only has to name the values it
// changes:
//
//     { "possession": { "threshold_px": 65.0 } }
//
// Precedence is file, then explicit overrides from the caller (the CLI), then
// `validate()`. The engine never reads the environment itself.

use crate::core_modules::detection::{Role, Team};
use crate::error::{PossessionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum ball-to-player distance, in pixels, for possession to be credited.
pub const DEFAULT_POSSESSION_THRESHOLD_PX: f64 = 50.0;

/// Confidence floor for player, goalkeeper and referee detections.
pub const DEFAULT_PLAYER_CONFIDENCE: f64 = 0.8;

/// Confidence floor for ball detections. The ball is small and often blurred, so
/// its detector is trusted at a much lower score.
pub const DEFAULT_BALL_CONFIDENCE: f64 = 0.2;

pub const DEFAULT_CLUSTERING_SEED: u64 = 0;
pub const DEFAULT_CLUSTERING_MAX_ITERATIONS: usize = 300;
pub const DEFAULT_CLUSTERING_RESTARTS: usize = 10;
pub const DEFAULT_CLUSTERING_TOLERANCE: f64 = 1e-4;

/// Configuration for the `PossessionPipeline`, allowing for tunable behavior.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub possession: PossessionConfig,
    pub detection: DetectionConfig,
    pub clustering: ClusteringConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PossessionConfig {
    /// Distance cutoff in pixels of the analysed frame.
    pub threshold_px: f64,
}

impl Default for PossessionConfig {
    fn default() -> Self {
        Self {
            threshold_px: DEFAULT_POSSESSION_THRESHOLD_PX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub player_confidence: f64,
    pub ball_confidence: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            player_confidence: DEFAULT_PLAYER_CONFIDENCE,
            ball_confidence: DEFAULT_BALL_CONFIDENCE,
        }
    }
}

/// Parameters of the 2-means jersey clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Seed for centroid initialisation; a fixed seed makes fitting reproducible.
    pub seed: u64,
    /// Lloyd iterations per restart.
    pub max_iterations: usize,
    /// Independent initialisations; the lowest-inertia result is kept.
    pub restarts: usize,
    /// Centroid movement (Lab units) below which a restart has converged.
    pub tolerance: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_CLUSTERING_SEED,
            max_iterations: DEFAULT_CLUSTERING_MAX_ITERATIONS,
            restarts: DEFAULT_CLUSTERING_RESTARTS,
            tolerance: DEFAULT_CLUSTERING_TOLERANCE,
        }
    }
}

/// RGB colours used by the frame renderer, one per role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub ball: [u8; 3],
    pub goalkeeper: [u8; 3],
    pub referee: [u8; 3],
    pub team1: [u8; 3],
    pub team2: [u8; 3],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            ball: [255, 0, 0],
            goalkeeper: [255, 255, 255],
            referee: [0, 0, 255],
            team1: [255, 255, 0],
            team2: [255, 0, 255],
        }
    }
}

impl Palette {
    pub fn color_for(&self, role: Role) -> [u8; 3] {
        match role {
            Role::Ball => self.ball,
            Role::Goalkeeper => self.goalkeeper,
            Role::Referee => self.referee,
            Role::Player { team } => self.team_color(team),
        }
    }

    pub fn team_color(&self, team: Team) -> [u8; 3] {
        match team {
            Team::Team1 => self.team1,
            Team::Team2 => self.team2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub palette: Palette,
    /// Bounding box stroke width in pixels.
    pub box_thickness: u32,
    /// Ball-to-player line width in pixels.
    pub line_thickness: u32,
    /// Integer scale applied to the built-in bitmap font.
    pub text_scale: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            palette: Palette::default(),
            box_thickness: 3,
            line_thickness: 2,
            text_scale: 3,
        }
    }
}

impl PipelineConfig {
    /// Loads a configuration file; sections and fields it omits keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.possession.threshold_px;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(PossessionError::Config(format!(
                "possession threshold must be a positive number of pixels, got {threshold}"
            )));
        }

        for (name, value) in [
            ("player confidence", self.detection.player_confidence),
            ("ball confidence", self.detection.ball_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PossessionError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.clustering.max_iterations == 0 || self.clustering.restarts == 0 {
            return Err(PossessionError::Config(
                "clustering needs at least one iteration and one restart".to_string(),
            ));
        }
        if !self.clustering.tolerance.is_finite() || self.clustering.tolerance < 0.0 {
            return Err(PossessionError::Config(format!(
                "clustering tolerance must be non-negative, got {}",
                self.clustering.tolerance
            )));
        }

        if self.render.text_scale == 0 {
            return Err(PossessionError::Config("text scale must be at least 1".to_string()));
        }
        Ok(())
    }
}
