// THEORY:
// The `DetectionAdapter` is the seam between the engine and whatever pretrained
// detector produces boxes. The detector itself is a black box behind the
// `ObjectDetector` trait; the adapter owns the policy around it:
//
// 1.  Two models: one for people (goalkeepers, players, referees) and one
//     specialised for the ball, each with its own confidence floor.
// 2.  At most one ball per frame: among the ball candidates only the most
//     confident survives into the frame's detections.
// 3.  Persistence: `detect_and_store` writes the frame's artifacts so the
//     two-pass analysis can re-walk them without re-running inference.

use crate::config::DetectionConfig;
use crate::core_modules::artifact_store::ArtifactStore;
use crate::core_modules::detection::{Detection, DetectionClass, FrameDetections, best_ball};
use crate::core_modules::frame_source::FrameSource;
use crate::error::Result;
use image::RgbImage;
use log::{debug, info};

/// A pretrained detector: one decoded frame in, normalized detections out.
pub trait ObjectDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;
}

/// Raw adapter output for one frame, before the single-ball reduction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterOutput {
    /// Goalkeepers, players and referees above the person confidence floor.
    pub objects: Vec<Detection>,
    /// Ball candidates above the ball confidence floor.
    pub ball_candidates: Vec<Detection>,
}

impl AdapterOutput {
    pub fn into_frame_detections(self) -> FrameDetections {
        let ball = best_ball(&self.ball_candidates);
        let mut frame = FrameDetections::from_detections(self.objects);
        frame.ball = ball;
        frame
    }
}

pub struct DetectionAdapter<P, B> {
    player_model: P,
    ball_model: B,
    config: DetectionConfig,
}

impl<P: ObjectDetector, B: ObjectDetector> DetectionAdapter<P, B> {
    pub fn new(player_model: P, ball_model: B, config: DetectionConfig) -> Self {
        Self {
            player_model,
            ball_model,
            config,
        }
    }

    /// Runs both models on one frame and applies the confidence floors.
    pub fn detect_frame(&mut self, frame: &RgbImage) -> Result<AdapterOutput> {
        let objects: Vec<Detection> = self
            .player_model
            .detect(frame)?
            .into_iter()
            .filter(|d| d.class != DetectionClass::Ball && d.confidence >= self.config.player_confidence)
            .collect();

        let ball_candidates: Vec<Detection> = self
            .ball_model
            .detect(frame)?
            .into_iter()
            .filter(|d| d.class == DetectionClass::Ball && d.confidence >= self.config.ball_confidence)
            .collect();

        Ok(AdapterOutput {
            objects,
            ball_candidates,
        })
    }

    /// Detects one frame, persists its artifacts and returns the reduced detections.
    pub fn detect_and_store(
        &mut self,
        frame_index: usize,
        frame: &RgbImage,
        store: &ArtifactStore,
    ) -> Result<FrameDetections> {
        let output = self.detect_frame(frame)?;
        store.write_frame(frame_index, &output.objects, &output.ball_candidates)?;
        debug!(
            "Frame {frame_index}: {} objects, {} ball candidates",
            output.objects.len(),
            output.ball_candidates.len()
        );
        Ok(output.into_frame_detections())
    }

    /// Detects and stores every frame of `frames` under its frame number. Returns
    /// the number of frames stored.
    pub fn detect_video<S: FrameSource + ?Sized>(&mut self, frames: &S, store: &ArtifactStore) -> Result<usize> {
        for position in 0..frames.len() {
            let frame = frames.frame(position)?;
            self.detect_and_store(frames.frame_number(position), &frame, store)?;
        }
        info!("Stored detections for {} frames in {}", frames.len(), store.root().display());
        Ok(frames.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct FixedDetector(Vec<Detection>);

    impl ObjectDetector for FixedDetector {
        fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    fn adapter() -> DetectionAdapter<FixedDetector, FixedDetector> {
        let people = FixedDetector(vec![
            Detection::new(DetectionClass::Player, 0.3, 0.3, 0.05, 0.1, 0.95),
            Detection::new(DetectionClass::Player, 0.6, 0.3, 0.05, 0.1, 0.5),
            Detection::new(DetectionClass::Referee, 0.4, 0.6, 0.05, 0.1, 0.85),
            Detection::new(DetectionClass::Ball, 0.9, 0.9, 0.01, 0.01, 0.99),
        ]);
        let balls = FixedDetector(vec![
            Detection::new(DetectionClass::Ball, 0.5, 0.5, 0.01, 0.01, 0.35),
            Detection::new(DetectionClass::Ball, 0.2, 0.7, 0.01, 0.01, 0.8),
            Detection::new(DetectionClass::Ball, 0.1, 0.1, 0.01, 0.01, 0.1),
        ]);
        DetectionAdapter::new(people, balls, DetectionConfig::default())
    }

    #[test]
    fn confidence_floors_are_applied_per_model() {
        let output = adapter().detect_frame(&RgbImage::new(4, 4)).expect("detect");
        assert_eq!(output.objects.len(), 2);
        assert!(output.objects.iter().all(|d| d.class != DetectionClass::Ball));
        assert_eq!(output.ball_candidates.len(), 2);
    }

    #[test]
    fn frame_keeps_the_single_most_confident_ball() {
        let frame = adapter()
            .detect_frame(&RgbImage::new(4, 4))
            .expect("detect")
            .into_frame_detections();
        let ball = frame.ball.expect("ball present");
        assert_eq!((ball.center_x, ball.center_y), (0.2, 0.7));
        assert_eq!(frame.players.len(), 1);
        assert_eq!(frame.referees.len(), 1);
    }

    #[test]
    fn detect_video_persists_every_frame() {
        let dir = tempdir().expect("temp dir");
        let store = ArtifactStore::new(dir.path());
        let frames = vec![RgbImage::new(4, 4); 3];

        let stored = adapter().detect_video(&frames, &store).expect("detect video");
        assert_eq!(stored, 3);
        assert_eq!(store.frame_count(), 3);

        let frame = store.read_frame(2).expect("read back");
        assert_eq!(frame.ball.map(|b| b.confidence), Some(0.8));
        assert_eq!(frame.players.len(), 1);
    }
}
