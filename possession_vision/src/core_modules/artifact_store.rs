// THEORY:
// The `ArtifactStore` is the file-based hand-off between detection and analysis.
// Detection writes one directory per frame; the two-pass analysis reads it back as
// many times as it needs without re-running the detector.
//
// Layout, per frame `n`:
//
//     <root>/frame_<n>/player/labels/image0.txt   players, goalkeepers, referees,
//                                                 plus the single best ball
//     <root>/frame_<n>/ball/labels/image0.txt     every ball candidate
//
// Each line is `class_id x y w h conf`, normalized. The player file is the frame's
// required artifact: without it the frame is reported as `MissingArtifact`. The ball
// file is optional, and when both files carry balls the most confident one wins.

use crate::core_modules::detection::{Detection, DetectionClass, FrameDetections, best_ball};
use crate::error::{PossessionError, Result};
use log::trace;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const LABELS_FILE: &str = "image0.txt";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frame_dir(&self, frame_index: usize) -> PathBuf {
        self.root.join(format!("frame_{frame_index}"))
    }

    pub fn player_labels_path(&self, frame_index: usize) -> PathBuf {
        self.frame_dir(frame_index).join("player").join("labels").join(LABELS_FILE)
    }

    pub fn ball_labels_path(&self, frame_index: usize) -> PathBuf {
        self.frame_dir(frame_index).join("ball").join("labels").join(LABELS_FILE)
    }

    /// Persists one frame's detections. `objects` are the non-ball detections;
    /// every ball candidate goes to the ball file and only the most confident one is
    /// appended to the player file.
    pub fn write_frame(&self, frame_index: usize, objects: &[Detection], ball_candidates: &[Detection]) -> Result<()> {
        let player_path = self.player_labels_path(frame_index);
        let mut player_lines: Vec<Detection> = objects
            .iter()
            .filter(|d| d.class != DetectionClass::Ball)
            .copied()
            .collect();
        if let Some(ball) = best_ball(ball_candidates) {
            player_lines.push(ball);
        }
        write_labels(&player_path, &player_lines)?;

        let balls: Vec<Detection> = ball_candidates
            .iter()
            .filter(|d| d.class == DetectionClass::Ball)
            .copied()
            .collect();
        if !balls.is_empty() {
            write_labels(&self.ball_labels_path(frame_index), &balls)?;
        }

        trace!(
            "Stored frame {frame_index}: {} objects, {} ball candidates",
            player_lines.len(),
            balls.len()
        );
        Ok(())
    }

    /// Loads one frame's detections.
    ///
    /// Fails with `MissingArtifact` when the player file is absent and with
    /// `InvalidDetection` on the first malformed record in either file.
    pub fn read_frame(&self, frame_index: usize) -> Result<FrameDetections> {
        let player_path = self.player_labels_path(frame_index);
        if !player_path.is_file() {
            return Err(PossessionError::MissingArtifact(player_path));
        }

        let mut detections = read_labels(&player_path)?;
        let ball_path = self.ball_labels_path(frame_index);
        if ball_path.is_file() {
            detections.extend(
                read_labels(&ball_path)?
                    .into_iter()
                    .filter(|d| d.class == DetectionClass::Ball),
            );
        }
        Ok(FrameDetections::from_detections(detections))
    }

    /// Number of consecutive `frame_<n>` directories starting at 0.
    pub fn frame_count(&self) -> usize {
        let mut count = 0;
        while self.frame_dir(count).is_dir() {
            count += 1;
        }
        count
    }
}

fn write_labels(path: &Path, detections: &[Detection]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    for detection in detections {
        writeln!(file, "{}", detection.to_line())?;
    }
    Ok(())
}

fn read_labels(path: &Path) -> Result<Vec<Detection>> {
    fs::read_to_string(path)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(Detection::parse_line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ball(confidence: f64) -> Detection {
        Detection::new(DetectionClass::Ball, 0.5, 0.5, 0.01, 0.01, confidence)
    }

    #[test]
    fn stored_frame_reads_back_with_best_ball() {
        let dir = tempdir().expect("temp dir");
        let store = ArtifactStore::new(dir.path());
        let player = Detection::new(DetectionClass::Player, 0.3, 0.4, 0.05, 0.12, 0.93);
        let referee = Detection::new(DetectionClass::Referee, 0.7, 0.4, 0.05, 0.12, 0.88);

        store
            .write_frame(0, &[player, referee], &[ball(0.3), ball(0.6), ball(0.45)])
            .expect("write");

        let player_file = fs::read_to_string(store.player_labels_path(0)).expect("player file");
        assert_eq!(player_file.lines().count(), 3);
        let ball_file = fs::read_to_string(store.ball_labels_path(0)).expect("ball file");
        assert_eq!(ball_file.lines().count(), 3);

        let frame = store.read_frame(0).expect("read");
        assert_eq!(frame.players, vec![player]);
        assert_eq!(frame.referees, vec![referee]);
        assert_eq!(frame.ball.map(|b| b.confidence), Some(0.6));
        assert_eq!(store.frame_count(), 1);
    }

    #[test]
    fn frame_without_ball_writes_no_ball_file() {
        let dir = tempdir().expect("temp dir");
        let store = ArtifactStore::new(dir.path());
        store.write_frame(3, &[], &[]).expect("write");
        assert!(store.player_labels_path(3).is_file());
        assert!(!store.ball_labels_path(3).exists());
        assert!(store.read_frame(3).expect("read").is_empty());
    }

    #[test]
    fn missing_player_file_is_a_missing_artifact() {
        let dir = tempdir().expect("temp dir");
        let store = ArtifactStore::new(dir.path());
        let err = store.read_frame(7).unwrap_err();
        assert!(matches!(err, PossessionError::MissingArtifact(ref path) if path.ends_with("image0.txt")));
        assert_eq!(store.frame_count(), 0);
    }

    #[test]
    fn malformed_line_invalidates_the_frame() {
        let dir = tempdir().expect("temp dir");
        let store = ArtifactStore::new(dir.path());
        let path = store.player_labels_path(0);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "2 0.5 0.5 0.1 0.2 0.9\n2 0.5 oops 0.1 0.2 0.9\n").expect("write");

        let err = store.read_frame(0).unwrap_err();
        assert!(matches!(err, PossessionError::InvalidDetection { .. }));
    }

    #[test]
    fn hand_written_files_may_omit_the_ball_file() {
        let dir = tempdir().expect("temp dir");
        let store = ArtifactStore::new(dir.path());
        let path = store.player_labels_path(0);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "2 0.5 0.5 0.1 0.2 0.9\n\n0 0.51 0.5 0.01 0.01 0.4\n").expect("write");

        let frame = store.read_frame(0).expect("read");
        assert_eq!(frame.players.len(), 1);
        assert!(frame.ball.is_some());
    }
}
