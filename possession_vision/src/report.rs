// THEORY:
// The `RunReport` is the user-facing summary of one analysis run: how many frames
// were seen, how many had to be skipped and why, and the final possession split.
// Frame-level failures never abort a run, so this report is where they surface.

use crate::core_modules::possession::{PossessionPercentages, PossessionTally};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Frames offered by the frame source.
    pub frames_total: usize,
    /// Frames that went through classification and the possession decision.
    pub frames_processed: usize,
    /// Frames skipped because their detection artifact was absent.
    pub frames_skipped_missing: usize,
    /// Frames skipped because a detection record was malformed.
    pub frames_skipped_invalid: usize,
    /// Processed frames with a ball detection.
    pub frames_with_ball: usize,
    /// Colour samples the team model was fitted on (0 when a saved model was reused).
    pub samples_collected: usize,
    pub tally: PossessionTally,
    pub percentages: PossessionPercentages,
}

impl RunReport {
    pub fn frames_skipped(&self) -> usize {
        self.frames_skipped_missing + self.frames_skipped_invalid
    }

    pub fn set_tally(&mut self, tally: PossessionTally) {
        self.tally = tally;
        self.percentages = tally.percentages();
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frames total:      {}", self.frames_total)?;
        writeln!(f, "Frames processed:  {}", self.frames_processed)?;
        writeln!(
            f,
            "Frames skipped:    {} (missing detections: {}, invalid detections: {})",
            self.frames_skipped(),
            self.frames_skipped_missing,
            self.frames_skipped_invalid
        )?;
        writeln!(f, "Frames with ball:  {}", self.frames_with_ball)?;
        writeln!(
            f,
            "Possession frames: Team1 {} | Team2 {}",
            self.tally.team1, self.tally.team2
        )?;
        write!(f, "Possession:        {}", self.percentages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_skips_and_percentages() {
        let mut report = RunReport {
            frames_total: 10,
            frames_processed: 7,
            frames_skipped_missing: 2,
            frames_skipped_invalid: 1,
            frames_with_ball: 6,
            ..Default::default()
        };
        report.set_tally(PossessionTally { team1: 3, team2: 1 });

        let text = report.to_string();
        assert!(text.contains("Frames skipped:    3 (missing detections: 2, invalid detections: 1)"));
        assert!(text.contains("Team1: 75.0% | Team2: 25.0%"));
    }

    #[test]
    fn serializes_to_json() {
        let report = RunReport::default();
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["frames_total"], 0);
        assert_eq!(json["percentages"]["team1"], 0.0);
    }
}
