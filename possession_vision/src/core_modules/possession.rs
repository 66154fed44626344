// THEORY:
// The `PossessionEngine` is the decision layer. For every frame it answers one
// question: is some player close enough to the ball to be credited with it, and if
// so, which team is that player on?
//
// Key architectural principles:
// 1.  **Global nearest, not per-team nearest**: Team1's players are scanned first and
//     then Team2's, all against one running minimum. A player only replaces the
//     current best with a strictly smaller distance, so equidistant players resolve
//     to the first one encountered. That order is stable, which keeps replays
//     reproducible.
// 2.  **Pixel units**: Distances are measured between box centres after
//     denormalizing to the frame's pixel grid, and the threshold is in pixels.
// 3.  **Explicit, owned state**: The `PossessionTally` is a plain value owned by the
//     engine. It only ever grows, by at most one count per frame. `reset` starts a
//     fresh replay; nothing is global.

use crate::core_modules::detection::{ClassifiedFrame, Detection, Team};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frames credited to each team.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PossessionTally {
    pub team1: u64,
    pub team2: u64,
}

/// Possession share of each team in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PossessionPercentages {
    pub team1: f64,
    pub team2: f64,
}

impl PossessionTally {
    pub fn record(&mut self, team: Team) {
        match team {
            Team::Team1 => self.team1 += 1,
            Team::Team2 => self.team2 += 1,
        }
    }

    pub fn count(&self, team: Team) -> u64 {
        match team {
            Team::Team1 => self.team1,
            Team::Team2 => self.team2,
        }
    }

    pub fn total(&self) -> u64 {
        self.team1 + self.team2
    }

    /// `count / total * 100` per team, or 0% for both when nothing was counted.
    pub fn percentages(&self) -> PossessionPercentages {
        let total = self.total();
        if total == 0 {
            return PossessionPercentages::default();
        }
        PossessionPercentages {
            team1: self.team1 as f64 / total as f64 * 100.0,
            team2: self.team2 as f64 / total as f64 * 100.0,
        }
    }
}

impl PossessionPercentages {
    pub fn get(&self, team: Team) -> f64 {
        match team {
            Team::Team1 => self.team1,
            Team::Team2 => self.team2,
        }
    }
}

impl fmt::Display for PossessionPercentages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Team1: {:.1}% | Team2: {:.1}%", self.team1, self.team2)
    }
}

/// A credited possession: who has the ball, and how far away it is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub team: Team,
    pub player: Detection,
    pub ball: Detection,
    pub distance_px: f64,
}

/// The engine's verdict for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PossessionDecision {
    /// No ball was detected; possession was not evaluated.
    NoBall,
    /// The ball was detected but nobody was within the threshold (or no players).
    Unassigned { nearest_distance_px: Option<f64> },
    Assigned(Assignment),
}

impl PossessionDecision {
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            PossessionDecision::Assigned(assignment) => Some(assignment),
            _ => None,
        }
    }

    pub fn team(&self) -> Option<Team> {
        self.assignment().map(|a| a.team)
    }
}

/// The nearest player to `ball` across both teams, scanning Team1 then Team2.
/// The first player found at the minimum distance wins.
pub fn nearest_player(
    ball: &Detection,
    team1: &[Detection],
    team2: &[Detection],
    frame_width: u32,
    frame_height: u32,
) -> Option<(Team, Detection, f64)> {
    let mut best: Option<(Team, Detection, f64)> = None;
    for (team, players) in [(Team::Team1, team1), (Team::Team2, team2)] {
        for player in players {
            let distance = ball.pixel_distance(player, frame_width, frame_height);
            let closer = match &best {
                Some((_, _, best_distance)) => distance < *best_distance,
                None => true,
            };
            if closer {
                best = Some((team, *player, distance));
            }
        }
    }
    best
}

/// Decides possession frame by frame and owns the running tally.
#[derive(Debug, Clone)]
pub struct PossessionEngine {
    threshold_px: f64,
    tally: PossessionTally,
}

impl PossessionEngine {
    pub fn new(threshold_px: f64) -> Self {
        Self {
            threshold_px,
            tally: PossessionTally::default(),
        }
    }

    pub fn threshold_px(&self) -> f64 {
        self.threshold_px
    }

    pub fn tally(&self) -> PossessionTally {
        self.tally
    }

    /// Starts a fresh replay.
    pub fn reset(&mut self) {
        self.tally = PossessionTally::default();
    }

    /// Decides one frame without touching the tally.
    pub fn decide(
        &self,
        ball: Option<&Detection>,
        team1: &[Detection],
        team2: &[Detection],
        frame_width: u32,
        frame_height: u32,
    ) -> PossessionDecision {
        let Some(ball) = ball else {
            return PossessionDecision::NoBall;
        };

        match nearest_player(ball, team1, team2, frame_width, frame_height) {
            Some((team, player, distance_px)) if distance_px <= self.threshold_px => {
                PossessionDecision::Assigned(Assignment {
                    team,
                    player,
                    ball: *ball,
                    distance_px,
                })
            }
            Some((_, _, distance_px)) => PossessionDecision::Unassigned {
                nearest_distance_px: Some(distance_px),
            },
            None => PossessionDecision::Unassigned {
                nearest_distance_px: None,
            },
        }
    }

    /// Decides one frame and credits the possessing team, if any.
    pub fn update(
        &mut self,
        ball: Option<&Detection>,
        team1: &[Detection],
        team2: &[Detection],
        frame_width: u32,
        frame_height: u32,
    ) -> PossessionDecision {
        let decision = self.decide(ball, team1, team2, frame_width, frame_height);
        if let Some(assignment) = decision.assignment() {
            self.tally.record(assignment.team);
            debug!(
                "Possession to {} at {:.1}px (threshold {:.1}px)",
                assignment.team, assignment.distance_px, self.threshold_px
            );
        }
        decision
    }

    pub fn update_frame(&mut self, frame: &ClassifiedFrame, frame_width: u32, frame_height: u32) -> PossessionDecision {
        self.update(frame.ball.as_ref(), &frame.team1, &frame.team2, frame_width, frame_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::DetectionClass;

    const WIDTH: u32 = 1000;
    const HEIGHT: u32 = 1000;

    fn ball_at(x: f64, y: f64) -> Detection {
        Detection::new(DetectionClass::Ball, x, y, 0.01, 0.01, 0.6)
    }

    fn player_at(x: f64, y: f64) -> Detection {
        Detection::new(DetectionClass::Player, x, y, 0.04, 0.1, 0.9)
    }

    #[test]
    fn nearest_player_within_threshold_gets_the_ball() {
        let mut engine = PossessionEngine::new(50.0);
        let ball = ball_at(0.5, 0.5);
        let decision = engine.update(Some(&ball), &[player_at(0.5, 0.51)], &[player_at(0.5, 0.7)], WIDTH, HEIGHT);

        assert_eq!(decision.team(), Some(Team::Team1));
        assert_eq!(engine.tally(), PossessionTally { team1: 1, team2: 0 });
    }

    #[test]
    fn team2_wins_when_globally_nearest() {
        let mut engine = PossessionEngine::new(50.0);
        let ball = ball_at(0.5, 0.5);
        let decision = engine.update(
            Some(&ball),
            &[player_at(0.5, 0.54), player_at(0.1, 0.1)],
            &[player_at(0.52, 0.5)],
            WIDTH,
            HEIGHT,
        );
        let assignment = decision.assignment().expect("assigned");
        assert_eq!(assignment.team, Team::Team2);
        assert!((assignment.distance_px - 20.0).abs() < 1e-6);
    }

    #[test]
    fn nobody_within_threshold_leaves_tally_unchanged() {
        let mut engine = PossessionEngine::new(50.0);
        let ball = ball_at(0.5, 0.5);
        let decision = engine.update(Some(&ball), &[player_at(0.5, 0.7)], &[player_at(0.1, 0.5)], WIDTH, HEIGHT);

        assert!(decision.assignment().is_none());
        match decision {
            PossessionDecision::Unassigned { nearest_distance_px } => {
                assert!((nearest_distance_px.expect("players exist") - 200.0).abs() < 1e-6);
            }
            other => panic!("unexpected decision {other:?}"),
        }
        assert_eq!(engine.tally(), PossessionTally::default());
    }

    #[test]
    fn missing_ball_never_changes_tally() {
        let mut engine = PossessionEngine::new(1_000.0);
        let decision = engine.update(None, &[player_at(0.5, 0.5)], &[player_at(0.5, 0.5)], WIDTH, HEIGHT);
        assert_eq!(decision, PossessionDecision::NoBall);
        assert_eq!(engine.tally().total(), 0);
    }

    #[test]
    fn ball_without_players_is_unassigned() {
        let mut engine = PossessionEngine::new(50.0);
        let decision = engine.update(Some(&ball_at(0.5, 0.5)), &[], &[], WIDTH, HEIGHT);
        assert_eq!(decision, PossessionDecision::Unassigned { nearest_distance_px: None });
    }

    #[test]
    fn threshold_is_inclusive() {
        let ball = ball_at(0.5, 0.5);
        let player = player_at(0.5, 0.53);
        let distance = ball.pixel_distance(&player, WIDTH, HEIGHT);

        let at_threshold = PossessionEngine::new(distance);
        assert_eq!(
            at_threshold.decide(Some(&ball), &[], &[player], WIDTH, HEIGHT).team(),
            Some(Team::Team2)
        );

        let below_threshold = PossessionEngine::new(distance - 1e-6);
        assert!(below_threshold.decide(Some(&ball), &[], &[player], WIDTH, HEIGHT).assignment().is_none());
    }

    #[test]
    fn equidistant_players_resolve_to_first_encountered() {
        let engine = PossessionEngine::new(100.0);
        let ball = ball_at(0.5, 0.5);

        let same = player_at(0.5, 0.52);
        let decision = engine.decide(Some(&ball), &[same], &[same], WIDTH, HEIGHT);
        assert_eq!(decision.team(), Some(Team::Team1));

        let first = player_at(0.5, 0.52);
        let second = player_at(0.5, 0.52);
        let decision = engine.decide(Some(&ball), &[], &[first, second], WIDTH, HEIGHT);
        assert_eq!(decision.team(), Some(Team::Team2));
    }

    #[test]
    fn replaying_a_sequence_is_deterministic() {
        let frames: Vec<(Option<Detection>, Vec<Detection>, Vec<Detection>)> = (0..30)
            .map(|i| {
                let t = i as f64 / 30.0;
                let ball = if i % 7 == 0 { None } else { Some(ball_at(0.2 + 0.6 * t, 0.5)) };
                (ball, vec![player_at(0.25 + 0.5 * t, 0.52)], vec![player_at(0.8 - 0.4 * t, 0.49)])
            })
            .collect();

        let replay = |engine: &mut PossessionEngine| {
            for (ball, team1, team2) in &frames {
                engine.update(ball.as_ref(), team1, team2, 1920, 1080);
            }
            engine.tally()
        };

        let mut engine = PossessionEngine::new(60.0);
        let first = replay(&mut engine);
        engine.reset();
        let second = replay(&mut engine);
        let third = replay(&mut PossessionEngine::new(60.0));
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert!(first.total() > 0);
    }

    #[test]
    fn percentages_handle_zero_total() {
        let tally = PossessionTally::default();
        assert_eq!(tally.percentages(), PossessionPercentages { team1: 0.0, team2: 0.0 });
    }

    #[test]
    fn percentages_are_bounded_and_sum_to_100() {
        for (team1, team2) in [(1, 0), (0, 5), (3, 7), (123, 456)] {
            let percentages = PossessionTally { team1, team2 }.percentages();
            assert!((0.0..=100.0).contains(&percentages.team1));
            assert!((0.0..=100.0).contains(&percentages.team2));
            assert!((percentages.team1 + percentages.team2 - 100.0).abs() < 1e-9);
        }
        let percentages = PossessionTally { team1: 1, team2: 3 }.percentages();
        assert_eq!(percentages.team1, 25.0);
        assert_eq!(percentages.to_string(), "Team1: 25.0% | Team2: 75.0%");
    }
}
