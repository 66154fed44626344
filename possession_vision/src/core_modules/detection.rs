// THEORY:
// The `detection` module is the data vocabulary of the engine. A `Detection` is a
// "dumb" snapshot of one object in one frame, exactly as the detector reported it:
// a class, a normalized centre-size box and a confidence. It has no memory and no
// identity across frames.
//
// Key architectural principles:
// 1.  **Closed class set**: raw class ids are parsed once, at the boundary, into the
//     `DetectionClass` enum. Anything else is an `InvalidDetection`, never a silent
//     fallthrough.
// 2.  **Roles, not recycled ids**: once the team classifier has run, an object's
//     meaning is a `Role`. A player's team is carried by the variant itself, so the
//     class id is never overwritten with a "team code".
// 3.  **One unit boundary**: boxes stay normalized until someone needs pixels.
//     `to_pixel_box` and `pixel_center` are the only places that denormalize, and
//     the possession threshold is expressed in the same pixel units.

use crate::error::{PossessionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The object classes a detection record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionClass {
    Ball,
    Goalkeeper,
    Player,
    Referee,
}

impl DetectionClass {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(DetectionClass::Ball),
            1 => Some(DetectionClass::Goalkeeper),
            2 => Some(DetectionClass::Player),
            3 => Some(DetectionClass::Referee),
            _ => None,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            DetectionClass::Ball => 0,
            DetectionClass::Goalkeeper => 1,
            DetectionClass::Player => 2,
            DetectionClass::Referee => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    Team1,
    Team2,
}

impl Team {
    /// Maps a 0-based cluster index to its team label.
    pub fn from_cluster_index(index: usize) -> Self {
        if index == 0 { Team::Team1 } else { Team::Team2 }
    }

    /// The 1-indexed team number.
    pub fn number(&self) -> u8 {
        match self {
            Team::Team1 => 1,
            Team::Team2 => 2,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Team{}", self.number())
    }
}

/// What an object means once the frame has been classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Ball,
    Goalkeeper,
    Referee,
    Player { team: Team },
}

/// A rectangle in pixel coordinates, `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl PixelBox {
    pub fn width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> u32 {
        self.y_max.saturating_sub(self.y_min)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// A single object reported by the detector, in normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: DetectionClass,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
}

impl Detection {
    pub fn new(
        class: DetectionClass,
        center_x: f64,
        center_y: f64,
        width: f64,
        height: f64,
        confidence: f64,
    ) -> Self {
        Self {
            class,
            center_x,
            center_y,
            width,
            height,
            confidence,
        }
    }

    /// Parses one `class_id x y w h conf` record.
    pub fn parse_line(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(PossessionError::invalid_detection(
                trimmed,
                format!("expected 6 fields, found {}", fields.len()),
            ));
        }

        let mut values = [0.0f64; 6];
        for (value, field) in values.iter_mut().zip(&fields) {
            *value = field.parse::<f64>().map_err(|_| {
                PossessionError::invalid_detection(trimmed, format!("'{field}' is not a number"))
            })?;
            if !value.is_finite() {
                return Err(PossessionError::invalid_detection(
                    trimmed,
                    format!("'{field}' is not finite"),
                ));
            }
        }

        let [class_value, center_x, center_y, width, height, confidence] = values;
        if class_value < 0.0 || class_value.fract() != 0.0 {
            return Err(PossessionError::invalid_detection(
                trimmed,
                format!("class id {class_value} is not a non-negative integer"),
            ));
        }
        let class = DetectionClass::from_id(class_value as u32).ok_or_else(|| {
            PossessionError::invalid_detection(trimmed, format!("unknown class id {class_value}"))
        })?;

        for (name, value) in [
            ("x", center_x),
            ("y", center_y),
            ("width", width),
            ("height", height),
            ("confidence", confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PossessionError::invalid_detection(
                    trimmed,
                    format!("{name} {value} is outside [0, 1]"),
                ));
            }
        }

        Ok(Self::new(class, center_x, center_y, width, height, confidence))
    }

    /// Formats the detection as a `class_id x y w h conf` record.
    pub fn to_line(&self) -> String {
        format!(
            "{} {:.6} {:.6} {:.6} {:.6} {:.6}",
            self.class.id(),
            self.center_x,
            self.center_y,
            self.width,
            self.height,
            self.confidence
        )
    }

    /// The box centre in pixel coordinates for a `frame_width` × `frame_height` frame.
    pub fn pixel_center(&self, frame_width: u32, frame_height: u32) -> (f64, f64) {
        (
            self.center_x * frame_width as f64,
            self.center_y * frame_height as f64,
        )
    }

    /// Converts the normalized `xywh` box to a pixel `xyxy` box clamped to the frame.
    pub fn to_pixel_box(&self, frame_width: u32, frame_height: u32) -> PixelBox {
        let clamp = |value: f64, limit: u32| -> u32 { value.max(0.0).min(limit as f64) as u32 };
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        PixelBox {
            x_min: clamp((self.center_x - half_w) * frame_width as f64, frame_width),
            y_min: clamp((self.center_y - half_h) * frame_height as f64, frame_height),
            x_max: clamp((self.center_x + half_w) * frame_width as f64, frame_width),
            y_max: clamp((self.center_y + half_h) * frame_height as f64, frame_height),
        }
    }

    /// Euclidean distance between the two box centres, in pixels.
    pub fn pixel_distance(&self, other: &Detection, frame_width: u32, frame_height: u32) -> f64 {
        let (ax, ay) = self.pixel_center(frame_width, frame_height);
        let (bx, by) = other.pixel_center(frame_width, frame_height);
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// Picks the highest-confidence ball; the first one wins a confidence tie.
pub fn best_ball<'a, I>(candidates: I) -> Option<Detection>
where
    I: IntoIterator<Item = &'a Detection>,
{
    let mut best: Option<Detection> = None;
    for candidate in candidates {
        if candidate.class != DetectionClass::Ball {
            continue;
        }
        match best {
            Some(current) if candidate.confidence <= current.confidence => {}
            _ => best = Some(*candidate),
        }
    }
    best
}

/// All detections of a single frame, grouped by class. At most one ball.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDetections {
    pub ball: Option<Detection>,
    pub players: Vec<Detection>,
    pub goalkeepers: Vec<Detection>,
    pub referees: Vec<Detection>,
}

impl FrameDetections {
    /// Groups raw detections by class, keeping only the highest-confidence ball.
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        let ball = best_ball(&detections);
        let mut frame = FrameDetections {
            ball,
            ..Default::default()
        };
        for detection in detections {
            match detection.class {
                DetectionClass::Ball => {}
                DetectionClass::Goalkeeper => frame.goalkeepers.push(detection),
                DetectionClass::Player => frame.players.push(detection),
                DetectionClass::Referee => frame.referees.push(detection),
            }
        }
        frame
    }

    pub fn len(&self) -> usize {
        self.ball.iter().count() + self.players.len() + self.goalkeepers.len() + self.referees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A frame after team classification: every player carries its team.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedFrame {
    pub ball: Option<Detection>,
    pub team1: Vec<Detection>,
    pub team2: Vec<Detection>,
    pub goalkeepers: Vec<Detection>,
    pub referees: Vec<Detection>,
}

impl ClassifiedFrame {
    pub fn team(&self, team: Team) -> &[Detection] {
        match team {
            Team::Team1 => &self.team1,
            Team::Team2 => &self.team2,
        }
    }

    pub fn push_player(&mut self, team: Team, detection: Detection) {
        match team {
            Team::Team1 => self.team1.push(detection),
            Team::Team2 => self.team2.push(detection),
        }
    }

    /// Every object in the frame paired with its role, in drawing order.
    pub fn labelled(&self) -> Vec<(Role, &Detection)> {
        let mut objects = Vec::with_capacity(self.object_count());
        objects.extend(self.referees.iter().map(|d| (Role::Referee, d)));
        objects.extend(self.goalkeepers.iter().map(|d| (Role::Goalkeeper, d)));
        objects.extend(self.team1.iter().map(|d| (Role::Player { team: Team::Team1 }, d)));
        objects.extend(self.team2.iter().map(|d| (Role::Player { team: Team::Team2 }, d)));
        objects.extend(self.ball.iter().map(|d| (Role::Ball, d)));
        objects
    }

    pub fn object_count(&self) -> usize {
        self.ball.iter().count()
            + self.team1.len()
            + self.team2.len()
            + self.goalkeepers.len()
            + self.referees.len()
    }
}
