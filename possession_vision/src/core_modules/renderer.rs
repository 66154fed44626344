// THEORY:
// The `FrameRenderer` is a thin presentation layer. It draws what the engine
// decided and makes no decisions of its own:
// - a coloured box per object (colour by role, so by team for players),
// - the detector confidence just above each box,
// - the running possession percentage of both teams, bottom-left,
// - a line from the ball to the possessing player, only when possession was credited.
//
// Boxes and lines are drawn with `imageproc`, which clips everything to the frame.
// Text uses a tiny built-in 5x7 bitmap font that covers exactly the characters the
// overlay prints, each lit font pixel stamped as a `scale` x `scale` square.

use crate::config::RenderConfig;
use crate::core_modules::detection::{ClassifiedFrame, PixelBox, Team};
use crate::core_modules::possession::{PossessionDecision, PossessionTally};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const LABEL_MARGIN: u32 = 10;

fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        '%' => [0b11000, 0b11001, 0b00010, 0b00100, 0b01000, 0b10011, 0b00011],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'e' => [0b00000, 0b00000, 0b01110, 0b10001, 0b11111, 0b10000, 0b01110],
        'a' => [0b00000, 0b00000, 0b01110, 0b00001, 0b01111, 0b10001, 0b01111],
        'm' => [0b00000, 0b00000, 0b11010, 0b10101, 0b10101, 0b10001, 0b10001],
        _ => [0; 7],
    }
}

pub struct FrameRenderer {
    config: RenderConfig,
}

impl FrameRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Annotates `frame` in place.
    pub fn render(
        &self,
        frame: &mut RgbImage,
        objects: &ClassifiedFrame,
        decision: &PossessionDecision,
        tally: &PossessionTally,
    ) {
        let (width, height) = frame.dimensions();
        let palette = &self.config.palette;
        let scale = self.config.text_scale.max(1);

        for (role, detection) in objects.labelled() {
            let color = Rgb(palette.color_for(role));
            let pixel_box = detection.to_pixel_box(width, height);
            draw_box(frame, &pixel_box, color, self.config.box_thickness);

            let label = format!("{:.2}", detection.confidence);
            let label_y = pixel_box.y_min.saturating_sub(GLYPH_HEIGHT * scale + LABEL_MARGIN / 2);
            draw_text(frame, pixel_box.x_min, label_y, &label, color, scale);
        }

        if let Some(assignment) = decision.assignment() {
            let color = Rgb(palette.team_color(assignment.team));
            let (bx, by) = assignment.ball.pixel_center(width, height);
            let (px, py) = assignment.player.pixel_center(width, height);
            draw_line(
                frame,
                (bx as f32, by as f32),
                (px as f32, py as f32),
                color,
                self.config.line_thickness,
            );
        }

        self.draw_possession(frame, tally);
    }

    fn draw_possession(&self, frame: &mut RgbImage, tally: &PossessionTally) {
        let percentages = tally.percentages();
        let scale = self.config.text_scale.max(1);
        let line_height = GLYPH_HEIGHT * scale + LABEL_MARGIN;
        let height = frame.height();

        for (row, team) in [Team::Team1, Team::Team2].into_iter().enumerate() {
            let text = format!("{team}: {:.1}%", percentages.get(team));
            let y = height.saturating_sub(line_height * (2 - row as u32));
            draw_text(
                frame,
                LABEL_MARGIN,
                y,
                &text,
                Rgb(self.config.palette.team_color(team)),
                scale,
            );
        }
    }
}

/// Box outline drawn inwards from the box edges, one hollow rectangle per pixel
/// of thickness.
pub fn draw_box(frame: &mut RgbImage, pixel_box: &PixelBox, color: Rgb<u8>, thickness: u32) {
    if pixel_box.is_empty() {
        return;
    }
    let (w, h) = (pixel_box.width(), pixel_box.height());
    let rings = thickness.max(1).min(w.min(h).div_ceil(2));
    for inset in 0..rings {
        let rect = Rect::at((pixel_box.x_min + inset) as i32, (pixel_box.y_min + inset) as i32)
            .of_size(w - 2 * inset, h - 2 * inset);
        draw_hollow_rect_mut(frame, rect, color);
    }
}

/// Line segment; thicker lines are widened with a round brush along the segment.
pub fn draw_line(frame: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>, thickness: u32) {
    draw_line_segment_mut(frame, from, to, color);
    let radius = (thickness / 2) as i32;
    if radius == 0 {
        return;
    }
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as u32;
    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        let center = ((from.0 + dx * t).round() as i32, (from.1 + dy * t).round() as i32);
        draw_filled_circle_mut(frame, center, radius, color);
    }
}

/// Draws `text` with its top-left corner at (`x`, `y`).
pub fn draw_text(frame: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>, scale: u32) {
    let scale = scale.max(1);
    let advance = (GLYPH_WIDTH + 1) * scale;
    for (index, c) in text.chars().enumerate() {
        let origin_x = x + index as u32 * advance;
        for (row, bits) in glyph(c).iter().enumerate() {
            for column in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - column)) != 0 {
                    let cell = Rect::at((origin_x + column * scale) as i32, (y + row as u32 * scale) as i32)
                        .of_size(scale, scale);
                    draw_filled_rect_mut(frame, cell, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::{Detection, DetectionClass};
    use crate::core_modules::possession::PossessionEngine;

    fn count_color(frame: &RgbImage, color: [u8; 3]) -> usize {
        frame.pixels().filter(|p| p.0 == color).count()
    }

    fn scene() -> ClassifiedFrame {
        let mut frame = ClassifiedFrame {
            ball: Some(Detection::new(DetectionClass::Ball, 0.5, 0.5, 0.02, 0.02, 0.6)),
            ..Default::default()
        };
        frame.push_player(Team::Team1, Detection::new(DetectionClass::Player, 0.3, 0.5, 0.1, 0.2, 0.9));
        frame.push_player(Team::Team2, Detection::new(DetectionClass::Player, 0.8, 0.5, 0.1, 0.2, 0.9));
        frame
    }

    #[test]
    fn box_outline_leaves_interior_untouched() {
        let mut frame = RgbImage::new(20, 20);
        let pixel_box = PixelBox {
            x_min: 2,
            y_min: 2,
            x_max: 12,
            y_max: 10,
        };
        draw_box(&mut frame, &pixel_box, Rgb([9, 9, 9]), 1);
        assert_eq!(frame.get_pixel(2, 2).0, [9, 9, 9]);
        assert_eq!(frame.get_pixel(11, 9).0, [9, 9, 9]);
        assert_eq!(frame.get_pixel(6, 6).0, [0, 0, 0]);
        assert_eq!(count_color(&frame, [9, 9, 9]), 2 * 10 + 2 * 8 - 4);
    }

    #[test]
    fn thick_box_is_drawn_inside_its_edges() {
        let mut frame = RgbImage::new(20, 20);
        let pixel_box = PixelBox {
            x_min: 2,
            y_min: 2,
            x_max: 12,
            y_max: 10,
        };
        draw_box(&mut frame, &pixel_box, Rgb([9, 9, 9]), 3);
        assert_eq!(frame.get_pixel(4, 4).0, [9, 9, 9]);
        assert_eq!(frame.get_pixel(5, 5).0, [0, 0, 0]);
        assert_eq!(frame.get_pixel(1, 1).0, [0, 0, 0]);
        assert_eq!(frame.get_pixel(12, 10).0, [0, 0, 0]);
    }

    #[test]
    fn oversized_box_thickness_fills_the_box() {
        let mut frame = RgbImage::new(10, 10);
        let pixel_box = PixelBox {
            x_min: 1,
            y_min: 1,
            x_max: 5,
            y_max: 4,
        };
        draw_box(&mut frame, &pixel_box, Rgb([9, 9, 9]), 50);
        assert_eq!(count_color(&frame, [9, 9, 9]), 4 * 3);
    }

    #[test]
    fn line_thickness_widens_the_stroke() {
        let mut thin = RgbImage::new(30, 30);
        draw_line(&mut thin, (2.0, 10.0), (20.0, 10.0), Rgb([1, 2, 3]), 1);
        assert_eq!(thin.get_pixel(10, 10).0, [1, 2, 3]);
        assert_eq!(thin.get_pixel(10, 12).0, [0, 0, 0]);

        let mut thick = RgbImage::new(30, 30);
        draw_line(&mut thick, (2.0, 10.0), (20.0, 10.0), Rgb([1, 2, 3]), 4);
        assert_eq!(thick.get_pixel(10, 12).0, [1, 2, 3]);
        assert_eq!(thick.get_pixel(2, 10).0, [1, 2, 3]);
        assert_eq!(thick.get_pixel(20, 10).0, [1, 2, 3]);
        assert_eq!(thick.get_pixel(10, 14).0, [0, 0, 0]);
    }

    #[test]
    fn drawing_off_the_frame_is_clipped() {
        let mut frame = RgbImage::new(10, 10);
        draw_line(&mut frame, (-5.0, 5.0), (40.0, 5.0), Rgb([7, 7, 7]), 3);
        draw_text(&mut frame, 8, 8, "100%", Rgb([7, 7, 7]), 2);
        assert_eq!(frame.get_pixel(0, 5).0, [7, 7, 7]);
        assert_eq!(frame.get_pixel(9, 5).0, [7, 7, 7]);
    }

    #[test]
    fn possession_line_is_drawn_only_for_assignments() {
        let config = RenderConfig::default();
        let line_color = config.palette.team1;
        let renderer = FrameRenderer::new(config);
        let objects = scene();
        let frame_size = 200;

        let mut engine = PossessionEngine::new(30.0);
        let far = engine.update_frame(&objects, frame_size, frame_size);
        let mut unassigned = RgbImage::new(frame_size, frame_size);
        renderer.render(&mut unassigned, &objects, &far, &engine.tally());

        let mut close_engine = PossessionEngine::new(100.0);
        let near = close_engine.update_frame(&objects, frame_size, frame_size);
        assert_eq!(near.team(), Some(Team::Team1));
        let mut assigned = RgbImage::new(frame_size, frame_size);
        renderer.render(&mut assigned, &objects, &near, &close_engine.tally());

        // The midpoint between ball (100,100) and Team1 player (60,100) is on the line.
        assert_eq!(unassigned.get_pixel(80, 100).0, [0, 0, 0]);
        assert_eq!(assigned.get_pixel(80, 100).0, line_color);
    }

    #[test]
    fn percentages_are_printed_in_team_colors() {
        let config = RenderConfig::default();
        let palette = config.palette.clone();
        let renderer = FrameRenderer::new(config);
        let mut frame = RgbImage::new(400, 200);
        let tally = PossessionTally { team1: 1, team2: 1 };
        renderer.render(&mut frame, &ClassifiedFrame::default(), &PossessionDecision::NoBall, &tally);

        assert!(count_color(&frame, palette.team1) > 0);
        assert!(count_color(&frame, palette.team2) > 0);
        assert_eq!(count_color(&frame, palette.ball), 0);
    }
}
