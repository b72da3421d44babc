//! Backend-agnostic drawing of the selection wheel.
//!
//! The wheel produces a [`Frame`]: a display list of wedges, curved labels
//! and an optional winner glow, all under one rotation transform. Any
//! rendering surface implementing [`WheelCanvas`] can replay it.

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::wheel::SelectionWheel;

/// Fraction of the half-size used as the wheel radius, leaving room for
/// the glow stroke.
const RADIUS_FRACTION: f32 = 0.9;

/// Label distance from the rim, as a fraction of the radius.
const LABEL_OFFSET_FRACTION: f32 = 0.25;

/// Width of the winner glow outline.
pub const GLOW_STROKE_WIDTH: f32 = 30.0;

/// Axis-aligned bounds of a circle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Bounds {
    pub fn around(center: [f32; 2], radius: f32) -> Self {
        Self {
            left: center[0] - radius,
            top: center[1] - radius,
            right: center[0] + radius,
            bottom: center[1] + radius,
        }
    }

    pub fn inset(&self, by: f32) -> Self {
        Self {
            left: self.left + by,
            top: self.top + by,
            right: self.right - by,
            bottom: self.bottom - by,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }
}

/// Geometry derived from the hosting view's size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelLayout {
    pub center: [f32; 2],
    pub radius: f32,
    pub bounds: Bounds,
    /// Radial offset of labels from their arc.
    pub label_offset: f32,
    pub glow_width: f32,
}

impl WheelLayout {
    pub fn from_size(width: f32, height: f32) -> Self {
        let radius = (width.min(height) / 2.0) * RADIUS_FRACTION;
        let center = [width / 2.0, height / 2.0];
        Self {
            center,
            radius,
            bounds: Bounds::around(center, radius),
            label_offset: radius * LABEL_OFFSET_FRACTION,
            glow_width: GLOW_STROKE_WIDTH,
        }
    }
}

/// A single drawing instruction in unrotated wheel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DrawCommand {
    /// Filled pie slice.
    Wedge {
        index: usize,
        bounds: Bounds,
        start_degrees: f32,
        sweep_degrees: f32,
        color: Color,
    },
    /// Text laid along the arc of a segment.
    Label {
        index: usize,
        text: String,
        bounds: Bounds,
        start_degrees: f32,
        sweep_degrees: f32,
        offset: f32,
        color: Color,
    },
    /// Highlight stroke over the winning segment.
    Glow {
        index: usize,
        bounds: Bounds,
        start_degrees: f32,
        sweep_degrees: f32,
        width: f32,
        color: Color,
    },
}

/// Everything needed to draw one frame of the wheel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub center: [f32; 2],
    /// Rotation applied around `center` to every command.
    pub rotation_degrees: f32,
    pub commands: Vec<DrawCommand>,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn wedges(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Wedge { .. }))
    }

    pub fn glow(&self) -> Option<&DrawCommand> {
        self.commands
            .iter()
            .find(|c| matches!(c, DrawCommand::Glow { .. }))
    }

    /// Replays the frame onto a canvas.
    pub fn paint<C: WheelCanvas>(&self, canvas: &mut C) {
        if self.commands.is_empty() {
            return;
        }
        canvas.push_rotation(self.center, self.rotation_degrees);
        for command in &self.commands {
            match command {
                DrawCommand::Wedge {
                    bounds,
                    start_degrees,
                    sweep_degrees,
                    color,
                    ..
                } => canvas.fill_wedge(*bounds, *start_degrees, *sweep_degrees, *color),
                DrawCommand::Label {
                    text,
                    bounds,
                    start_degrees,
                    sweep_degrees,
                    offset,
                    color,
                    ..
                } => canvas.draw_text_on_arc(
                    text,
                    *bounds,
                    *start_degrees,
                    *sweep_degrees,
                    *offset,
                    *color,
                ),
                DrawCommand::Glow {
                    bounds,
                    start_degrees,
                    sweep_degrees,
                    width,
                    color,
                    ..
                } => canvas.stroke_glow(*bounds, *start_degrees, *sweep_degrees, *width, *color),
            }
        }
        canvas.pop_rotation();
    }
}

/// Rendering surface the wheel can draw onto.
pub trait WheelCanvas {
    fn push_rotation(&mut self, center: [f32; 2], degrees: f32);
    fn pop_rotation(&mut self);
    fn fill_wedge(&mut self, bounds: Bounds, start_degrees: f32, sweep_degrees: f32, color: Color);
    fn draw_text_on_arc(
        &mut self,
        text: &str,
        bounds: Bounds,
        start_degrees: f32,
        sweep_degrees: f32,
        offset: f32,
        color: Color,
    );
    fn stroke_glow(
        &mut self,
        bounds: Bounds,
        start_degrees: f32,
        sweep_degrees: f32,
        width: f32,
        color: Color,
    );
}

impl SelectionWheel {
    /// Builds the display list for the current state.
    pub fn render(&self, layout: &WheelLayout) -> Frame {
        let mut commands = Vec::new();

        if let Some(angle) = self.segment_angle() {
            for (index, (text, color)) in self
                .segments()
                .iter()
                .zip(self.segment_colors())
                .enumerate()
            {
                let Some((start, _)) = self.segment_span(index) else {
                    continue;
                };
                commands.push(DrawCommand::Wedge {
                    index,
                    bounds: layout.bounds,
                    start_degrees: start,
                    sweep_degrees: angle,
                    color: *color,
                });
                commands.push(DrawCommand::Label {
                    index,
                    text: text.clone(),
                    bounds: layout.bounds,
                    start_degrees: start,
                    sweep_degrees: angle,
                    offset: layout.label_offset,
                    color: Color::WHITE,
                });
            }

            let winner = self
                .winning_index()
                .and_then(|i| self.segment_span(i).map(|span| (i, span)));
            if let Some((index, (start, sweep))) = winner {
                commands.push(DrawCommand::Glow {
                    index,
                    bounds: layout.bounds.inset(layout.glow_width / 2.0),
                    start_degrees: start,
                    sweep_degrees: sweep,
                    width: layout.glow_width,
                    color: Color::GLOW,
                });
            }
        }

        Frame {
            center: layout.center,
            rotation_degrees: self.rotation(),
            commands,
        }
    }
}
