//
// interaction.rs
// Dicom-Viewer-rs
//
// Finite-state controller turning pointer, wheel, and keyboard input into viewport mutations, annotation edits, or frame steps.
//
// Thales Matheus Mendonça Santos - November 2025

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotation::{AnnotationKind, AnnotationLayer};
use crate::config::ViewerConfig;
use crate::render::Point;
use crate::viewport::ViewportModel;

/// Raw input as delivered by the host. Pointer positions are page coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    PointerDown { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    Wheel { delta_y: f64 },
    Key { key: Key },
}

impl InputEvent {
    pub fn class(&self) -> InteractionClass {
        match self {
            InputEvent::Key { .. } => InteractionClass::Keyboard,
            _ => InteractionClass::Pointer,
        }
    }

    /// Page position for pointer events.
    pub fn position(&self) -> Option<(f64, f64)> {
        match *self {
            InputEvent::PointerDown { x, y }
            | InputEvent::PointerMove { x, y }
            | InputEvent::PointerUp { x, y } => Some((x, y)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    ArrowLeft,
    ArrowUp,
    ArrowRight,
    ArrowDown,
    Home,
    End,
    #[serde(other)]
    Other,
}

/// Groups of listeners that are attached and released together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionClass {
    Pointer,
    Keyboard,
    DragDrop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    Previous,
    Next,
    First,
    Last,
}

impl FrameStep {
    pub fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::ArrowLeft | Key::ArrowUp => Some(FrameStep::Previous),
            Key::ArrowRight | Key::ArrowDown => Some(FrameStep::Next),
            Key::Home => Some(FrameStep::First),
            Key::End => Some(FrameStep::Last),
            Key::Other => None,
        }
    }
}

/// What the host has to do after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not for us; let the host apply its default behaviour.
    Ignored,
    /// Handled (default behaviour must be suppressed) but nothing visible changed.
    Consumed,
    /// Viewport changed: repaint the frame and overlay.
    Repaint,
    /// Only the annotation overlay changed.
    Overlay,
    /// Frame switch requested.
    Navigate(FrameStep),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerState {
    Idle,
    Drawing(AnnotationKind),
    Panning { last: Point },
}

/// Wheel-to-zoom mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelConfig {
    pub zoom_in: f64,
    pub zoom_out: f64,
    /// Flips the default convention (`delta_y > 0` zooms out).
    pub invert: bool,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            zoom_in: 1.1,
            zoom_out: 0.9,
            invert: false,
        }
    }
}

impl WheelConfig {
    /// Zoom factor for a wheel delta; `None` for a zero delta.
    pub fn factor(&self, delta_y: f64) -> Option<f64> {
        if delta_y == 0.0 || delta_y.is_nan() {
            return None;
        }
        let away = (delta_y > 0.0) != self.invert;
        Some(if away { self.zoom_out } else { self.zoom_in })
    }
}

/// Mutable targets an event may touch.
pub struct Targets<'a> {
    pub viewport: Option<&'a mut ViewportModel>,
    pub layer: &'a mut AnnotationLayer,
    pub frame_count: u32,
}

/// Explicit state machine; the draw mode is read at dispatch time.
#[derive(Debug, Clone)]
pub struct InteractionController {
    state: ControllerState,
    draw_mode: Option<AnnotationKind>,
    wheel: WheelConfig,
    min_annotation_size: f64,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(WheelConfig::default(), 5.0)
    }
}

impl InteractionController {
    pub fn new(wheel: WheelConfig, min_annotation_size: f64) -> Self {
        Self {
            state: ControllerState::Idle,
            draw_mode: None,
            wheel,
            min_annotation_size,
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new(
            WheelConfig {
                zoom_in: config.zoom_in_factor,
                zoom_out: config.zoom_out_factor,
                invert: config.invert_wheel,
            },
            config.min_annotation_size,
        )
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn draw_mode(&self) -> Option<AnnotationKind> {
        self.draw_mode
    }

    /// Mode-button semantics: selecting the active mode switches drawing off.
    pub fn toggle_draw_mode(
        &mut self,
        kind: AnnotationKind,
        layer: &mut AnnotationLayer,
    ) -> Option<AnnotationKind> {
        let next = if self.draw_mode == Some(kind) {
            None
        } else {
            Some(kind)
        };
        self.set_draw_mode(next, layer)
    }

    /// Changes the draw mode; an in-progress draft is cancelled, never committed.
    pub fn set_draw_mode(
        &mut self,
        mode: Option<AnnotationKind>,
        layer: &mut AnnotationLayer,
    ) -> Option<AnnotationKind> {
        if let ControllerState::Drawing(_) = self.state {
            layer.cancel_draft();
            debug!("draw mode changed mid-gesture, draft cancelled");
        }
        self.state = ControllerState::Idle;
        self.draw_mode = mode;
        mode
    }

    /// Abandons any gesture, e.g. when the displayed image is replaced.
    pub fn cancel(&mut self, layer: &mut AnnotationLayer) {
        if let ControllerState::Drawing(_) = self.state {
            layer.cancel_draft();
        }
        self.state = ControllerState::Idle;
    }

    /// Dispatches one event. `local` is the event position in surface coordinates.
    pub fn handle(&mut self, event: &InputEvent, local: Option<Point>, targets: Targets<'_>) -> Outcome {
        match event {
            InputEvent::PointerDown { .. } => self.pointer_down(local, targets),
            InputEvent::PointerMove { .. } => self.pointer_move(local, targets),
            InputEvent::PointerUp { .. } => self.pointer_up(local, targets),
            InputEvent::Wheel { delta_y } => self.wheel(*delta_y, targets),
            InputEvent::Key { key } => self.key(*key, targets.frame_count),
        }
    }

    fn pointer_down(&mut self, local: Option<Point>, targets: Targets<'_>) -> Outcome {
        let Some(point) = local else {
            return Outcome::Ignored;
        };
        if self.state != ControllerState::Idle || targets.viewport.is_none() {
            return Outcome::Ignored;
        }
        match self.draw_mode {
            Some(kind) => {
                targets.layer.begin_draft(kind, point);
                self.state = ControllerState::Drawing(kind);
                Outcome::Overlay
            }
            None => {
                self.state = ControllerState::Panning { last: point };
                Outcome::Consumed
            }
        }
    }

    fn pointer_move(&mut self, local: Option<Point>, targets: Targets<'_>) -> Outcome {
        let Some(point) = local else {
            return Outcome::Ignored;
        };
        match self.state {
            ControllerState::Idle => Outcome::Ignored,
            ControllerState::Drawing(_) => {
                targets.layer.update_draft(point);
                Outcome::Overlay
            }
            ControllerState::Panning { last } => {
                self.state = ControllerState::Panning { last: point };
                match targets.viewport {
                    Some(viewport) => {
                        viewport.pan(point.x - last.x, point.y - last.y);
                        Outcome::Repaint
                    }
                    None => Outcome::Consumed,
                }
            }
        }
    }

    fn pointer_up(&mut self, local: Option<Point>, targets: Targets<'_>) -> Outcome {
        match self.state {
            ControllerState::Idle => Outcome::Ignored,
            ControllerState::Drawing(_) => {
                self.state = ControllerState::Idle;
                let end = local.or_else(|| targets.layer.draft().map(|d| d.end));
                match end {
                    Some(end) => {
                        if targets.layer.finish_draft(end, self.min_annotation_size).is_none() {
                            debug!("annotation draft below minimum size, discarded");
                        }
                    }
                    None => {
                        targets.layer.cancel_draft();
                    }
                }
                Outcome::Overlay
            }
            ControllerState::Panning { .. } => {
                self.state = ControllerState::Idle;
                Outcome::Consumed
            }
        }
    }

    fn wheel(&mut self, delta_y: f64, targets: Targets<'_>) -> Outcome {
        if self.state != ControllerState::Idle || self.draw_mode.is_some() {
            return Outcome::Ignored;
        }
        let Some(factor) = self.wheel.factor(delta_y) else {
            return Outcome::Consumed;
        };
        match targets.viewport {
            Some(viewport) => {
                viewport.zoom(factor);
                Outcome::Repaint
            }
            None => {
                debug!("zoom ignored: no image loaded");
                Outcome::Consumed
            }
        }
    }

    fn key(&mut self, key: Key, frame_count: u32) -> Outcome {
        if self.state != ControllerState::Idle || frame_count <= 1 {
            return Outcome::Ignored;
        }
        FrameStep::from_key(key).map_or(Outcome::Ignored, Outcome::Navigate)
    }
}
