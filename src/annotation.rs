//
// annotation.rs
// Dicom-Viewer-rs
//
// Rectangle/circle annotations over the render surface: draft lifecycle, ordered commits, overlay rendering, and flattening.
//
// Thales Matheus Mendonça Santos - November 2025

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

use crate::render::Point;

const COMMITTED_COLOR: Rgba<u8> = Rgba([255, 215, 0, 255]);
const DRAFT_COLOR: Rgba<u8> = Rgba([0, 200, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Rectangle,
    Circle,
}

/// A shape defined by the drag that created it, in surface coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u64,
    pub kind: AnnotationKind,
    pub start: Point,
    pub end: Point,
}

impl Annotation {
    pub fn extent(&self) -> (f64, f64) {
        ((self.end.x - self.start.x).abs(), (self.end.y - self.start.y).abs())
    }

    /// True when the drag exceeds `min_size` in at least one axis.
    pub fn exceeds(&self, min_size: f64) -> bool {
        let (dx, dy) = self.extent();
        dx > min_size || dy > min_size
    }

    /// Top-left corner plus width/height of the drag rectangle.
    pub fn bounds(&self) -> (Point, f64, f64) {
        let (dx, dy) = self.extent();
        let origin = Point::new(self.start.x.min(self.end.x), self.start.y.min(self.end.y));
        (origin, dx, dy)
    }

    /// Centre and radius; radius is half the larger extent.
    pub fn circle(&self) -> (Point, f64) {
        let (dx, dy) = self.extent();
        let center = Point::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        );
        (center, dx.max(dy) / 2.0)
    }
}

/// Committed annotations in display order plus at most one in-flight draft.
#[derive(Debug, Clone, Default)]
pub struct AnnotationLayer {
    annotations: Vec<Annotation>,
    draft: Option<Annotation>,
    next_id: u64,
}

impl AnnotationLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn draft(&self) -> Option<&Annotation> {
        self.draft.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.draft.is_none()
    }

    /// Starts a draft anchored at `at`, replacing any previous draft.
    pub fn begin_draft(&mut self, kind: AnnotationKind, at: Point) -> u64 {
        let id = self.allocate_id();
        self.draft = Some(Annotation {
            id,
            kind,
            start: at,
            end: at,
        });
        id
    }

    pub fn update_draft(&mut self, end: Point) {
        if let Some(draft) = self.draft.as_mut() {
            draft.end = end;
        }
    }

    /// Ends the draft at `end`; it is committed only if it exceeds `min_size`.
    pub fn finish_draft(&mut self, end: Point, min_size: f64) -> Option<u64> {
        let mut draft = self.draft.take()?;
        draft.end = end;
        if !draft.exceeds(min_size) {
            return None;
        }
        let id = draft.id;
        self.annotations.push(draft);
        Some(id)
    }

    pub fn cancel_draft(&mut self) -> Option<Annotation> {
        self.draft.take()
    }

    /// Appends on top of every existing annotation.
    pub fn commit(&mut self, mut annotation: Annotation) -> u64 {
        if self.annotations.iter().any(|a| a.id == annotation.id) {
            annotation.id = self.allocate_id();
        } else {
            self.next_id = self.next_id.max(annotation.id + 1);
        }
        let id = annotation.id;
        self.annotations.push(annotation);
        id
    }

    pub fn clear(&mut self) {
        self.annotations.clear();
        self.draft = None;
    }

    /// Committed shapes plus the draft on top, drawn over a copy of `base`.
    pub fn overlay(&self, base: &RgbaImage) -> RgbaImage {
        let mut canvas = base.clone();
        render(&mut canvas, &self.annotations, self.draft.as_ref());
        canvas
    }

    /// Committed shapes only, for static snapshots.
    pub fn flatten(&self, base: &RgbaImage) -> RgbaImage {
        let mut canvas = base.clone();
        render(&mut canvas, &self.annotations, None);
        canvas
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Draws `annotations` in order, then `draft` last.
pub fn render(canvas: &mut RgbaImage, annotations: &[Annotation], draft: Option<&Annotation>) {
    for annotation in annotations {
        draw_shape(canvas, annotation, COMMITTED_COLOR);
    }
    if let Some(draft) = draft {
        draw_shape(canvas, draft, DRAFT_COLOR);
    }
}

fn draw_shape(canvas: &mut RgbaImage, annotation: &Annotation, color: Rgba<u8>) {
    match annotation.kind {
        AnnotationKind::Rectangle => {
            let (origin, width, height) = annotation.bounds();
            if let Some(rect) = clip_rect(canvas, origin, width, height) {
                draw_hollow_rect_mut(canvas, rect, color);
            }
        }
        AnnotationKind::Circle => {
            let (center, radius) = annotation.circle();
            draw_circle(canvas, center, radius, color);
        }
    }
}

/// Rectangle outline limited to the canvas. Edges off the canvas are moved one pixel past it, so
/// they stay invisible and every coordinate fits in `i32`. `None` when nothing would be visible.
fn clip_rect(canvas: &RgbaImage, origin: Point, width: f64, height: f64) -> Option<Rect> {
    let (w, h) = (f64::from(canvas.width()), f64::from(canvas.height()));
    let left = origin.x.round();
    let top = origin.y.round();
    let right = left + width.round().max(1.0) - 1.0;
    let bottom = top + height.round().max(1.0) - 1.0;
    if ![left, top, right, bottom].iter().all(|v| v.is_finite()) {
        return None;
    }
    if right < 0.0 || bottom < 0.0 || left >= w || top >= h {
        return None;
    }

    let (left, top) = (left.max(-1.0), top.max(-1.0));
    let (right, bottom) = (right.min(w), bottom.min(h));
    Some(
        Rect::at(left as i32, top as i32)
            .of_size((right - left + 1.0) as u32, (bottom - top + 1.0) as u32),
    )
}

fn draw_circle(canvas: &mut RgbaImage, center: Point, radius: f64, color: Rgba<u8>) {
    let (w, h) = (f64::from(canvas.width()), f64::from(canvas.height()));
    let radius = radius.round().max(1.0);
    if !center.x.is_finite() || !center.y.is_finite() || !radius.is_finite() {
        return;
    }

    // Skip outlines that miss the canvas or enclose it entirely.
    let (max_x, max_y) = (w - 1.0, h - 1.0);
    let near_x = (-center.x).max(center.x - max_x).max(0.0);
    let near_y = (-center.y).max(center.y - max_y).max(0.0);
    let far_x = center.x.abs().max((center.x - max_x).abs());
    let far_y = center.y.abs().max((center.y - max_y).abs());
    if near_x.hypot(near_y) > radius + 1.0 || far_x.hypot(far_y) + 1.0 < radius {
        return;
    }

    if radius <= 2.0 * (w + h) {
        draw_hollow_circle_mut(
            canvas,
            (center.x.round() as i32, center.y.round() as i32),
            radius as i32,
            color,
        );
        return;
    }

    // Huge radii: only a nearly straight arc crosses the canvas, so test each pixel instead of
    // walking the whole circumference.
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let distance = (f64::from(x) - center.x).hypot(f64::from(y) - center.y);
        if (distance - radius).abs() <= 0.5 {
            *pixel = color;
        }
    }
}
