//
// render.rs
// Dicom-Viewer-rs
//
// Render surface: owns the RGBA drawing target, paints windowed frames through the viewport transform, and maps pointer coordinates.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::decoder::DecodedImage;
use crate::error::ViewerResult;
use crate::viewport::ViewportModel;

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Largest accepted surface edge, in pixels.
pub const MAX_SURFACE_DIM: u32 = 8192;

/// A point in surface-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Resolved bounding box of the surface in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceBounds {
    pub left: f64,
    pub top: f64,
    pub width: u32,
    pub height: u32,
}

impl SurfaceBounds {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width,
            height,
        }
        .clamped()
    }

    /// Both edges within `1..=MAX_SURFACE_DIM`.
    pub fn is_valid(&self) -> bool {
        (1..=MAX_SURFACE_DIM).contains(&self.width) && (1..=MAX_SURFACE_DIM).contains(&self.height)
    }

    /// Same bounds with each edge forced into `1..=MAX_SURFACE_DIM`.
    pub fn clamped(self) -> Self {
        Self {
            width: self.width.clamp(1, MAX_SURFACE_DIM),
            height: self.height.clamp(1, MAX_SURFACE_DIM),
            ..self
        }
    }
}

/// Exclusive drawing target of one viewer session.
///
/// An unmounted surface turns every call into a no-op.
#[derive(Debug, Clone, Default)]
pub struct RenderSurface {
    bounds: Option<SurfaceBounds>,
    buffer: Option<RgbaImage>,
}

impl RenderSurface {
    pub fn mounted(bounds: SurfaceBounds) -> Self {
        let mut surface = Self::default();
        surface.mount(bounds);
        surface
    }

    pub fn unmounted() -> Self {
        Self::default()
    }

    pub fn mount(&mut self, bounds: SurfaceBounds) {
        let bounds = bounds.clamped();
        self.buffer = Some(RgbaImage::from_pixel(bounds.width, bounds.height, BACKGROUND));
        self.bounds = Some(bounds);
    }

    /// Releases the drawing target.
    pub fn unmount(&mut self) {
        self.bounds = None;
        self.buffer = None;
    }

    pub fn is_mounted(&self) -> bool {
        self.bounds.is_some()
    }

    pub fn bounds(&self) -> Option<SurfaceBounds> {
        self.bounds
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.bounds.map(|b| (b.width, b.height))
    }

    /// Updates the page position and size (scroll/resize). The buffer is reallocated on size change.
    pub fn set_bounds(&mut self, bounds: SurfaceBounds) {
        if !self.is_mounted() {
            return;
        }
        let bounds = bounds.clamped();
        if self.size() != Some((bounds.width, bounds.height)) {
            self.buffer = Some(RgbaImage::from_pixel(bounds.width, bounds.height, BACKGROUND));
        }
        self.bounds = Some(bounds);
    }

    pub fn pixels(&self) -> Option<&RgbaImage> {
        self.buffer.as_ref()
    }

    /// Paints `image` through `viewport`. Every pixel is rewritten, so repeated calls are idempotent.
    pub fn paint(&mut self, image: &DecodedImage, viewport: &ViewportModel) {
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };
        let (width, height) = buffer.dimensions();
        let transform = Transform::new(image, viewport, width, height);
        let lower = viewport.window_center - viewport.window_width / 2.0;

        for (sx, sy, pixel) in buffer.enumerate_pixels_mut() {
            let (ix, iy) = transform.to_image(f64::from(sx) + 0.5, f64::from(sy) + 0.5);
            let (col, row) = (ix.floor(), iy.floor());
            if col < 0.0 || row < 0.0 || col >= f64::from(image.columns) || row >= f64::from(image.rows)
            {
                *pixel = BACKGROUND;
                continue;
            }
            let value = f64::from(image.pixels[[row as usize, col as usize]]);
            let t = ((value - lower) / viewport.window_width).clamp(0.0, 1.0);
            let mut gray = (t * 255.0).round() as u8;
            if viewport.invert {
                gray = 255 - gray;
            }
            *pixel = Rgba([gray, gray, gray, 255]);
        }
    }

    /// Maps an absolute pointer position to surface-local coordinates using the current bounds.
    pub fn local_coordinates(&self, page_x: f64, page_y: f64) -> Option<Point> {
        let bounds = self.bounds?;
        Some(Point::new(page_x - bounds.left, page_y - bounds.top))
    }

    /// Converts a surface-local point into image pixel space.
    pub fn surface_to_image(
        &self,
        point: Point,
        image: &DecodedImage,
        viewport: &ViewportModel,
    ) -> Option<Point> {
        let (width, height) = self.size()?;
        let (x, y) = Transform::new(image, viewport, width, height).to_image(point.x, point.y);
        Some(Point::new(x, y))
    }
}

pub fn encode_png(buffer: &RgbaImage) -> ViewerResult<Vec<u8>> {
    let mut bytes = Vec::new();
    buffer.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Surface-to-image mapping: the image centre sits at the surface centre shifted by the translation.
struct Transform {
    surface_cx: f64,
    surface_cy: f64,
    image_cx: f64,
    image_cy: f64,
    tx: f64,
    ty: f64,
    scale: f64,
}

impl Transform {
    fn new(image: &DecodedImage, viewport: &ViewportModel, width: u32, height: u32) -> Self {
        Self {
            surface_cx: f64::from(width) / 2.0,
            surface_cy: f64::from(height) / 2.0,
            image_cx: f64::from(image.columns) / 2.0,
            image_cy: f64::from(image.rows) / 2.0,
            tx: viewport.translation.x,
            ty: viewport.translation.y,
            scale: viewport.scale,
        }
    }

    fn to_image(&self, sx: f64, sy: f64) -> (f64, f64) {
        (
            (sx - self.surface_cx - self.tx) / self.scale + self.image_cx,
            (sy - self.surface_cy - self.ty) / self.scale + self.image_cy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::ScaleLimits;
    use ndarray::Array2;
    use std::collections::BTreeMap;

    fn gradient() -> DecodedImage {
        let pixels = Array2::from_shape_vec((2, 2), vec![0.0, 64.0, 128.0, 255.0]).unwrap();
        DecodedImage {
            image_id: "dicomfile:gradient".into(),
            rows: 2,
            columns: 2,
            frame_count: 1,
            frame_index: 0,
            default_window_width: Some(255.0),
            default_window_center: Some(127.5),
            pixel_spacing: None,
            metadata: BTreeMap::new(),
            pixels,
        }
    }

    #[test]
    fn paint_fits_image_and_is_idempotent() {
        let image = gradient();
        let mut surface = RenderSurface::mounted(SurfaceBounds::sized(4, 4));
        let viewport = ViewportModel::fit(&image, 4, 4, ScaleLimits::default());
        assert_eq!(viewport.scale, 2.0);

        surface.paint(&image, &viewport);
        let first = surface.pixels().cloned().expect("buffer");
        surface.paint(&image, &viewport);
        assert_eq!(surface.pixels(), Some(&first));

        assert_eq!(first.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(first.get_pixel(3, 3), &Rgba([255, 255, 255, 255]));
        assert_eq!(first.get_pixel(2, 0), first.get_pixel(3, 1));
    }

    #[test]
    fn invert_flips_polarity() {
        let image = gradient();
        let mut surface = RenderSurface::mounted(SurfaceBounds::sized(2, 2));
        let mut viewport = ViewportModel::fit(&image, 2, 2, ScaleLimits::default());
        viewport.toggle_invert();
        surface.paint(&image, &viewport);
        let pixels = surface.pixels().expect("buffer");
        assert_eq!(pixels.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(pixels.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn pixels_outside_the_image_are_background() {
        let image = gradient();
        let mut surface = RenderSurface::mounted(SurfaceBounds::sized(4, 4));
        let mut viewport = ViewportModel::fit(&image, 4, 4, ScaleLimits::default());
        viewport.pan(2.0, 0.0);
        surface.paint(&image, &viewport);
        assert_eq!(surface.pixels().unwrap().get_pixel(0, 0), &BACKGROUND);
    }

    #[test]
    fn local_coordinates_follow_current_bounds() {
        let mut surface = RenderSurface::mounted(SurfaceBounds {
            left: 100.0,
            top: 50.0,
            width: 10,
            height: 10,
        });
        assert_eq!(surface.local_coordinates(110.0, 70.0), Some(Point::new(10.0, 20.0)));

        surface.set_bounds(SurfaceBounds {
            left: 0.0,
            top: 0.0,
            width: 20,
            height: 10,
        });
        assert_eq!(surface.local_coordinates(110.0, 70.0), Some(Point::new(110.0, 70.0)));
        assert_eq!(surface.pixels().map(|p| p.width()), Some(20));
    }

    #[test]
    fn oversized_bounds_are_capped() {
        let huge = SurfaceBounds {
            left: 0.0,
            top: 0.0,
            width: u32::MAX,
            height: 0,
        };
        assert!(!huge.is_valid());
        let capped = huge.clamped();
        assert_eq!((capped.width, capped.height), (MAX_SURFACE_DIM, 1));
        assert!(capped.is_valid());
        assert_eq!(SurfaceBounds::sized(100_000, 20).width, MAX_SURFACE_DIM);

        let mut surface = RenderSurface::mounted(SurfaceBounds::sized(4, 4));
        surface.set_bounds(SurfaceBounds {
            left: 0.0,
            top: 0.0,
            width: 3,
            height: u32::MAX,
        });
        assert_eq!(surface.size(), Some((3, MAX_SURFACE_DIM)));
    }

    #[test]
    fn unmounted_surface_is_inert() {
        let image = gradient();
        let mut surface = RenderSurface::unmounted();
        let viewport = ViewportModel::fit(&image, 2, 2, ScaleLimits::default());
        surface.paint(&image, &viewport);
        assert!(surface.pixels().is_none());
        assert!(surface.local_coordinates(1.0, 1.0).is_none());
    }

    #[test]
    fn surface_points_map_into_image_space() {
        let image = gradient();
        let surface = RenderSurface::mounted(SurfaceBounds::sized(4, 4));
        let viewport = ViewportModel::fit(&image, 4, 4, ScaleLimits::default());
        let p = surface
            .surface_to_image(Point::new(2.0, 2.0), &image, &viewport)
            .unwrap();
        assert_eq!(p, Point::new(1.0, 1.0));
    }
}
