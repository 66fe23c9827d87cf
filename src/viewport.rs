//
// viewport.rs
// Dicom-Viewer-rs
//
// Display transform for the active frame: scale, translation, inversion, windowing, and frame index.
//
// Thales Matheus Mendonça Santos - November 2025

use serde::{Deserialize, Serialize};

use crate::decoder::DecodedImage;

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation {
    pub x: f64,
    pub y: f64,
}

/// Which half of the window/level pair an adjustment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowAdjust {
    Width,
    Center,
}

/// Inclusive bounds for the zoom factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLimits {
    pub min: f64,
    pub max: f64,
}

impl Default for ScaleLimits {
    fn default() -> Self {
        Self {
            min: MIN_SCALE,
            max: MAX_SCALE,
        }
    }
}

impl ScaleLimits {
    pub fn clamp(&self, scale: f64) -> f64 {
        if scale.is_nan() {
            return self.min;
        }
        scale.clamp(self.min, self.max)
    }
}

/// How a decoded image is rendered. Only exists while an image is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportModel {
    pub scale: f64,
    pub translation: Translation,
    pub invert: bool,
    pub window_width: f64,
    pub window_center: f64,
    pub current_frame: u32,
    #[serde(skip)]
    limits: ScaleLimits,
}

impl ViewportModel {
    /// Fit-to-window state for `image` on a surface of `surface_width` x `surface_height`.
    pub fn fit(image: &DecodedImage, surface_width: u32, surface_height: u32, limits: ScaleLimits) -> Self {
        let mut model = Self {
            scale: 1.0,
            translation: Translation::default(),
            invert: false,
            window_width: 1.0,
            window_center: 0.0,
            current_frame: 0,
            limits,
        };
        model.reset(image, surface_width, surface_height);
        model
    }

    /// Re-initializes every field to the fit-to-window default for `image`.
    pub fn reset(&mut self, image: &DecodedImage, surface_width: u32, surface_height: u32) {
        let fit_x = f64::from(surface_width) / f64::from(image.columns.max(1));
        let fit_y = f64::from(surface_height) / f64::from(image.rows.max(1));
        let (width, center) = image.window_seed();

        self.scale = self.limits.clamp(fit_x.min(fit_y));
        self.translation = Translation::default();
        self.invert = false;
        self.window_width = width.max(1.0);
        self.window_center = center;
        self.current_frame = 0;
    }

    pub fn limits(&self) -> ScaleLimits {
        self.limits
    }

    pub fn zoom(&mut self, factor: f64) {
        self.scale = self.limits.clamp(self.scale * factor);
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.translation.x += dx;
        self.translation.y += dy;
    }

    pub fn adjust_window(&mut self, kind: WindowAdjust, delta: f64) {
        match kind {
            WindowAdjust::Width => self.window_width = (self.window_width + delta).max(1.0),
            WindowAdjust::Center => self.window_center += delta,
        }
    }

    pub fn set_window(&mut self, width: f64, center: f64) {
        self.window_width = width.max(1.0);
        self.window_center = center;
    }

    pub fn toggle_invert(&mut self) {
        self.invert = !self.invert;
    }
}
