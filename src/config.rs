//
// config.rs
// Dicom-Viewer-rs
//
// Viewer tunables: surface size, wheel/button zoom factors, window step, annotation threshold, and scale bounds.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::render::MAX_SURFACE_DIM;

/// Settings shared by every component of a viewer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub surface_width: u32,
    pub surface_height: u32,
    /// Factor applied for a wheel step towards the user (zoom in).
    pub zoom_in_factor: f64,
    /// Factor applied for a wheel step away from the user (zoom out).
    pub zoom_out_factor: f64,
    /// When false, `delta_y > 0` zooms out; when true the convention is flipped.
    pub invert_wheel: bool,
    pub button_zoom_in: f64,
    pub button_zoom_out: f64,
    pub window_step: f64,
    /// Drafts whose extent does not exceed this in either axis are discarded.
    pub min_annotation_size: f64,
    pub min_scale: f64,
    pub max_scale: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            surface_width: 512,
            surface_height: 512,
            zoom_in_factor: 1.1,
            zoom_out_factor: 0.9,
            invert_wheel: false,
            button_zoom_in: 1.2,
            button_zoom_out: 0.8,
            window_step: 10.0,
            min_annotation_size: 5.0,
            min_scale: 0.1,
            max_scale: 10.0,
        }
    }
}

impl ViewerConfig {
    /// Reads a JSON config file; missing fields fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: ViewerConfig =
            serde_json::from_str(&text).context("Failed to parse viewer config")?;
        Ok(config.sanitized())
    }

    /// Repairs values that would break viewport invariants.
    pub fn sanitized(mut self) -> Self {
        let defaults = ViewerConfig::default();
        if !(self.min_scale > 0.0) {
            self.min_scale = defaults.min_scale;
        }
        if !(self.max_scale >= self.min_scale) {
            self.max_scale = self.min_scale.max(defaults.max_scale);
        }
        self.surface_width = self.surface_width.clamp(1, MAX_SURFACE_DIM);
        self.surface_height = self.surface_height.clamp(1, MAX_SURFACE_DIM);
        if !(self.min_annotation_size >= 0.0) {
            self.min_annotation_size = defaults.min_annotation_size;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("viewer.json");
        std::fs::write(&path, r#"{ "surface_width": 800, "invert_wheel": true }"#).expect("write");

        let config = ViewerConfig::from_file(&path).expect("config");
        assert_eq!(config.surface_width, 800);
        assert_eq!(config.surface_height, 512);
        assert!(config.invert_wheel);
        assert_eq!(config.min_annotation_size, 5.0);
    }

    #[test]
    fn sanitize_repairs_scale_bounds() {
        let config = ViewerConfig {
            min_scale: -1.0,
            max_scale: 0.0,
            surface_width: 0,
            surface_height: u32::MAX,
            ..ViewerConfig::default()
        }
        .sanitized();
        assert_eq!(config.min_scale, 0.1);
        assert_eq!(config.max_scale, 10.0);
        assert_eq!(config.surface_width, 1);
        assert_eq!(config.surface_height, MAX_SURFACE_DIM);
    }
}
