//
// models.rs
// Dicom-Viewer-rs
//
// Defines serializable read models for the viewer: image information panel, status line, and full session state.
//
// Thales Matheus Mendonça Santos - November 2025

use serde::{Deserialize, Serialize};

use crate::annotation::{Annotation, AnnotationKind};
use crate::viewport::ViewportModel;

const UNKNOWN: &str = "Unknown";

/// Fields shown in the image information panel; absent tags render as "Unknown".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub patient_name: String,
    pub patient_id: String,
    pub study_date: String,
    pub modality: String,
    pub dimensions: String,
    pub window_width: i64,
    pub window_center: i64,
    pub frame: String,
    pub pixel_spacing: Option<(f64, f64)>,
}

impl ImageInfo {
    pub fn unknown_if_missing(value: Option<&String>) -> String {
        value.cloned().unwrap_or_else(|| UNKNOWN.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Empty,
    Loading,
    Ready,
    Failed,
}

/// User-visible status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerStatus {
    pub kind: StatusKind,
    pub message: String,
}

impl ViewerStatus {
    pub fn empty() -> Self {
        Self::new(StatusKind::Empty, "No image loaded")
    }

    pub fn loading(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Loading, message)
    }

    pub fn ready(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Ready, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Failed, message)
    }

    fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Snapshot of a whole viewer session, suitable for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ViewerState {
    pub status: ViewerStatus,
    pub loading: bool,
    pub image_id: Option<String>,
    pub info: Option<ImageInfo>,
    pub viewport: Option<ViewportModel>,
    pub frame_count: u32,
    pub draw_mode: Option<AnnotationKind>,
    pub annotations: Vec<Annotation>,
    pub draft: Option<Annotation>,
}
