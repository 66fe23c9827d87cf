//
// error.rs
// Dicom-Viewer-rs
//
// Error taxonomy for decoding and viewer operations; all of it is converted to status/log output at session boundaries.
//
// Thales Matheus Mendonça Santos - November 2025

use thiserror::Error;

/// Failures raised by an image decoder while turning an identifier into pixels.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown resource identifier: {0}")]
    UnknownResource(String),
    #[error("malformed frame-qualified identifier: {0}")]
    MalformedIdentifier(String),
    #[error("frame {requested} out of range ({frame_count} frame(s))")]
    FrameOutOfRange { requested: u32, frame_count: u32 },
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("not a valid DICOM stream: {0}")]
    Parse(String),
    #[error("failed to decode pixel data: {0}")]
    PixelData(String),
    #[error("image has no pixels ({rows} x {columns})")]
    EmptyImage { rows: u32, columns: u32 },
}

/// Failures surfaced by viewer-level operations that have a caller-visible outcome.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("No image available to save")]
    NoImage,
    #[error("render surface is not mounted")]
    NotMounted,
    #[error("Decoder not ready")]
    DecoderNotReady,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
}

pub type ViewerResult<T> = Result<T, ViewerError>;
