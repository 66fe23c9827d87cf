//
// lib.rs
// Dicom-Viewer-rs
//
// Exposes the viewer components and re-exports the CLI entry point for both binary and library consumers.
//
// Thales Matheus Mendonça Santos - November 2025

// Viewer core: decoder capability, viewport, surface, annotations, interaction, and frames.
pub mod annotation;
pub mod decoder;
pub mod dicom_access;
pub mod frames;
pub mod interaction;
pub mod render;
pub mod session;
pub mod storage;
pub mod viewport;

// Ambient layers: configuration, errors, read models, and the outer surfaces.
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod metadata;
pub mod models;
pub mod web;

pub use cli::{run as run_cli, Cli, Commands};
pub use session::ViewerSession;
