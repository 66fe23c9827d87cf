//
// metadata.rs
// Dicom-Viewer-rs
//
// Image information panel: loads a source through a viewer session and prints patient, study, and display fields.
//
// Thales Matheus Mendonça Santos - November 2025

use anyhow::{Context, Result};

use crate::config::ViewerConfig;
use crate::export::open_session;
use crate::models::ImageInfo;

pub async fn read_image_info(source: &str, config: &ViewerConfig) -> Result<ImageInfo> {
    let session = open_session(source, config).await?;
    session.info().context("Image loaded but no information is available")
}

pub async fn print_info(source: &str, config: &ViewerConfig, json: bool) -> Result<()> {
    let info = read_image_info(source, config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", "=".repeat(80));
    println!("DICOM Image Information: {}", source);
    println!("{}", "=".repeat(80));

    println!("PATIENT");
    println!("  Name: {}", info.patient_name);
    println!("  ID:   {}", info.patient_id);

    println!("\nSTUDY");
    println!("  Date: {}", info.study_date);

    println!("\nIMAGE");
    println!("  Modality:      {}", info.modality);
    println!("  Dimensions:    {}", info.dimensions);
    println!("  Frame:         {}", info.frame);
    println!("  Window Width:  {}", info.window_width);
    println!("  Window Center: {}", info.window_center);
    if let Some((row, col)) = info.pixel_spacing {
        println!("  Pixel Spacing: {:.3} x {:.3} mm", row, col);
    }

    Ok(())
}
