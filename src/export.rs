//
// export.rs
// Dicom-Viewer-rs
//
// Headless rendering: drives a viewer session from command-line options and writes the resulting snapshot PNG.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::annotation::AnnotationKind;
use crate::config::ViewerConfig;
use crate::decoder::{DicomDecoder, ImageDecoder, URL_SCHEME};
use crate::interaction::InputEvent;
use crate::render::Point;
use crate::session::ViewerSession;
use crate::storage::ResourceStore;

/// A shape to draw, given as the drag that creates it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeSpec {
    pub kind: AnnotationKind,
    pub start: Point,
    pub end: Point,
}

/// Options controlling how the session is adjusted before the snapshot is taken.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub frame: Option<u32>,
    pub zoom: Option<f64>,
    pub pan: Option<(f64, f64)>,
    pub invert: bool,
    /// Explicit `(width, center)`; otherwise the image defaults apply.
    pub window: Option<(f64, f64)>,
    pub shapes: Vec<ShapeSpec>,
    /// Flatten committed annotations into the output.
    pub annotated: bool,
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with(URL_SCHEME) || source.starts_with("http://") || source.starts_with("https://")
}

fn default_decoder() -> Arc<dyn ImageDecoder> {
    Arc::new(DicomDecoder::new(ResourceStore::new()))
}

/// Opens a session over a local path or a URL; fails with the session's status message.
pub async fn open_session(source: &str, config: &ViewerConfig) -> Result<ViewerSession> {
    open_session_with(source, config, default_decoder()).await
}

pub async fn open_session_with(
    source: &str,
    config: &ViewerConfig,
    decoder: Arc<dyn ImageDecoder>,
) -> Result<ViewerSession> {
    let mut session = ViewerSession::new(config.clone(), decoder);

    let loaded = if is_remote(source) {
        session.load_url(source).await
    } else {
        let path = Path::new(source);
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        let name = path.file_name().and_then(|n| n.to_str());
        session.load_file(name, bytes).await
    };

    if !loaded {
        bail!("{}", session.status().message);
    }
    Ok(session)
}

/// Applies `options` to a freshly opened session and returns the snapshot bytes and default filename.
pub async fn render(source: &str, options: &RenderOptions, config: &ViewerConfig) -> Result<(&'static str, Vec<u8>)> {
    render_with(source, options, config, default_decoder()).await
}

pub async fn render_with(
    source: &str,
    options: &RenderOptions,
    config: &ViewerConfig,
    decoder: Arc<dyn ImageDecoder>,
) -> Result<(&'static str, Vec<u8>)> {
    let mut session = open_session_with(source, config, decoder).await?;
    let _attachment = session.attach();

    if let Some(frame) = options.frame {
        let frame_count = session.navigator().frame_count();
        if frame >= frame_count {
            bail!("Requested frame {} but image has {} frame(s)", frame, frame_count);
        }
        session.go_to_frame(i64::from(frame)).await;
        // A failed frame decode leaves the previous pixels in place.
        if session.image().map(|image| image.frame_index) != Some(frame) {
            bail!("Failed to decode frame {} of {}", frame, source);
        }
    }
    if let Some((width, center)) = options.window {
        session.set_window(width, center);
    }
    if options.invert {
        session.toggle_invert();
    }
    if let Some(factor) = options.zoom {
        session.zoom(factor);
    }
    if let Some((dx, dy)) = options.pan {
        session.pan(dx, dy);
    }

    for shape in &options.shapes {
        session.set_draw_mode(Some(shape.kind));
        let (start, end) = (shape.start, shape.end);
        session.dispatch(&InputEvent::PointerDown { x: start.x, y: start.y }).await;
        session.dispatch(&InputEvent::PointerMove { x: end.x, y: end.y }).await;
        session.dispatch(&InputEvent::PointerUp { x: end.x, y: end.y }).await;
    }
    session.set_draw_mode(None);

    let annotated = options.annotated || !options.shapes.is_empty();
    let snapshot = session.snapshot(annotated)?;
    Ok((snapshot.filename, snapshot.png))
}

pub async fn render_to_file(
    source: &str,
    output: Option<PathBuf>,
    options: &RenderOptions,
    config: &ViewerConfig,
) -> Result<PathBuf> {
    let (filename, png) = render(source, options, config).await?;
    let output = output.unwrap_or_else(|| PathBuf::from(filename));
    tokio::fs::write(&output, png)
        .await
        .with_context(|| format!("Failed to save image to {:?}", output))?;
    println!("Image saved to: {:?}", output);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodedImage;
    use crate::error::DecodeError;
    use crate::frames::parse_frame_id;
    use async_trait::async_trait;
    use ndarray::Array2;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    /// Three-frame image whose last frame cannot be decoded.
    struct BrokenLastFrame;

    #[async_trait]
    impl ImageDecoder for BrokenLastFrame {
        fn register_file(&self, name: Option<&str>, _bytes: Vec<u8>) -> String {
            format!("dicomfile:{}", name.unwrap_or("blob"))
        }

        async fn decode(&self, image_id: &str) -> Result<DecodedImage, DecodeError> {
            let (base, frame) = parse_frame_id(image_id)?;
            let frame = frame.unwrap_or(0);
            if frame == 2 {
                return Err(DecodeError::PixelData("truncated frame".into()));
            }
            Ok(DecodedImage {
                image_id: base,
                rows: 4,
                columns: 4,
                frame_count: 3,
                frame_index: frame,
                default_window_width: None,
                default_window_center: None,
                pixel_spacing: None,
                metadata: BTreeMap::new(),
                pixels: Array2::from_elem((4, 4), frame as f32),
            })
        }
    }

    #[tokio::test]
    async fn undecodable_frame_fails_the_export() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cine.dcm");
        std::fs::write(&path, b"stub").expect("write");
        let source = path.to_string_lossy().to_string();
        let config = ViewerConfig::default();

        let decodable = RenderOptions {
            frame: Some(1),
            ..RenderOptions::default()
        };
        let (filename, png) = render_with(&source, &decodable, &config, Arc::new(BrokenLastFrame))
            .await
            .expect("frame 1 renders");
        assert_eq!(filename, "dicom-snapshot.png");
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));

        let broken = RenderOptions {
            frame: Some(2),
            ..RenderOptions::default()
        };
        let err = render_with(&source, &broken, &config, Arc::new(BrokenLastFrame))
            .await
            .expect_err("frame 2 must not fall back to frame 0");
        assert!(err.to_string().contains("frame 2"));
    }
}
