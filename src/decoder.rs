//
// decoder.rs
// Dicom-Viewer-rs
//
// The image decoder capability injected into viewer sessions, plus the dicom-rs backed implementation.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;
use std::io::Cursor;

use async_trait::async_trait;
use dicom::core::Tag;
use dicom::object::{from_reader, DefaultDicomObject};
use dicom::pixeldata::PixelDecoder;
use dicom_pixeldata::{ConvertOptions, VoiLutOption};
use ndarray::Array2;
use tracing::{debug, info};

use crate::dicom_access::ElementAccess;
use crate::error::DecodeError;
use crate::frames::{parse_frame_id, resolve_frame_count};
use crate::storage::{ResourceStore, FILE_SCHEME};

/// Scheme prefix for remote resources.
pub const URL_SCHEME: &str = "wadouri:";

const PREAMBLE_LEN: usize = 128;

/// One decoded frame of an image resource. Never mutated once produced.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Identifier the image was decoded from, without frame qualifier.
    pub image_id: String,
    pub rows: u32,
    pub columns: u32,
    pub frame_count: u32,
    pub frame_index: u32,
    pub default_window_width: Option<f64>,
    pub default_window_center: Option<f64>,
    pub pixel_spacing: Option<(f64, f64)>,
    pub metadata: BTreeMap<String, String>,
    /// Modality-rescaled intensities, indexed `[[row, column]]`.
    pub pixels: Array2<f32>,
}

impl DecodedImage {
    pub fn is_multi_frame(&self) -> bool {
        self.frame_count > 1
    }

    /// Observed intensity range of the frame.
    pub fn pixel_range(&self) -> (f32, f32) {
        let min = self.pixels.iter().fold(f32::INFINITY, |a, &b| a.min(b));
        let max = self.pixels.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        if min.is_finite() && max.is_finite() {
            (min, max)
        } else {
            (0.0, 0.0)
        }
    }

    /// Windowing seed: the image's defaults, or the full dynamic range when absent.
    pub fn window_seed(&self) -> (f64, f64) {
        match (self.default_window_width, self.default_window_center) {
            (Some(width), Some(center)) if width > 0.0 => (width, center),
            _ => {
                let (min, max) = self.pixel_range();
                let width = (f64::from(max) - f64::from(min)).max(1.0);
                (width, f64::from(min) + width / 2.0)
            }
        }
    }
}

/// Capability that turns resource identifiers into decoded frames.
///
/// Sessions receive it at construction time and check [`ImageDecoder::is_ready`]
/// before dispatching any decode.
#[async_trait]
pub trait ImageDecoder: Send + Sync {
    fn is_ready(&self) -> bool {
        true
    }

    /// Makes a local blob addressable and returns its stable identifier.
    fn register_file(&self, name: Option<&str>, bytes: Vec<u8>) -> String;

    /// Decodes `image_id`, which may carry a `frame=<index>` query parameter.
    async fn decode(&self, image_id: &str) -> Result<DecodedImage, DecodeError>;
}

/// Prepends the loader scheme when a URL lacks a recognized one.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with(URL_SCHEME) || url.starts_with(FILE_SCHEME) {
        url.to_string()
    } else {
        format!("{}{}", URL_SCHEME, url)
    }
}

/// Decoder backed by dicom-rs, resolving `dicomfile:` ids from a [`ResourceStore`]
/// and `wadouri:` ids over HTTP.
#[derive(Clone)]
pub struct DicomDecoder {
    store: ResourceStore,
    client: reqwest::Client,
}

impl DicomDecoder {
    pub fn new(store: ResourceStore) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, base_id: &str) -> Result<std::sync::Arc<Vec<u8>>, DecodeError> {
        if let Some(bytes) = self.store.get(base_id) {
            return Ok(bytes);
        }
        let url = base_id
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| DecodeError::UnknownResource(base_id.to_string()))?;

        info!(url, "fetching remote DICOM");
        let fetch_err = |reason: String| DecodeError::Fetch {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?
            .error_for_status()
            .map_err(|e| fetch_err(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        // Cache so frame-qualified requests do not hit the network again.
        self.store.insert(base_id, bytes.to_vec());
        self.store
            .get(base_id)
            .ok_or_else(|| DecodeError::UnknownResource(base_id.to_string()))
    }
}

#[async_trait]
impl ImageDecoder for DicomDecoder {
    fn register_file(&self, name: Option<&str>, bytes: Vec<u8>) -> String {
        self.store.register(name, bytes)
    }

    async fn decode(&self, image_id: &str) -> Result<DecodedImage, DecodeError> {
        let (base_id, frame) = parse_frame_id(image_id)?;
        let bytes = self.fetch(&base_id).await?;
        let frame = frame.unwrap_or(0);

        // Pixel decoding is CPU bound; keep it off the async worker.
        let id = base_id.clone();
        tokio::task::spawn_blocking(move || decode_bytes(&id, &bytes, frame))
            .await
            .map_err(|e| DecodeError::PixelData(e.to_string()))?
    }
}

/// Decodes one frame of a DICOM byte stream (with or without the 128-byte preamble).
pub fn decode_bytes(image_id: &str, bytes: &[u8], frame: u32) -> Result<DecodedImage, DecodeError> {
    let body = if bytes.len() >= PREAMBLE_LEN + 4 && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + 4] == b"DICM"
    {
        &bytes[PREAMBLE_LEN..]
    } else {
        bytes
    };
    let obj: DefaultDicomObject =
        from_reader(Cursor::new(body)).map_err(|e| DecodeError::Parse(e.to_string()))?;

    let decoded = obj
        .decode_pixel_data()
        .map_err(|e| DecodeError::PixelData(e.to_string()))?;

    let frame_count = resolve_frame_count(
        obj.element_u32(Tag(0x0028, 0x0008)),
        Some(decoded.number_of_frames()),
    );
    let available = decoded.number_of_frames().max(1);
    if frame >= frame_count || frame >= available {
        return Err(DecodeError::FrameOutOfRange {
            requested: frame,
            frame_count,
        });
    }

    let rows = decoded.rows();
    let columns = decoded.columns();
    if rows == 0 || columns == 0 {
        return Err(DecodeError::EmptyImage { rows, columns });
    }

    // Keep modality rescale, skip VOI: windowing is applied at paint time.
    let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
    let samples = decoded
        .to_ndarray_frame_with_options::<f32>(frame, &options)
        .map_err(|e| DecodeError::PixelData(e.to_string()))?;
    let channels = samples.shape().get(2).copied().unwrap_or(1).max(1);
    let pixels = Array2::from_shape_fn((rows as usize, columns as usize), |(r, c)| {
        // Colour frames are reduced to their mean intensity for grayscale windowing.
        let sum: f32 = (0..channels).map(|s| samples[[r, c, s]]).sum();
        sum / channels as f32
    });

    debug!(image_id, rows, columns, frame, frame_count, "decoded frame");

    Ok(DecodedImage {
        image_id: image_id.to_string(),
        rows,
        columns,
        frame_count,
        frame_index: frame,
        default_window_width: obj.element_f64(Tag(0x0028, 0x1051)),
        default_window_center: obj.element_f64(Tag(0x0028, 0x1050)),
        pixel_spacing: obj.element_f64_pair(Tag(0x0028, 0x0030)),
        metadata: extract_metadata(&obj),
        pixels,
    })
}

fn extract_metadata<T: ElementAccess>(obj: &T) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let tags = [
        ("PatientName", Tag(0x0010, 0x0010)),
        ("PatientID", Tag(0x0010, 0x0020)),
        ("StudyDate", Tag(0x0008, 0x0020)),
        ("Modality", Tag(0x0008, 0x0060)),
        ("StudyDescription", Tag(0x0008, 0x1030)),
        ("SOPInstanceUID", Tag(0x0008, 0x0018)),
    ];
    for (label, tag) in tags {
        if let Some(value) = obj.element_str(tag) {
            map.insert(label.to_string(), value);
        }
    }
    map
}
