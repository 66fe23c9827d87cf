//
// viewer_workflows.rs
// Dicom-Viewer-rs
//
// Integration-style tests driving a viewer session over synthetic DICOM files: loading, windowing, frame navigation, annotations, and snapshot export.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::PathBuf;
use std::sync::Arc;

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use dicom_viewer::annotation::AnnotationKind;
use dicom_viewer::config::ViewerConfig;
use dicom_viewer::decoder::{decode_bytes, DicomDecoder};
use dicom_viewer::export::{self, RenderOptions, ShapeSpec};
use dicom_viewer::interaction::{InputEvent, Key};
use dicom_viewer::metadata;
use dicom_viewer::models::StatusKind;
use dicom_viewer::render::Point;
use dicom_viewer::storage::ResourceStore;
use dicom_viewer::ViewerSession;
use tempfile::{tempdir, TempDir};

/// Writes a 2x2 8-bit Secondary Capture instance. Frame `f` holds the value `f * 10` everywhere,
/// except frame 0 which carries the gradient `0, 64, 128, 255`.
fn build_test_dicom(frames: u32) -> (TempDir, PathBuf) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("sample.dcm");

    let mut obj = InMemDicomObject::new_empty_with_dict(StandardDataDictionary);
    obj.put(DataElement::new(
        Tag(0x0010, 0x0010),
        VR::PN,
        PrimitiveValue::from("Test^Patient"),
    ));
    obj.put(DataElement::new(
        Tag(0x0010, 0x0020),
        VR::LO,
        PrimitiveValue::from("PAT123"),
    ));
    obj.put(DataElement::new(
        Tag(0x0008, 0x0060),
        VR::CS,
        PrimitiveValue::from("OT"),
    ));
    obj.put(DataElement::new(
        Tag(0x0008, 0x0020),
        VR::DA,
        PrimitiveValue::from("20240101"),
    ));
    obj.put(DataElement::new(
        Tag(0x0008, 0x0016),
        VR::UI,
        PrimitiveValue::from("1.2.840.10008.5.1.4.1.1.7"),
    ));
    obj.put(DataElement::new(
        Tag(0x0008, 0x0018),
        VR::UI,
        PrimitiveValue::from("1.2.826.0.1.3680043.2.1125.1"),
    ));

    obj.put(DataElement::new(
        Tag(0x0028, 0x0010),
        VR::US,
        PrimitiveValue::from(2_u16),
    )); // Rows
    obj.put(DataElement::new(
        Tag(0x0028, 0x0011),
        VR::US,
        PrimitiveValue::from(2_u16),
    )); // Columns
    obj.put(DataElement::new(
        Tag(0x0028, 0x0002),
        VR::US,
        PrimitiveValue::from(1_u16),
    )); // Samples per pixel
    obj.put(DataElement::new(
        Tag(0x0028, 0x0100),
        VR::US,
        PrimitiveValue::from(8_u16),
    )); // Bits Allocated
    obj.put(DataElement::new(
        Tag(0x0028, 0x0101),
        VR::US,
        PrimitiveValue::from(8_u16),
    )); // Bits Stored
    obj.put(DataElement::new(
        Tag(0x0028, 0x0102),
        VR::US,
        PrimitiveValue::from(7_u16),
    )); // High Bit
    obj.put(DataElement::new(
        Tag(0x0028, 0x0103),
        VR::US,
        PrimitiveValue::from(0_u16),
    )); // Pixel Representation
    obj.put(DataElement::new(
        Tag(0x0028, 0x0004),
        VR::CS,
        PrimitiveValue::from("MONOCHROME2"),
    ));
    obj.put(DataElement::new(
        Tag(0x0028, 0x0008),
        VR::IS,
        PrimitiveValue::from(frames.to_string()),
    )); // Number of Frames
    obj.put(DataElement::new(
        Tag(0x0028, 0x1052),
        VR::DS,
        PrimitiveValue::from("-1024"),
    )); // Rescale Intercept
    obj.put(DataElement::new(
        Tag(0x0028, 0x1053),
        VR::DS,
        PrimitiveValue::from("2"),
    )); // Rescale Slope
    obj.put(DataElement::new(
        Tag(0x0028, 0x1050),
        VR::DS,
        PrimitiveValue::from("50"),
    )); // Window Center
    obj.put(DataElement::new(
        Tag(0x0028, 0x1051),
        VR::DS,
        PrimitiveValue::from("150"),
    )); // Window Width

    let mut pixels = vec![0_u8, 64, 128, 255];
    for frame in 1..frames {
        pixels.extend(std::iter::repeat((frame * 10) as u8).take(4));
    }
    obj.put(DataElement::new(
        Tag(0x7fe0, 0x0010),
        VR::OB,
        PrimitiveValue::from(pixels),
    ));

    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
        .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7")
        .media_storage_sop_instance_uid("1.2.826.0.1.3680043.2.1125.1")
        .build()
        .expect("meta");

    let mut file_obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
    for elem in obj {
        file_obj.put(elem);
    }
    file_obj.write_to_file(&path).expect("write test dicom");

    (dir, path)
}

fn new_session() -> ViewerSession {
    let decoder = Arc::new(DicomDecoder::new(ResourceStore::new()));
    ViewerSession::new(ViewerConfig::default(), decoder)
}

#[test]
fn decoding_applies_rescale_and_reads_window_tags() {
    let (_dir, path) = build_test_dicom(1);
    let bytes = std::fs::read(&path).expect("read");

    let image = decode_bytes("dicomfile:sample", &bytes, 0).expect("decode");
    assert_eq!((image.rows, image.columns), (2, 2));
    assert_eq!(image.frame_count, 1);
    assert!(!image.is_multi_frame());
    assert_eq!(image.pixel_range(), (-1024.0, -514.0));
    assert_eq!(image.window_seed(), (150.0, 50.0));
    assert_eq!(image.metadata.get("Modality").map(String::as_str), Some("OT"));

    assert!(decode_bytes("dicomfile:sample", &bytes, 1).is_err());
}

#[tokio::test]
async fn local_file_loads_into_session() {
    let (_dir, path) = build_test_dicom(1);
    let bytes = std::fs::read(&path).expect("read");

    let mut session = new_session();
    assert!(session.load_file(Some("sample.dcm"), bytes).await);
    assert_eq!(session.status().kind, StatusKind::Ready);
    assert!(!session.is_loading());

    let viewport = session.viewport().expect("viewport");
    // 2x2 pixels on a 512x512 surface: the fit is capped by the scale ceiling.
    assert_eq!(viewport.scale, 10.0);
    assert_eq!(viewport.window_width, 150.0);
    assert_eq!(viewport.window_center, 50.0);

    let info = session.info().expect("info");
    assert_eq!(info.patient_name, "Test^Patient");
    assert_eq!(info.patient_id, "PAT123");
    assert_eq!(info.study_date, "20240101");
    assert_eq!(info.modality, "OT");
    assert_eq!(info.dimensions, "2 x 2");
    assert_eq!(info.frame, "1 / 1");
}

#[tokio::test]
async fn corrupt_file_reports_failure() {
    let mut session = new_session();
    assert!(!session.load_file(Some("broken.dcm"), b"not a dicom file".to_vec()).await);
    assert_eq!(session.status().kind, StatusKind::Failed);
    assert!(session.status().message.contains("not a valid DICOM image"));
    assert!(session.image().is_none());
}

#[tokio::test]
async fn multi_frame_file_navigates_with_keys() {
    let (_dir, path) = build_test_dicom(3);
    let bytes = std::fs::read(&path).expect("read");

    let mut session = new_session();
    let _attachment = session.attach();
    assert!(session.load_file(Some("cine.dcm"), bytes).await);
    assert_eq!(session.navigator().frame_count(), 3);

    session.set_draw_mode(Some(AnnotationKind::Circle));
    session.dispatch(&InputEvent::PointerDown { x: 100.0, y: 100.0 }).await;
    session.dispatch(&InputEvent::PointerUp { x: 160.0, y: 100.0 }).await;
    session.set_draw_mode(None);
    assert_eq!(session.layer().annotations().len(), 1);

    session.dispatch(&InputEvent::Key { key: Key::End }).await;
    let image = session.image().expect("image");
    assert_eq!(image.frame_index, 2);
    assert_eq!(image.pixels[[0, 0]], 20.0 * 2.0 - 1024.0);
    assert!(session.layer().annotations().is_empty());

    session.dispatch(&InputEvent::Key { key: Key::ArrowLeft }).await;
    assert_eq!(session.navigator().current_frame(), 1);
    assert_eq!(session.info().expect("info").frame, "2 / 3");

    assert!(!session.go_to_frame(3).await);
    assert_eq!(session.navigator().current_frame(), 1);
}

#[tokio::test]
async fn snapshot_export_writes_png() {
    let (dir, path) = build_test_dicom(1);
    let source = path.to_string_lossy().to_string();
    let config = ViewerConfig::default();

    let plain = RenderOptions {
        invert: true,
        ..RenderOptions::default()
    };
    let (filename, png) = export::render(&source, &plain, &config).await.expect("render");
    assert_eq!(filename, "dicom-snapshot.png");
    assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));

    let annotated = RenderOptions {
        shapes: vec![ShapeSpec {
            kind: AnnotationKind::Rectangle,
            start: Point::new(10.0, 10.0),
            end: Point::new(50.0, 80.0),
        }],
        ..RenderOptions::default()
    };
    let output = dir.path().join("out.png");
    let written = export::render_to_file(&source, Some(output.clone()), &annotated, &config)
        .await
        .expect("render to file");
    assert_eq!(written, output);
    let bytes = std::fs::read(&output).expect("read png");
    let decoded = image::load_from_memory(&bytes).expect("decode png");
    assert_eq!((decoded.width(), decoded.height()), (512, 512));

    let out_of_range = RenderOptions {
        frame: Some(4),
        ..RenderOptions::default()
    };
    assert!(export::render(&source, &out_of_range, &config).await.is_err());
}

#[tokio::test]
async fn image_info_reads_from_disk() {
    let (_dir, path) = build_test_dicom(2);
    let info = metadata::read_image_info(&path.to_string_lossy(), &ViewerConfig::default())
        .await
        .expect("info");
    assert_eq!(info.patient_id, "PAT123");
    assert_eq!(info.frame, "1 / 2");
    assert_eq!(info.window_width, 150);

    let missing = metadata::read_image_info("/nonexistent/scan.dcm", &ViewerConfig::default()).await;
    assert!(missing.is_err());
}
