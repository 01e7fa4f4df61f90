//! Selected image -> scan -> store -> overlay.

use std::io::Cursor;
use std::sync::Arc;

use faceguard::client::{InferenceClient, InferenceFailure, SubmitOptions};
use faceguard::detect::{DetectionBox, DetectionResult, MaskClass, ScanId};
use faceguard::ingest::CapturedFrame;
use faceguard::overlay::{annotate, class_color, overlay_boxes, RenderedDims};
use faceguard::scan::Scanner;
use faceguard::store::SharedDetectionStore;

struct OneFace;

impl InferenceClient for OneFace {
    fn submit(
        &self,
        frame: &CapturedFrame,
        options: SubmitOptions,
    ) -> Result<DetectionResult, InferenceFailure> {
        assert!(options.persist);
        let boxes = vec![DetectionBox::new(
            MaskClass::WithoutMask,
            0.87,
            [50.0, 50.0, 150.0, 150.0],
        )
        .map_err(|e| InferenceFailure::InvalidResponse(e.to_string()))?];
        DetectionResult::new(ScanId(1), boxes, frame.dims())
            .map_err(|e| InferenceFailure::InvalidResponse(e.to_string()))
    }
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 200, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

#[test]
fn uploaded_image_overlay_matches_source_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entrance.jpg");
    std::fs::write(&path, jpeg(800, 600)).unwrap();

    let scanner = Scanner::new(Arc::new(OneFace), SharedDetectionStore::new());
    let image = scanner.select(&path).unwrap();
    let result = scanner.scan(&image).unwrap();

    let displayed = scanner.store().current().unwrap();
    assert_eq!(displayed.id(), result.id());
    assert_eq!(scanner.store().current_source_dims(), Some(image.dims()));

    let overlays = overlay_boxes(&displayed);
    assert_eq!(overlays.len(), 1);
    let rect = overlays[0].rect;
    assert_eq!(overlays[0].label, "without mask (87%)");
    assert!((rect.left_pct - 6.25).abs() < 0.01);
    assert!((rect.top_pct - 8.33).abs() < 0.01);
    assert!((rect.width_pct - 12.5).abs() < 0.01);
    assert!((rect.height_pct - 16.67).abs() < 0.01);

    // Same proportions at any on-screen size.
    let shown = rect.place(RenderedDims::new(400, 300));
    assert!((shown.left - 25.0).abs() < 0.05);
    assert!((shown.width - 50.0).abs() < 0.05);

    let mut rgb = image.to_rgb().unwrap();
    assert_eq!(annotate(&mut rgb, &displayed), 1);
    assert_eq!(*rgb.get_pixel(51, 51), class_color(MaskClass::WithoutMask));
    let out = dir.path().join("annotated.png");
    rgb.save(&out).unwrap();
    assert!(out.exists());
}

#[test]
fn selecting_a_new_image_clears_previous_boxes() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.jpg");
    let second = dir.path().join("second.jpg");
    std::fs::write(&first, jpeg(640, 480)).unwrap();
    std::fs::write(&second, jpeg(320, 240)).unwrap();

    let scanner = Scanner::new(Arc::new(OneFace), SharedDetectionStore::new());
    let image = scanner.select(&first).unwrap();
    scanner.scan(&image).unwrap();
    assert!(scanner.store().current().is_some());

    let next = scanner.select(&second).unwrap();
    assert!(scanner.store().current().is_none());
    assert_eq!(next.dims().width, 320);
}
