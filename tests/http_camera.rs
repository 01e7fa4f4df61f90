//! HTTP network camera against a local fake endpoint.

mod common;

use std::time::Duration;

use faceguard::detect::SourceDims;
use faceguard::ingest::{CameraProvider, CameraStream, CaptureError, HttpCamera};

use common::{closed_port, encode, fake_service, Reply};

fn camera(base: &str) -> HttpCamera {
    HttpCamera::new(&format!("{}/snapshot.jpg", base), Duration::from_secs(5))
}

fn acquire_err(camera: &HttpCamera) -> CaptureError {
    match camera.acquire() {
        Ok(_) => panic!("acquire should fail"),
        Err(err) => err,
    }
}

fn mjpeg_body(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Vec::new();
    for jpeg in frames {
        body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(jpeg);
        body.extend_from_slice(b"\r\n");
    }
    body
}

#[test]
fn refused_camera_is_permission_denied() {
    let (base, rx, server) = fake_service(vec![
        Reply::json(403, r#"{"detail": "forbidden"}"#),
        Reply::json(401, r#"{"detail": "login required"}"#),
    ]);
    let cam = camera(&base);

    match acquire_err(&cam) {
        CaptureError::PermissionDenied(message) => assert!(message.contains("403")),
        other => panic!("expected permission denied, got {:?}", other),
    }
    assert!(matches!(acquire_err(&cam), CaptureError::PermissionDenied(_)));
    assert_eq!(cam.open_streams(), 0);
    assert_eq!(
        rx.recv().unwrap().request_line,
        "GET /snapshot.jpg HTTP/1.1"
    );
    server.join().unwrap();
}

#[test]
fn unreachable_or_failing_camera_is_unavailable() {
    let cam = camera(&closed_port());
    assert!(matches!(acquire_err(&cam), CaptureError::DeviceUnavailable(_)));

    let (base, _rx, server) = fake_service(vec![Reply::json(500, "{}")]);
    let cam = camera(&base);
    match acquire_err(&cam) {
        CaptureError::DeviceUnavailable(message) => assert!(message.contains("500")),
        other => panic!("expected unavailable, got {:?}", other),
    }
    assert_eq!(cam.open_streams(), 0);
    server.join().unwrap();
}

#[test]
fn snapshot_frames_report_decoded_dims() {
    let (base, rx, server) = fake_service(vec![
        Reply::bytes(200, "image/png", encode(40, 30, image::ImageFormat::Png)),
        Reply::bytes(200, "image/png", encode(40, 30, image::ImageFormat::Png)),
        Reply::bytes(200, "image/jpeg", encode(16, 48, image::ImageFormat::Jpeg)),
    ]);
    let cam = camera(&base);
    let mut stream = cam.acquire().unwrap();
    assert_eq!(cam.open_streams(), 1);

    let frame = stream.grab().unwrap().unwrap();
    assert_eq!(frame.dims(), SourceDims::new(40, 30));
    assert_eq!(frame.content_type(), "image/png");

    // Each grab is a fresh request; dims follow whatever the camera sends.
    let frame = stream.grab().unwrap().unwrap();
    assert_eq!(frame.dims(), SourceDims::new(16, 48));
    assert_eq!(frame.content_type(), "image/jpeg");

    assert_eq!(rx.try_iter().count(), 3);
    drop(stream);
    assert_eq!(cam.open_streams(), 0);
    server.join().unwrap();
}

#[test]
fn multipart_response_is_read_as_mjpeg() {
    let frames = vec![
        encode(64, 48, image::ImageFormat::Jpeg),
        encode(48, 64, image::ImageFormat::Jpeg),
    ];
    let (base, _rx, server) = fake_service(vec![Reply::bytes(
        200,
        "multipart/x-mixed-replace; boundary=frame",
        mjpeg_body(&frames),
    )]);
    let cam = camera(&base);
    let mut stream = cam.acquire().unwrap();

    let first = stream.grab().unwrap().unwrap();
    assert_eq!(first.dims(), SourceDims::new(64, 48));
    assert_eq!(first.bytes(), frames[0].as_slice());
    let second = stream.grab().unwrap().unwrap();
    assert_eq!(second.dims(), SourceDims::new(48, 64));

    // One connection serves every frame; when it ends the device is gone.
    assert!(matches!(
        stream.grab(),
        Err(CaptureError::DeviceUnavailable(_))
    ));
    server.join().unwrap();
}

#[test]
fn second_acquire_takes_the_camera() {
    let (base, _rx, server) = fake_service(vec![
        Reply::bytes(200, "image/png", encode(8, 8, image::ImageFormat::Png)),
        Reply::bytes(200, "image/png", encode(8, 8, image::ImageFormat::Png)),
        Reply::bytes(200, "image/png", encode(8, 8, image::ImageFormat::Png)),
    ]);
    let cam = camera(&base);
    let mut first: Box<dyn CameraStream> = cam.acquire().unwrap();
    let mut second = cam.acquire().unwrap();
    assert_eq!(cam.open_streams(), 1);

    match first.grab() {
        Err(CaptureError::DeviceUnavailable(message)) => assert!(message.contains("taken over")),
        other => panic!("expected takeover, got {:?}", other.map(|f| f.is_some())),
    }
    assert!(second.grab().unwrap().is_some());

    drop(first);
    assert_eq!(cam.open_streams(), 1);
    drop(second);
    assert_eq!(cam.open_streams(), 0);
    server.join().unwrap();
}
