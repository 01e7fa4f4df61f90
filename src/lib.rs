//! Faceguard: face-mask detection client pipeline.
//!
//! Frames come from a camera (streaming) or a user-selected image (single
//! shot), are sent to a remote detection service, and the returned boxes are
//! projected onto the displayed frame.
//!
//! # Module Structure
//!
//! - `ingest`: capture sources (`stub://` synthetic camera, HTTP MJPEG/snapshot
//!   cameras, still images)
//! - `session`: camera capture session lifecycle
//! - `client`: detection service client (`InferenceClient`)
//! - `detect`: detection results and the service wire format
//! - `store`: sequence-ordered store for the displayed result
//! - `live`: capture loop controller for streaming mode
//! - `scan`: single-shot scans
//! - `overlay`: box projection and annotation
//! - `history`: scan history feed
//! - `config`, `ui`: runtime configuration and terminal progress

pub mod client;
pub mod config;
pub mod detect;
pub mod history;
pub mod ingest;
pub mod live;
pub mod overlay;
pub mod scan;
pub mod session;
pub mod store;
pub mod ui;

pub use client::{HttpInferenceClient, InferenceClient, InferenceFailure, SubmitOptions};
pub use config::FaceguardConfig;
pub use detect::{BoxCoords, DetectionBox, DetectionResult, MaskClass, ScanId, SourceDims};
pub use history::{render_history, HistoryEntry, HistoryFeed, HistoryQuery};
pub use ingest::{
    camera_provider, CameraProvider, CameraStream, CaptureError, CapturedFrame, SelectedImage,
};
pub use live::{LiveConfig, LiveController, LiveEvent, LoopState};
pub use overlay::{
    annotate, overlay_boxes, project, render_detections, OverlayBox, OverlayRect, RenderedDims,
};
pub use scan::{ScanError, Scanner};
pub use session::{CaptureSession, SessionState};
pub use store::{Resolution, SharedDetectionStore};
