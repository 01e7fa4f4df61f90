//! Capture sources.
//!
//! This module provides the two ways a frame enters the pipeline:
//! - Live cameras (`CameraProvider` / `CameraStream`): synthetic `stub://`
//!   cameras for tests and demos, and HTTP snapshot/MJPEG network cameras
//! - User-selected still images (`SelectedImage`)
//!
//! All sources produce `CapturedFrame` instances: encoded image bytes ready for
//! upload, plus the pixel dimensions taken from the decoded media itself.
//!
//! Camera acquisition is modelled on the permission prompt of a media-capture
//! API: `CameraProvider::acquire` either grants an exclusive `CameraStream` or
//! fails with a typed reason. Dropping the stream releases the device. A new
//! grant takes the device away from the previous stream, whose next `grab`
//! fails.

pub mod http;
pub mod still;
pub mod synthetic;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::detect::SourceDims;

pub use self::http::HttpCamera;
pub use self::still::SelectedImage;
pub use self::synthetic::SyntheticCamera;

/// Capture failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported camera url '{0}'; expected stub:// or http(s)://")]
    UnsupportedUrl(String),
}

/// An encoded frame plus the dimensions of its decoded pixels.
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    bytes: Vec<u8>,
    dims: SourceDims,
    content_type: &'static str,
    filename: String,
}

impl CapturedFrame {
    pub fn new(bytes: Vec<u8>, dims: SourceDims, content_type: &'static str) -> Self {
        Self {
            bytes,
            dims,
            content_type,
            filename: "webcam-frame.jpg".to_string(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dims(&self) -> SourceDims {
        self.dims
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

/// An acquired camera. Owns the device until dropped.
pub trait CameraStream: Send {
    /// Device description for logs.
    fn name(&self) -> &str;

    /// Read the current frame.
    ///
    /// `Ok(None)` and frames with a zero dimension both mean "not ready yet";
    /// callers skip them. Errors mean the device is gone.
    fn grab(&mut self) -> Result<Option<CapturedFrame>, CaptureError>;
}

/// Grants camera streams.
pub trait CameraProvider: Send + Sync {
    fn describe(&self) -> String;

    /// Request access to the camera. May block on a permission decision.
    fn acquire(&self) -> Result<Box<dyn CameraStream>, CaptureError>;
}

/// Device ownership for one camera. At most one `DeviceLease` is live.
#[derive(Debug, Default)]
pub(crate) struct LeaseSlot {
    current: Mutex<Option<Arc<AtomicBool>>>,
    open: Arc<AtomicUsize>,
}

impl LeaseSlot {
    /// Grant the device, revoking the current holder first.
    /// Returns the lease and whether a holder was pre-empted.
    pub(crate) fn grant(&self) -> (DeviceLease, bool) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut preempted = false;
        if let Some(previous) = current.take() {
            if !previous.swap(true, Ordering::SeqCst) {
                self.open.fetch_sub(1, Ordering::SeqCst);
                preempted = true;
            }
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        let revoked = Arc::new(AtomicBool::new(false));
        *current = Some(revoked.clone());
        (
            DeviceLease {
                revoked,
                open: self.open.clone(),
            },
            preempted,
        )
    }

    /// Leases currently holding the device (0 or 1).
    pub(crate) fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// Held by a stream; released on drop or when a newer grant revokes it.
#[derive(Debug)]
pub(crate) struct DeviceLease {
    revoked: Arc<AtomicBool>,
    open: Arc<AtomicUsize>,
}

impl DeviceLease {
    pub(crate) fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        // Whoever flips the flag first gives the device back.
        if !self.revoked.swap(true, Ordering::SeqCst) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Build a camera provider from a URL (`stub://...` or `http(s)://...`).
pub fn camera_provider(url: &str, timeout: Duration) -> Result<Arc<dyn CameraProvider>, CaptureError> {
    let parsed = Url::parse(url).map_err(|_| CaptureError::UnsupportedUrl(url.to_string()))?;
    match parsed.scheme() {
        "stub" => Ok(Arc::new(SyntheticCamera::from_url(&parsed)?)),
        "http" | "https" => Ok(Arc::new(HttpCamera::new(url, timeout))),
        _ => Err(CaptureError::UnsupportedUrl(url.to_string())),
    }
}

/// Decode encoded image bytes to learn their real dimensions.
pub(crate) fn decode_dims(bytes: &[u8]) -> Result<(SourceDims, &'static str), CaptureError> {
    if bytes.is_empty() {
        return Err(CaptureError::Decode("empty image".to_string()));
    }
    let format = image::guess_format(bytes).map_err(|e| CaptureError::Decode(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| CaptureError::Decode(e.to_string()))?;
    Ok((
        SourceDims::new(decoded.width(), decoded.height()),
        format.to_mime_type(),
    ))
}
