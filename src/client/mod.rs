//! Detection service client.
//!
//! `InferenceClient` is the seam between the pipeline and the remote face-mask
//! detection service. Failures are always returned as `InferenceFailure`;
//! callers decide whether to surface them (single-shot scans) or drop them
//! (streaming frames).

mod http;

use thiserror::Error;

use crate::detect::DetectionResult;
use crate::ingest::CapturedFrame;

pub use http::HttpInferenceClient;

/// Per-request options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Keep the scan server-side so it appears in history.
    pub persist: bool,
}

impl SubmitOptions {
    /// User-initiated uploads.
    pub fn persisted() -> Self {
        Self { persist: true }
    }

    /// Streaming camera frames.
    pub fn ephemeral() -> Self {
        Self { persist: false }
    }
}

/// Why an inference request produced no result.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum InferenceFailure {
    #[error("network error: {0}")]
    Network(String),
    #[error("detection service returned HTTP {status}: {message}")]
    Service { status: u16, message: String },
    #[error("detection request timed out")]
    Timeout,
    #[error("invalid detection response: {0}")]
    InvalidResponse(String),
    #[error("frame has no pixels ({0}); not submitted")]
    InvalidFrame(String),
}

/// Sends frames to the detection service.
pub trait InferenceClient: Send + Sync {
    /// Run detection on one frame.
    ///
    /// The returned result carries the dimensions of `frame`, so boxes and
    /// dimensions always describe the same image.
    fn submit(
        &self,
        frame: &CapturedFrame,
        options: SubmitOptions,
    ) -> Result<DetectionResult, InferenceFailure>;
}
