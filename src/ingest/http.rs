//! HTTP network camera.
//!
//! This module provides `HttpCamera` for cameras that expose frames over HTTP:
//! - `multipart/x-mixed-replace` MJPEG streams, read continuously
//! - plain JPEG snapshot endpoints, fetched once per grab
//!
//! Acquisition performs the initial request. 401/403 responses are treated as
//! a refused permission; connection failures as an unavailable device. The
//! open stream is the device handle and is closed when dropped. Acquiring again
//! takes the camera from the stream that holds it.

use std::io::Read;
use std::time::{Duration, Instant};

use super::{
    decode_dims, CameraProvider, CameraStream, CaptureError, CapturedFrame, DeviceLease, LeaseSlot,
};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// HTTP camera provider.
pub struct HttpCamera {
    url: String,
    agent: ureq::Agent,
    lease: LeaseSlot,
}

impl HttpCamera {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        Self {
            url: url.to_string(),
            agent,
            lease: LeaseSlot::default(),
        }
    }

    /// Streams currently holding the camera (0 or 1).
    pub fn open_streams(&self) -> usize {
        self.lease.open()
    }
}

impl CameraProvider for HttpCamera {
    fn describe(&self) -> String {
        format!("{} (http)", self.url)
    }

    fn acquire(&self) -> Result<Box<dyn CameraStream>, CaptureError> {
        let response = open(&self.agent, &self.url)?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        let mode = if content_type.contains("multipart") {
            log::info!("HttpCamera: streaming MJPEG from {}", self.url);
            HttpMode::Mjpeg(MjpegStream::new(response.into_reader()))
        } else {
            log::info!("HttpCamera: polling snapshots from {}", self.url);
            HttpMode::Snapshot
        };
        let (lease, preempted) = self.lease.grant();
        if preempted {
            log::info!("HttpCamera: {} taken over from the previous session", self.url);
        }
        Ok(Box::new(HttpCameraStream {
            url: self.url.clone(),
            agent: self.agent.clone(),
            mode,
            lease,
            connected_at: Instant::now(),
            frame_count: 0,
        }))
    }
}

enum HttpMode {
    Mjpeg(MjpegStream),
    Snapshot,
}

struct HttpCameraStream {
    url: String,
    agent: ureq::Agent,
    mode: HttpMode,
    lease: DeviceLease,
    connected_at: Instant,
    frame_count: u64,
}

impl CameraStream for HttpCameraStream {
    fn name(&self) -> &str {
        &self.url
    }

    fn grab(&mut self) -> Result<Option<CapturedFrame>, CaptureError> {
        if self.lease.is_revoked() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{}: taken over by another session",
                self.url
            )));
        }
        let jpeg = match &mut self.mode {
            HttpMode::Mjpeg(stream) => stream.read_next_jpeg()?,
            HttpMode::Snapshot => fetch_snapshot(&self.agent, &self.url)?,
        };
        let (dims, content_type) = decode_dims(&jpeg)?;
        self.frame_count += 1;
        log::trace!(
            "HttpCamera: frame {} ({}) {}s after connect",
            self.frame_count,
            dims,
            self.connected_at.elapsed().as_secs()
        );
        Ok(Some(CapturedFrame::new(jpeg, dims, content_type)))
    }
}

impl Drop for HttpCameraStream {
    fn drop(&mut self) {
        log::info!(
            "HttpCamera: released {} after {} frames",
            self.url,
            self.frame_count
        );
    }
}

fn open(agent: &ureq::Agent, url: &str) -> Result<ureq::Response, CaptureError> {
    match agent.get(url).call() {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(code @ (401 | 403), _)) => Err(CaptureError::PermissionDenied(
            format!("{} answered HTTP {}", url, code),
        )),
        Err(ureq::Error::Status(code, _)) => Err(CaptureError::DeviceUnavailable(format!(
            "{} answered HTTP {}",
            url, code
        ))),
        Err(ureq::Error::Transport(transport)) => Err(CaptureError::DeviceUnavailable(format!(
            "{}: {}",
            url, transport
        ))),
    }
}

fn fetch_snapshot(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>, CaptureError> {
    let response = open(agent, url)?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .map_err(|e| CaptureError::DeviceUnavailable(format!("read snapshot: {}", e)))?;
    if bytes.is_empty() {
        return Err(CaptureError::Decode("empty snapshot".to_string()));
    }
    Ok(bytes)
}

struct MjpegStream {
    reader: Box<dyn Read + Send + Sync>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send + Sync>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>, CaptureError> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self
                .reader
                .read(&mut chunk)
                .map_err(|e| CaptureError::DeviceUnavailable(format!("read mjpeg chunk: {}", e)))?;
            if read == 0 {
                return Err(CaptureError::DeviceUnavailable(
                    "mjpeg stream ended".to_string(),
                ));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

/// Locate the first complete JPEG (SOI `FFD8` .. EOI `FFD9`) in `buffer`.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}
