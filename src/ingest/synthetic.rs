//! Synthetic camera (`stub://`) for tests and demos.
//!
//! Query parameters shape the simulated device:
//! - `size=WxH`: frame size (default 640x480)
//! - `warmup=N`: the first N grabs report a 0x0 frame (device not ready)
//! - `renegotiate=N`: swap width and height every N frames
//! - `fail_after=N`: the device disappears after N frames
//! - `deny=1`: acquisition fails with `PermissionDenied`
//! - `unavailable=1`: acquisition fails with `DeviceUnavailable`
//!
//! The camera is exclusive: a new acquisition takes the device from the open
//! stream, which fails on its next grab.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

use url::Url;

use super::{CameraProvider, CameraStream, CaptureError, CapturedFrame, DeviceLease, LeaseSlot};
use crate::detect::SourceDims;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

/// Configuration for a synthetic camera.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub warmup_frames: u64,
    pub renegotiate_every: Option<u64>,
    pub fail_after: Option<u64>,
    pub deny: bool,
    pub unavailable: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "stub://webcam".to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            warmup_frames: 0,
            renegotiate_every: None,
            fail_after: None,
            deny: false,
            unavailable: false,
        }
    }
}

/// Synthetic camera provider.
pub struct SyntheticCamera {
    config: SyntheticConfig,
    lease: LeaseSlot,
    acquisitions: AtomicUsize,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            lease: LeaseSlot::default(),
            acquisitions: AtomicUsize::new(0),
        }
    }

    pub fn from_url(url: &Url) -> Result<Self, CaptureError> {
        let mut config = SyntheticConfig {
            name: format!("stub://{}", url.host_str().unwrap_or("webcam")),
            ..SyntheticConfig::default()
        };
        for (key, value) in url.query_pairs() {
            let bad = || CaptureError::UnsupportedUrl(url.to_string());
            match key.as_ref() {
                "size" => {
                    let (w, h) = value.split_once('x').ok_or_else(bad)?;
                    config.width = w.parse().map_err(|_| bad())?;
                    config.height = h.parse().map_err(|_| bad())?;
                }
                "warmup" => config.warmup_frames = value.parse().map_err(|_| bad())?,
                "renegotiate" => config.renegotiate_every = Some(value.parse().map_err(|_| bad())?),
                "fail_after" => config.fail_after = Some(value.parse().map_err(|_| bad())?),
                "deny" => config.deny = value == "1" || value == "true",
                "unavailable" => config.unavailable = value == "1" || value == "true",
                other => {
                    log::warn!("SyntheticCamera: ignoring unknown parameter '{}'", other);
                }
            }
        }
        Ok(Self::new(config))
    }

    /// Number of streams currently holding the device.
    pub fn open_handles(&self) -> usize {
        self.lease.open()
    }

    /// Number of successful acquisitions so far.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

impl CameraProvider for SyntheticCamera {
    fn describe(&self) -> String {
        format!(
            "{} ({}x{}, synthetic)",
            self.config.name, self.config.width, self.config.height
        )
    }

    fn acquire(&self) -> Result<Box<dyn CameraStream>, CaptureError> {
        if self.config.deny {
            return Err(CaptureError::PermissionDenied(format!(
                "{}: access refused by user",
                self.config.name
            )));
        }
        if self.config.unavailable {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{}: no such device",
                self.config.name
            )));
        }
        let (lease, preempted) = self.lease.grant();
        if preempted {
            log::info!(
                "SyntheticCamera: {} taken over from the previous session",
                self.config.name
            );
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        log::info!("SyntheticCamera: acquired {}", self.config.name);
        Ok(Box::new(SyntheticStream {
            config: self.config.clone(),
            lease,
            frame_count: 0,
            scene_state: 0,
        }))
    }
}

struct SyntheticStream {
    config: SyntheticConfig,
    lease: DeviceLease,
    frame_count: u64,
    /// Simulated scene state, changes every 50 frames.
    scene_state: u8,
}

impl SyntheticStream {
    fn current_dims(&self) -> SourceDims {
        let swapped = self
            .config
            .renegotiate_every
            .filter(|every| *every > 0)
            .map(|every| (self.frame_count / every) % 2 == 1)
            .unwrap_or(false);
        if swapped {
            SourceDims::new(self.config.height, self.config.width)
        } else {
            SourceDims::new(self.config.width, self.config.height)
        }
    }

    fn render(&mut self, dims: SourceDims) -> Result<Vec<u8>, CaptureError> {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let shift = self.frame_count as u32 + self.scene_state as u32;
        let img = image::RgbImage::from_fn(dims.width, dims.height, |x, y| {
            let v = ((x + y + shift) % 256) as u8;
            image::Rgb([v, v.wrapping_mul(3), 255 - v])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Jpeg)
            .map_err(|e| CaptureError::Decode(format!("synthetic jpeg encode: {}", e)))?;
        Ok(out.into_inner())
    }
}

impl CameraStream for SyntheticStream {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn grab(&mut self) -> Result<Option<CapturedFrame>, CaptureError> {
        if self.lease.is_revoked() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{}: taken over by another session",
                self.config.name
            )));
        }
        if let Some(limit) = self.config.fail_after {
            if self.frame_count >= limit {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "{}: device disconnected",
                    self.config.name
                )));
            }
        }
        self.frame_count += 1;
        if self.frame_count <= self.config.warmup_frames {
            return Ok(Some(CapturedFrame::new(
                Vec::new(),
                SourceDims::default(),
                "image/jpeg",
            )));
        }
        let dims = self.current_dims();
        let bytes = self.render(dims)?;
        Ok(Some(CapturedFrame::new(bytes, dims, "image/jpeg")))
    }
}
