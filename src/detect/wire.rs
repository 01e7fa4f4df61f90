//! Detection service JSON payloads.
//!
//! `/detect/` and `/history/` both return scan records of the form
//! `{ "id": 12, "filename": "...", "detections_data": [...], "created_at": "..." }`.

use serde::Deserialize;

use super::{DetectionBox, InvalidDetection, MaskClass, ScanId};

/// One scan record as returned by the service.
#[derive(Debug, Deserialize)]
pub(crate) struct WireScanRecord {
    /// Record id; `0` for results that were not stored.
    pub id: u64,

    /// Stored upload name (generated server-side).
    #[serde(default)]
    pub filename: Option<String>,

    /// Detections in service order.
    #[serde(default)]
    pub detections_data: Vec<WireDetection>,

    /// Creation timestamp, kept as the service formats it.
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireDetection {
    pub class: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum WireError {
    #[error("unknown detection class '{0}'")]
    UnknownClass(String),
    #[error(transparent)]
    Invalid(#[from] InvalidDetection),
}

impl WireScanRecord {
    pub fn scan_id(&self) -> ScanId {
        ScanId(self.id)
    }

    /// Validate and convert the detections, preserving order.
    pub fn boxes(&self) -> Result<Vec<DetectionBox>, WireError> {
        self.detections_data
            .iter()
            .map(WireDetection::to_box)
            .collect()
    }
}

impl WireDetection {
    fn to_box(&self) -> Result<DetectionBox, WireError> {
        let class = MaskClass::from_wire(&self.class)
            .ok_or_else(|| WireError::UnknownClass(self.class.clone()))?;
        Ok(DetectionBox::new(class, self.confidence, self.bbox)?)
    }
}
