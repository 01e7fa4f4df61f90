//! Scan history feed.
//!
//! History is owned by the detection service; this side only fetches and
//! renders it.

use crate::client::InferenceFailure;
use crate::detect::wire::{WireError, WireScanRecord};
use crate::detect::{DetectionBox, ScanId};

const SUMMARY_LABELS: usize = 3;
pub const EMPTY_HISTORY: &str = "No scan history available yet.";

/// One persisted scan.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub id: ScanId,
    /// Creation time as formatted by the service.
    pub created_at: String,
    pub filename: Option<String>,
    pub boxes: Vec<DetectionBox>,
}

/// Paging window (`skip`, `limit`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryQuery {
    pub skip: u32,
    pub limit: u32,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 100,
        }
    }
}

/// Read-only access to past scans.
pub trait HistoryFeed {
    fn fetch(&self, query: HistoryQuery) -> Result<Vec<HistoryEntry>, InferenceFailure>;
}

impl HistoryEntry {
    pub(crate) fn from_wire(record: WireScanRecord) -> Result<Self, WireError> {
        let boxes = record.boxes()?;
        Ok(Self {
            id: record.scan_id(),
            created_at: record.created_at.unwrap_or_default(),
            filename: record.filename,
            boxes,
        })
    }

    /// First few class names, then `+N more`.
    pub fn summary(&self) -> String {
        if self.boxes.is_empty() {
            return "No detections".to_string();
        }
        let mut parts: Vec<String> = self
            .boxes
            .iter()
            .take(SUMMARY_LABELS)
            .map(|b| b.class().display_name().to_string())
            .collect();
        if self.boxes.len() > SUMMARY_LABELS {
            parts.push(format!("+{} more", self.boxes.len() - SUMMARY_LABELS));
        }
        parts.join(", ")
    }

    pub fn filename_or_unknown(&self) -> &str {
        self.filename.as_deref().unwrap_or("Unknown")
    }
}

/// Render entries as table rows, one per line.
pub fn render_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return EMPTY_HISTORY.to_string();
    }
    entries
        .iter()
        .map(|entry| {
            format!(
                "{:<8} {:<26} {:<48} {}",
                entry.id.to_string(),
                entry.created_at,
                entry.summary(),
                entry.filename_or_unknown()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::MaskClass;

    fn entry(classes: &[MaskClass]) -> HistoryEntry {
        HistoryEntry {
            id: ScanId(4),
            created_at: "2026-10-17T09:30:00".to_string(),
            filename: None,
            boxes: classes
                .iter()
                .map(|c| DetectionBox::new(*c, 0.9, [0.0, 0.0, 10.0, 10.0]).unwrap())
                .collect(),
        }
    }

    #[test]
    fn summary_truncates_after_three() {
        let e = entry(&[
            MaskClass::WithMask,
            MaskClass::WithoutMask,
            MaskClass::MaskIncorrect,
            MaskClass::WithMask,
            MaskClass::WithMask,
        ]);
        assert_eq!(
            e.summary(),
            "with mask, without mask, mask weared incorrect, +2 more"
        );
        assert_eq!(entry(&[]).summary(), "No detections");
    }

    #[test]
    fn renders_empty_feed_and_unknown_filename() {
        assert_eq!(render_history(&[]), EMPTY_HISTORY);
        let rendered = render_history(&[entry(&[MaskClass::WithMask])]);
        assert!(rendered.contains("#4"));
        assert!(rendered.ends_with("Unknown"));
    }

    #[test]
    fn converts_wire_record() {
        let record: WireScanRecord = serde_json::from_str(
            r#"{"id": 12, "filename": "a.jpg", "created_at": "2026-10-17T10:00:00",
                "detections_data": [{"class": "without_mask", "confidence": 0.5, "box": [1, 2, 3, 4]}]}"#,
        )
        .unwrap();
        let entry = HistoryEntry::from_wire(record).unwrap();
        assert_eq!(entry.id, ScanId(12));
        assert_eq!(entry.filename.as_deref(), Some("a.jpg"));
        assert_eq!(entry.boxes[0].class(), MaskClass::WithoutMask);
    }
}
