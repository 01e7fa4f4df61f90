use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Face-mask classes produced by the detection service.
///
/// The wire names are fixed and must round-trip exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaskClass {
    #[serde(rename = "with_mask")]
    WithMask,
    #[serde(rename = "without_mask")]
    WithoutMask,
    #[serde(rename = "mask_weared_incorrect")]
    MaskIncorrect,
}

impl MaskClass {
    pub const ALL: [MaskClass; 3] = [
        MaskClass::WithMask,
        MaskClass::WithoutMask,
        MaskClass::MaskIncorrect,
    ];

    /// Name used by the detection service.
    pub fn wire_name(self) -> &'static str {
        match self {
            MaskClass::WithMask => "with_mask",
            MaskClass::WithoutMask => "without_mask",
            MaskClass::MaskIncorrect => "mask_weared_incorrect",
        }
    }

    /// Human-readable name: the wire name with underscores as spaces.
    pub fn display_name(self) -> &'static str {
        match self {
            MaskClass::WithMask => "with mask",
            MaskClass::WithoutMask => "without mask",
            MaskClass::MaskIncorrect => "mask weared incorrect",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.wire_name() == name)
    }
}

impl std::fmt::Display for MaskClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Rejected detection data.
#[derive(Debug, Error, PartialEq)]
pub enum InvalidDetection {
    #[error("confidence {0} outside [0, 1]")]
    Confidence(f32),
    #[error("box [{x1}, {y1}, {x2}, {y2}] is empty, inverted or not finite")]
    Box { x1: f32, y1: f32, x2: f32, y2: f32 },
    #[error("source dimensions {width}x{height} must both be non-zero")]
    SourceDims { width: u32, height: u32 },
}

/// Axis-aligned box in source-pixel coordinates. Always `x1 < x2`, `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxCoords {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl BoxCoords {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self, InvalidDetection> {
        let finite = [x1, y1, x2, y2].iter().all(|v| v.is_finite());
        if !finite || x1 >= x2 || y1 >= y2 {
            return Err(InvalidDetection::Box { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn x1(&self) -> f32 {
        self.x1
    }

    pub fn y1(&self) -> f32 {
        self.y1
    }

    pub fn x2(&self) -> f32 {
        self.x2
    }

    pub fn y2(&self) -> f32 {
        self.y2
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// One detected face region. Immutable once produced.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionBox {
    class: MaskClass,
    confidence: f32,
    bbox: BoxCoords,
}

impl DetectionBox {
    pub fn new(class: MaskClass, confidence: f32, bbox: [f32; 4]) -> Result<Self, InvalidDetection> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(InvalidDetection::Confidence(confidence));
        }
        let bbox = BoxCoords::new(bbox[0], bbox[1], bbox[2], bbox[3])?;
        Ok(Self {
            class,
            confidence,
            bbox,
        })
    }

    pub fn class(&self) -> MaskClass {
        self.class
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> &BoxCoords {
        &self.bbox
    }

    /// Overlay label, e.g. `without mask (87%)`.
    pub fn label(&self) -> String {
        format!(
            "{} ({}%)",
            self.class.display_name(),
            (self.confidence * 100.0).round() as u32
        )
    }
}

/// Pixel dimensions of a decoded frame or image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceDims {
    pub width: u32,
    pub height: u32,
}

impl SourceDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A frame with a zero dimension is not ready yet.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl std::fmt::Display for SourceDims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Identifier assigned by the detection service. `0` means "not persisted".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(pub u64);

impl ScanId {
    pub const EPHEMERAL: ScanId = ScanId(0);

    pub fn is_persisted(&self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for ScanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Detections for one captured frame, together with that frame's dimensions.
///
/// The boxes and `source` always originate from the same frame: there is no
/// way to swap the dimensions after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    id: ScanId,
    boxes: Vec<DetectionBox>,
    source: SourceDims,
}

impl DetectionResult {
    pub fn new(
        id: ScanId,
        boxes: Vec<DetectionBox>,
        source: SourceDims,
    ) -> Result<Self, InvalidDetection> {
        if !source.is_valid() {
            return Err(InvalidDetection::SourceDims {
                width: source.width,
                height: source.height,
            });
        }
        Ok(Self { id, boxes, source })
    }

    pub fn id(&self) -> ScanId {
        self.id
    }

    /// Boxes in service order.
    pub fn boxes(&self) -> &[DetectionBox] {
        &self.boxes
    }

    pub fn source(&self) -> SourceDims {
        self.source
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}
