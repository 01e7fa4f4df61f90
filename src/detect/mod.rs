//! Detection data model.
//!
//! Types describing what the remote detection service reports for one frame:
//! mask classes, boxes in source-pixel coordinates, and the dimensions of the
//! frame those boxes belong to.

mod result;
pub(crate) mod wire;

pub use result::{
    BoxCoords, DetectionBox, DetectionResult, InvalidDetection, MaskClass, ScanId, SourceDims,
};
