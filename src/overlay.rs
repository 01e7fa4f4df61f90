//! Overlay projection.
//!
//! Boxes arrive in source-pixel coordinates. `project` turns them into
//! percentages of the source frame, which hold for any rendered size of that
//! frame; `OverlayRect::place` converts to pixels once a concrete rendered
//! size is known. A zero source dimension makes projection undefined and the
//! box is skipped.

use image::{Rgb, RgbImage};

use crate::detect::{BoxCoords, DetectionResult, MaskClass, SourceDims};

const BOX_THICKNESS: u32 = 3;

/// Shown in place of the detection list when a result has no boxes.
pub const NO_FACES: &str = "No faces detected in this image.";

/// Box position as percentages of the rendered element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayRect {
    pub left_pct: f32,
    pub top_pct: f32,
    pub width_pct: f32,
    pub height_pct: f32,
}

/// On-screen size of the displayed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderedDims {
    pub width: u32,
    pub height: u32,
}

impl RenderedDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl OverlayRect {
    pub fn place(&self, rendered: RenderedDims) -> PixelRect {
        let w = rendered.width as f32;
        let h = rendered.height as f32;
        PixelRect {
            left: self.left_pct / 100.0 * w,
            top: self.top_pct / 100.0 * h,
            width: self.width_pct / 100.0 * w,
            height: self.height_pct / 100.0 * h,
        }
    }
}

/// Project one box. `None` when `source` has a zero dimension.
pub fn project(bbox: &BoxCoords, source: SourceDims) -> Option<OverlayRect> {
    if !source.is_valid() {
        return None;
    }
    let sw = source.width as f32;
    let sh = source.height as f32;
    Some(OverlayRect {
        left_pct: bbox.x1() / sw * 100.0,
        top_pct: bbox.y1() / sh * 100.0,
        width_pct: bbox.width() / sw * 100.0,
        height_pct: bbox.height() / sh * 100.0,
    })
}

/// A projected, labelled box ready to draw.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayBox {
    pub class: MaskClass,
    pub label: String,
    pub rect: OverlayRect,
}

/// Project every box of `result` against that result's own source dims.
pub fn overlay_boxes(result: &DetectionResult) -> Vec<OverlayBox> {
    let source = result.source();
    result
        .boxes()
        .iter()
        .filter_map(|b| {
            project(b.bbox(), source).map(|rect| OverlayBox {
                class: b.class(),
                label: b.label(),
                rect,
            })
        })
        .collect()
}

/// Text listing of a result: one line per box with its class, confidence,
/// source-pixel box rounded to whole pixels and overlay placement.
pub fn render_detections(result: &DetectionResult) -> String {
    if result.is_empty() {
        return NO_FACES.to_string();
    }
    let source = result.source();
    let lines: Vec<String> = result
        .boxes()
        .iter()
        .map(|b| {
            let [x1, y1, x2, y2] = b.bbox().to_array().map(|v| v.round() as i64);
            let mut line = format!(
                "{:<22} {:>5.1}%  [{}, {}, {}, {}]",
                b.class().display_name(),
                b.confidence() * 100.0,
                x1,
                y1,
                x2,
                y2
            );
            if let Some(rect) = project(b.bbox(), source) {
                line.push_str(&format!(
                    "  left={:.2}% top={:.2}% width={:.2}% height={:.2}%",
                    rect.left_pct, rect.top_pct, rect.width_pct, rect.height_pct
                ));
            }
            line
        })
        .collect();
    lines.join("\n")
}

pub fn class_color(class: MaskClass) -> Rgb<u8> {
    match class {
        MaskClass::WithMask => Rgb([16, 185, 129]),
        MaskClass::MaskIncorrect => Rgb([245, 158, 11]),
        MaskClass::WithoutMask => Rgb([244, 63, 94]),
    }
}

/// Draw `result`'s boxes onto `image`, scaled to the image's own size.
///
/// Returns the number of boxes drawn.
pub fn annotate(image: &mut RgbImage, result: &DetectionResult) -> usize {
    let rendered = RenderedDims::new(image.width(), image.height());
    let mut drawn = 0;
    for overlay in overlay_boxes(result) {
        let px = overlay.rect.place(rendered);
        draw_rect(
            image,
            [px.left, px.top, px.left + px.width, px.top + px.height],
            class_color(overlay.class),
            BOX_THICKNESS,
        );
        drawn += 1;
    }
    drawn
}

fn draw_rect(img: &mut RgbImage, bbox: [f32; 4], color: Rgb<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32) as u32 };
    let x0 = clamp(bbox[0], w);
    let y0 = clamp(bbox[1], h);
    let x1 = clamp(bbox[2], w);
    let y1 = clamp(bbox[3], h);
    for t in 0..thickness {
        let xx0 = x0 + t;
        let yy0 = y0 + t;
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}
