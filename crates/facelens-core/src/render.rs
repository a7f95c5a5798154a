//! Draw face boxes and labels onto an image for inspection.
//!
//! Stroke width and font size scale with the image's shorter side so the
//! annotations look the same at any resolution.

use crate::codec;
use crate::error::{FaceError, Result};
use crate::orientation;
use crate::types::FaceBox;
use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

/// Pixels of shorter side per pixel of stroke.
const STROKE_DIVISOR: u32 = 300;
/// Font size in multiples of the stroke width.
const FONT_PER_STROKE: u32 = 10;

const BOX_RGB: [u8; 3] = [255, 0, 0];
/// Luma of pure red (Rec. 601).
const BOX_LUMA: u8 = 76;

/// DejaVu Sans, see `assets/DejaVuSans-LICENSE.txt`.
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Resolution-proportional annotation sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationStyle {
    pub stroke_width: u32,
    pub font_size: u32,
}

impl AnnotationStyle {
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        let stroke_width = width.min(height) / STROKE_DIVISOR;
        Self {
            stroke_width,
            font_size: stroke_width * FONT_PER_STROKE,
        }
    }
}

/// One box and its label, ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub text: String,
    /// Left end of the label's baseline.
    pub text_origin: (i32, i32),
}

/// Label drawn for `face`: the bare label, or label and score in debug mode.
pub fn label_text(face: &FaceBox, debug: bool) -> String {
    if debug {
        format!("{} : {:.3}", face.label, face.score)
    } else {
        face.label.clone()
    }
}

/// Lay out annotations for a `width` × `height` image, in input order.
///
/// Labels sit directly above their box with the baseline half a font size
/// above the top edge.
pub fn plan_annotations(width: u32, height: u32, boxes: &[FaceBox], debug: bool) -> Vec<Annotation> {
    let style = AnnotationStyle::for_dimensions(width, height);
    let lift = (style.font_size / 2) as i32;
    boxes
        .iter()
        .map(|b| Annotation {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
            text: label_text(b, debug),
            text_origin: (b.x, b.y.saturating_sub(lift)),
        })
        .collect()
}

/// Draws [`FaceBox`]es and their labels in red.
///
/// Labels use the bundled DejaVu Sans unless another font is supplied.
#[derive(Clone)]
pub struct BoxRenderer {
    font: Option<FontArc>,
}

impl Default for BoxRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl BoxRenderer {
    pub fn new() -> Self {
        let font = match FontArc::try_from_slice(BUNDLED_FONT) {
            Ok(font) => Some(font),
            Err(e) => {
                tracing::error!(error = %e, "bundled label font unreadable");
                None
            }
        };
        Self { font }
    }

    pub fn with_font(font: FontArc) -> Self {
        Self { font: Some(font) }
    }

    /// Load a TrueType/OpenType font for labels.
    pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| FaceError::Decode(format!("font {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loaded label font");
        Ok(Self::with_font(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw `boxes` onto `image` in place.
    ///
    /// Images that are not 8-bit gray or RGB(A) are converted to 8-bit RGB(A)
    /// first.
    pub fn render(&self, image: &mut DynamicImage, boxes: &[FaceBox], debug: bool) {
        let style = AnnotationStyle::for_dimensions(image.width(), image.height());
        let annotations = plan_annotations(image.width(), image.height(), boxes, debug);

        if self.font.is_none() && style.font_size > 0 && !annotations.is_empty() {
            tracing::warn!(boxes = annotations.len(), "no label font loaded; drawing boxes only");
        }

        self.draw_dynamic(image, style, &annotations);
    }

    fn draw_dynamic(&self, image: &mut DynamicImage, style: AnnotationStyle, annotations: &[Annotation]) {
        match image {
            DynamicImage::ImageRgb8(buf) => self.draw(buf, Rgb(BOX_RGB), style, annotations),
            DynamicImage::ImageRgba8(buf) => {
                let [r, g, b] = BOX_RGB;
                self.draw(buf, Rgba([r, g, b, 255]), style, annotations)
            }
            DynamicImage::ImageLuma8(buf) => self.draw(buf, Luma([BOX_LUMA]), style, annotations),
            DynamicImage::ImageLumaA8(buf) => self.draw(buf, LumaA([BOX_LUMA, 255]), style, annotations),
            other => {
                *other = if other.color().has_alpha() {
                    DynamicImage::ImageRgba8(other.to_rgba8())
                } else {
                    DynamicImage::ImageRgb8(other.to_rgb8())
                };
                self.draw_dynamic(other, style, annotations);
            }
        }
    }

    fn draw<P>(
        &self,
        canvas: &mut ImageBuffer<P, Vec<P::Subpixel>>,
        color: P,
        style: AnnotationStyle,
        annotations: &[Annotation],
    ) where
        P: Pixel<Subpixel = u8> + 'static,
    {
        // A sub-300px image still gets a visible outline.
        let stroke = style.stroke_width.max(1) as i32;
        let inner = -(stroke - 1) / 2;
        let outer = stroke / 2;

        for a in annotations {
            for k in inner..=outer {
                if let Some(rect) = outline_rect(a, k, canvas.width(), canvas.height()) {
                    draw_hollow_rect_mut(canvas, rect, color);
                }
            }

            let Some(font) = self.font.as_ref().filter(|_| style.font_size > 0) else {
                continue;
            };
            let scale = PxScale::from(style.font_size as f32);
            // imageproc positions text by its top edge.
            let ascent = font.as_scaled(scale).ascent().round() as i32;
            let (tx, baseline) = a.text_origin;
            let top = baseline.saturating_sub(ascent);
            let (text_w, _) = text_size(scale, font, &a.text);

            let on_canvas = i64::from(tx) + i64::from(text_w) > 0
                && i64::from(tx) < i64::from(canvas.width())
                && i64::from(top) < i64::from(canvas.height())
                && i64::from(baseline) + i64::from(style.font_size) > 0;
            if on_canvas {
                draw_text_mut(canvas, color, tx, top, scale, font, &a.text);
            }
        }
    }

    /// Load the image at `path` in canonical orientation, draw `boxes`, and
    /// re-encode it in the format named by the file extension.
    pub fn render_file(&self, path: impl AsRef<Path>, boxes: &[FaceBox], debug: bool) -> Result<Vec<u8>> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(FaceError::NullArgument("image path"));
        }
        let format = codec::format_for_path(path)?;
        let mut image = orientation::correct_orientation(path)?;
        self.render(&mut image, boxes, debug);
        codec::encode(&image, format)
    }
}

/// Outline of `a` grown by `k` pixels on each side.
///
/// Edges beyond the canvas are pulled in to one pixel outside it so the
/// rectangle fits `i32` however far the box lies off-image. `None` when the
/// outline is empty or misses the canvas.
fn outline_rect(a: &Annotation, k: i32, canvas_w: u32, canvas_h: u32) -> Option<Rect> {
    let k = i64::from(k);
    let left = i64::from(a.x) - k;
    let top = i64::from(a.y) - k;
    let right = left + i64::from(a.width) + 2 * k - 1;
    let bottom = top + i64::from(a.height) + 2 * k - 1;
    if right < left || bottom < top {
        return None;
    }

    let (w, h) = (i64::from(canvas_w), i64::from(canvas_h));
    if right < 0 || bottom < 0 || left >= w || top >= h {
        return None;
    }
    let (left, top) = (left.max(-1), top.max(-1));
    let (right, bottom) = (right.min(w), bottom.min(h));

    let x = i32::try_from(left).ok()?;
    let y = i32::try_from(top).ok()?;
    let width = u32::try_from(right - left + 1).ok()?;
    let height = u32::try_from(bottom - top + 1).ok()?;
    Some(Rect::at(x, y).of_size(width, height))
}
