//! EXIF orientation correction.
//!
//! Phone cameras store pixels in sensor order and record the intended display
//! rotation in the EXIF `Orientation` tag. Decoders ignore the tag, so images
//! are rotated here into canonical orientation before any geometry runs on them.

use crate::codec;
use crate::error::Result;
use image::{DynamicImage, ImageBuffer, Pixel};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Seek};
use std::path::Path;

/// Rotation that brings an image into canonical orientation, clockwise in
/// image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Resolve an EXIF orientation tag.
    ///
    /// Only the pure rotations are handled: 1 (upright), 6 (90° CW), 3 (180°)
    /// and 8 (270° CW). Mirrored orientations and unknown values are left as is.
    pub fn from_exif(tag: u32) -> Self {
        match tag {
            6 => Rotation::Cw90,
            3 => Rotation::Cw180,
            8 => Rotation::Cw270,
            _ => Rotation::None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    /// Canvas size after rotating a `width` × `height` image.
    pub fn output_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Rotation::Cw90 | Rotation::Cw270 => (height, width),
            Rotation::None | Rotation::Cw180 => (width, height),
        }
    }

    /// Exact rotation matrix for y-down coordinates, row-major.
    fn matrix(self) -> [[i64; 2]; 2] {
        match self {
            Rotation::None => [[1, 0], [0, 1]],
            Rotation::Cw90 => [[0, -1], [1, 0]],
            Rotation::Cw180 => [[-1, 0], [0, -1]],
            Rotation::Cw270 => [[0, 1], [-1, 0]],
        }
    }
}

/// Affine map `translate(new centre) · rotate · translate(-old centre)`.
///
/// Coordinates are doubled so pixel centres and image centres stay integral.
struct CentredRotation {
    matrix: [[i64; 2]; 2],
    old_centre: (i64, i64),
    new_centre: (i64, i64),
    old_size: (u32, u32),
}

impl CentredRotation {
    fn new(rotation: Rotation, width: u32, height: u32) -> Self {
        let (new_w, new_h) = rotation.output_dimensions(width, height);
        Self {
            matrix: rotation.matrix(),
            old_centre: (width as i64, height as i64),
            new_centre: (new_w as i64, new_h as i64),
            old_size: (width, height),
        }
    }

    /// Where the source pixel `(x, y)` lands.
    #[cfg(test)]
    fn forward(&self, x: u32, y: u32) -> (u32, u32) {
        let [[a, b], [c, d]] = self.matrix;
        let rx = 2 * x as i64 + 1 - self.old_centre.0;
        let ry = 2 * y as i64 + 1 - self.old_centre.1;
        let nx = a * rx + b * ry + self.new_centre.0;
        let ny = c * rx + d * ry + self.new_centre.1;
        (((nx - 1) / 2) as u32, ((ny - 1) / 2) as u32)
    }

    /// Source pixel sampled for the destination pixel `(x, y)`.
    ///
    /// Rotation matrices are orthogonal, so the inverse is the transpose.
    fn inverse(&self, x: u32, y: u32) -> (u32, u32) {
        let [[a, b], [c, d]] = self.matrix;
        let rx = 2 * x as i64 + 1 - self.new_centre.0;
        let ry = 2 * y as i64 + 1 - self.new_centre.1;
        let sx = a * rx + c * ry + self.old_centre.0;
        let sy = b * rx + d * ry + self.old_centre.1;
        let max_x = self.old_size.0.saturating_sub(1) as i64;
        let max_y = self.old_size.1.saturating_sub(1) as i64;
        (((sx - 1) / 2).clamp(0, max_x) as u32, ((sy - 1) / 2).clamp(0, max_y) as u32)
    }
}

fn rotate_buffer<P: Pixel>(
    src: &ImageBuffer<P, Vec<P::Subpixel>>,
    rotation: Rotation,
) -> ImageBuffer<P, Vec<P::Subpixel>> {
    let (width, height) = src.dimensions();
    let (new_w, new_h) = rotation.output_dimensions(width, height);
    if width == 0 || height == 0 {
        return ImageBuffer::new(new_w, new_h);
    }
    let transform = CentredRotation::new(rotation, width, height);
    ImageBuffer::from_fn(new_w, new_h, |x, y| {
        let (sx, sy) = transform.inverse(x, y);
        *src.get_pixel(sx, sy)
    })
}

/// Rotate `image` onto a newly allocated canvas. The input is not modified.
pub fn rotate(image: &DynamicImage, rotation: Rotation) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(b) => DynamicImage::ImageLuma8(rotate_buffer(b, rotation)),
        DynamicImage::ImageLumaA8(b) => DynamicImage::ImageLumaA8(rotate_buffer(b, rotation)),
        DynamicImage::ImageRgb8(b) => DynamicImage::ImageRgb8(rotate_buffer(b, rotation)),
        DynamicImage::ImageRgba8(b) => DynamicImage::ImageRgba8(rotate_buffer(b, rotation)),
        DynamicImage::ImageLuma16(b) => DynamicImage::ImageLuma16(rotate_buffer(b, rotation)),
        DynamicImage::ImageLumaA16(b) => DynamicImage::ImageLumaA16(rotate_buffer(b, rotation)),
        DynamicImage::ImageRgb16(b) => DynamicImage::ImageRgb16(rotate_buffer(b, rotation)),
        DynamicImage::ImageRgba16(b) => DynamicImage::ImageRgba16(rotate_buffer(b, rotation)),
        DynamicImage::ImageRgb32F(b) => DynamicImage::ImageRgb32F(rotate_buffer(b, rotation)),
        DynamicImage::ImageRgba32F(b) => DynamicImage::ImageRgba32F(rotate_buffer(b, rotation)),
        other => DynamicImage::ImageRgba8(rotate_buffer(&other.to_rgba8(), rotation)),
    }
}

/// Read the raw EXIF orientation tag of the file at `path`.
///
/// Returns `None` when the file has no EXIF block, no primary IFD or no
/// orientation tag, or cannot be read at all.
pub fn read_orientation(path: &Path) -> Option<u32> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "cannot open for EXIF");
            return None;
        }
    };
    read_orientation_from(&mut BufReader::new(file))
}

fn read_orientation_from<R: BufRead + Seek>(reader: &mut R) -> Option<u32> {
    let exif = match exif::Reader::new().read_from_container(reader) {
        Ok(exif) => exif,
        Err(e) => {
            tracing::debug!(error = %e, "no readable EXIF metadata");
            return None;
        }
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
}

fn apply_orientation(image: DynamicImage, tag: Option<u32>) -> DynamicImage {
    let Some(tag) = tag else {
        return image;
    };
    let rotation = Rotation::from_exif(tag);
    if rotation == Rotation::None {
        if tag != 1 {
            tracing::debug!(tag, "unsupported EXIF orientation, leaving image as is");
        }
        return image;
    }
    tracing::debug!(
        tag,
        degrees = rotation.degrees(),
        width = image.width(),
        height = image.height(),
        "correcting orientation"
    );
    rotate(&image, rotation)
}

/// Load the image at `path` in canonical orientation.
///
/// Fails only when the file cannot be decoded. Missing or unreadable EXIF
/// metadata yields the image exactly as decoded.
pub fn correct_orientation(path: &Path) -> Result<DynamicImage> {
    let image = codec::decode_path(path)?;
    Ok(apply_orientation(image, read_orientation(path)))
}

/// In-memory variant of [`correct_orientation`].
pub fn correct_orientation_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    let image = codec::decode_bytes(bytes)?;
    Ok(apply_orientation(image, read_orientation_from(&mut Cursor::new(bytes))))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::FaceError;
    use image::{ImageFormat, Rgb, RgbImage};

    /// Distinct value per pixel so rotations can be traced.
    fn numbered(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, (x * 16 + y) as u8]))
    }

    /// Splice a minimal EXIF APP1 segment carrying `orientation` right after
    /// the JPEG SOI marker.
    pub(crate) fn jpeg_with_orientation(image: &DynamicImage, orientation: u16) -> Vec<u8> {
        let jpeg = codec::encode(image, ImageFormat::Jpeg).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);

        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"MM\x00\x2A");
        tiff.extend_from_slice(&8u32.to_be_bytes());
        tiff.extend_from_slice(&1u16.to_be_bytes()); // one IFD entry
        tiff.extend_from_slice(&0x0112u16.to_be_bytes()); // Orientation
        tiff.extend_from_slice(&3u16.to_be_bytes()); // SHORT
        tiff.extend_from_slice(&1u32.to_be_bytes());
        tiff.extend_from_slice(&orientation.to_be_bytes());
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&0u32.to_be_bytes()); // no next IFD

        let mut payload = b"Exif\x00\x00".to_vec();
        payload.extend_from_slice(&tiff);

        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn test_from_exif_mapping() {
        assert_eq!(Rotation::from_exif(1), Rotation::None);
        assert_eq!(Rotation::from_exif(6), Rotation::Cw90);
        assert_eq!(Rotation::from_exif(3), Rotation::Cw180);
        assert_eq!(Rotation::from_exif(8), Rotation::Cw270);
        for unsupported in [0, 2, 4, 5, 7, 9, 255] {
            assert_eq!(Rotation::from_exif(unsupported), Rotation::None);
        }
    }

    #[test]
    fn test_rotate_90_moves_top_left_to_top_right() {
        let src = DynamicImage::ImageRgb8(numbered(4, 3));
        let out = rotate(&src, Rotation::Cw90).to_rgb8();
        assert_eq!(out.dimensions(), (3, 4));
        assert_eq!(out.get_pixel(2, 0), numbered(4, 3).get_pixel(0, 0));
        // bottom-left of the source ends up top-left
        assert_eq!(out.get_pixel(0, 0), numbered(4, 3).get_pixel(0, 2));
    }

    #[test]
    fn test_rotate_180() {
        let src_buf = numbered(5, 2);
        let out = rotate(&DynamicImage::ImageRgb8(src_buf.clone()), Rotation::Cw180).to_rgb8();
        assert_eq!(out.dimensions(), (5, 2));
        for (x, y, p) in out.enumerate_pixels() {
            assert_eq!(p, src_buf.get_pixel(4 - x, 1 - y));
        }
    }

    #[test]
    fn test_rotate_270_is_counter_clockwise() {
        let src_buf = numbered(4, 3);
        let out = rotate(&DynamicImage::ImageRgb8(src_buf.clone()), Rotation::Cw270).to_rgb8();
        assert_eq!(out.dimensions(), (3, 4));
        // top-right of the source ends up top-left
        assert_eq!(out.get_pixel(0, 0), src_buf.get_pixel(3, 0));
    }

    #[test]
    fn test_rotate_90_then_270_round_trips() {
        let src = DynamicImage::ImageRgb8(numbered(7, 4));
        let there = rotate(&src, Rotation::Cw90);
        assert_eq!((there.width(), there.height()), (4, 7));
        let back = rotate(&there, Rotation::Cw270);
        assert_eq!((back.width(), back.height()), (7, 4));
        assert_eq!(back.as_bytes(), src.as_bytes());
    }

    #[test]
    fn test_forward_and_inverse_agree() {
        for rotation in [Rotation::None, Rotation::Cw90, Rotation::Cw180, Rotation::Cw270] {
            let t = CentredRotation::new(rotation, 6, 3);
            for y in 0..3 {
                for x in 0..6 {
                    let (nx, ny) = t.forward(x, y);
                    assert_eq!(t.inverse(nx, ny), (x, y), "{rotation:?} at ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn test_rotate_preserves_color_type() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::new(3, 2));
        let out = rotate(&gray, Rotation::Cw90);
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
        assert_eq!((out.width(), out.height()), (2, 3));
    }

    #[test]
    fn test_rotate_does_not_mutate_input() {
        let src = DynamicImage::ImageRgb8(numbered(4, 3));
        let before = src.as_bytes().to_vec();
        let _ = rotate(&src, Rotation::Cw90);
        assert_eq!(src.as_bytes(), before.as_slice());
    }

    #[test]
    fn test_no_metadata_returns_raw_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.png");
        numbered(9, 5).save(&path).unwrap();

        let corrected = correct_orientation(&path).unwrap();
        let raw = image::open(&path).unwrap();
        assert_eq!(read_orientation(&path), None);
        assert_eq!((corrected.width(), corrected.height()), (9, 5));
        assert_eq!(corrected.as_bytes(), raw.as_bytes());
    }

    #[test]
    fn test_exif_orientation_6_swaps_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotated.jpg");
        let src = DynamicImage::ImageRgb8(numbered(40, 16));
        std::fs::write(&path, jpeg_with_orientation(&src, 6)).unwrap();

        assert_eq!(read_orientation(&path), Some(6));
        let corrected = correct_orientation(&path).unwrap();
        assert_eq!((corrected.width(), corrected.height()), (16, 40));
    }

    #[test]
    fn test_exif_orientation_unsupported_is_noop() {
        let src = DynamicImage::ImageRgb8(numbered(40, 16));
        let bytes = jpeg_with_orientation(&src, 2);
        let corrected = correct_orientation_bytes(&bytes).unwrap();
        assert_eq!((corrected.width(), corrected.height()), (40, 16));
    }

    #[test]
    fn test_exif_orientation_8_from_bytes() {
        let src = DynamicImage::ImageRgb8(numbered(40, 16));
        let bytes = jpeg_with_orientation(&src, 8);
        let corrected = correct_orientation_bytes(&bytes).unwrap();
        assert_eq!((corrected.width(), corrected.height()), (16, 40));
    }

    #[test]
    fn test_unreadable_path_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.jpg");
        std::fs::write(&path, b"garbage").unwrap();
        assert!(matches!(correct_orientation(&path), Err(FaceError::Decode(_))));
        assert_eq!(read_orientation(&path), None);
    }
}
