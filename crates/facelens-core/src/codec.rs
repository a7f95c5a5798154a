//! Decoding, encoding and scratch-file helpers around the `image` crate.

use crate::error::{FaceError, Result};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::{Cursor, Write};
use std::path::Path;

const TRANSIENT_PREFIX: &str = "facelens-";

/// Decode the image at `path`, sniffing the format from its contents.
pub fn decode_path(path: &Path) -> Result<DynamicImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| FaceError::Decode(format!("{}: {e}", path.display())))?
        .with_guessed_format()
        .map_err(|e| FaceError::Decode(format!("{}: {e}", path.display())))?;
    reader
        .decode()
        .map_err(|e| FaceError::Decode(format!("{}: {e}", path.display())))
}

/// Decode an in-memory encoded image.
pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| FaceError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| FaceError::Decode(e.to_string()))
}

/// Output format implied by the file extension of `path`.
pub fn format_for_path(path: &Path) -> Result<ImageFormat> {
    path.extension()
        .and_then(ImageFormat::from_extension)
        .ok_or_else(|| FaceError::UnknownFormat(path.display().to_string()))
}

/// Encode `image` in `format`.
///
/// JPEG has no alpha channel, so images are flattened to RGB first.
pub fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    let written = if format == ImageFormat::Jpeg && image.color().has_alpha() {
        DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut out, format)
    } else {
        image.write_to(&mut out, format)
    };
    written.map_err(|e| FaceError::Encode(format!("{format:?}: {e}")))?;
    Ok(out.into_inner())
}

/// Persist `bytes` to a scratch file, hand its path to `f`, and remove the
/// file afterwards whether `f` succeeded or not.
///
/// The file is created in `dir` when given, otherwise in the system temp dir.
pub fn with_transient_file<T>(
    bytes: &[u8],
    dir: Option<&Path>,
    f: impl FnOnce(&Path) -> Result<T>,
) -> Result<T> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TRANSIENT_PREFIX);
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(bytes)?;
    file.flush()?;
    tracing::debug!(path = %file.path().display(), len = bytes.len(), "wrote transient image");

    let result = f(file.path());

    if let Err(e) = file.close() {
        tracing::warn!(error = %e, "failed to remove transient image");
    }
    result
}
