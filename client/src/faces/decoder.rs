use std::{io::Cursor, path::Path, sync::Arc};

use cf_core::constants::MAX_FACE_DIMENSION;
use image::{ImageFormat, ImageReader, Limits, RgbaImage};

use super::face::{DecodedImage, FaceImages};

#[derive(Debug, thiserror::Error)]
pub enum FaceError {
    #[error("face data is empty")]
    Empty,
    #[error("invalid image data: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("cannot read image file: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns the bytes of an `image2` payload (or a cache file) into face images.
pub trait FaceDecoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<FaceImages, FaceError>;
}

/// Decodes PNG face data with the `image` crate.
///
/// Images wider or taller than [`MAX_FACE_DIMENSION`] are rejected before
/// their pixels are allocated.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngFaceDecoder;

impl FaceDecoder for PngFaceDecoder {
    fn decode(&self, data: &[u8]) -> Result<FaceImages, FaceError> {
        if data.is_empty() {
            return Err(FaceError::Empty);
        }
        let mut limits = Limits::default();
        limits.max_image_width = Some(MAX_FACE_DIMENSION);
        limits.max_image_height = Some(MAX_FACE_DIMENSION);

        let mut reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
        reader.limits(limits);
        let rgba = reader.decode()?.to_rgba8();
        let (width, height) = rgba.dimensions();
        let original = DecodedImage::from_rgba(width, height, rgba.into_raw())
            .ok_or(FaceError::InvalidDimensions { width, height })?;
        Ok(FaceImages::from_original(original, Some(Arc::from(data))))
    }
}

/// Encodes an image as PNG.
pub fn encode_png(image: &DecodedImage) -> Result<Vec<u8>, FaceError> {
    let buffer = RgbaImage::from_raw(image.width(), image.height(), image.pixels().to_vec())
        .ok_or(FaceError::InvalidDimensions {
            width: image.width(),
            height: image.height(),
        })?;
    let mut out = Cursor::new(Vec::new());
    buffer.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Loads a replacement "unknown" face from an image file.
pub fn load_face_images(path: &Path, decoder: &dyn FaceDecoder) -> Result<FaceImages, FaceError> {
    let data = std::fs::read(path)?;
    decoder.decode(&data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_png_builds_all_variants() {
        let png = encode_png(&DecodedImage::filled(32, 16, [10, 20, 30, 255])).unwrap();
        let images = PngFaceDecoder.decode(&png).unwrap();
        assert_eq!(images.original().width(), 32);
        assert_eq!(images.original().height(), 16);
        assert_eq!(images.scaled().width(), 64);
        assert_eq!(images.scaled().height(), 32);
        assert_eq!(images.magic_map().width(), 4);
        assert_eq!(images.magic_map().height(), 2);
        assert_eq!(images.original().pixel(3, 3), [10, 20, 30, 255]);
        assert_eq!(images.source(), Some(png.as_slice()));
    }

    #[test]
    fn decode_rejects_empty_data() {
        assert!(matches!(PngFaceDecoder.decode(&[]), Err(FaceError::Empty)));
    }

    #[test]
    fn decode_rejects_oversized_images() {
        let png = encode_png(&DecodedImage::filled(2, MAX_FACE_DIMENSION + 1, [0, 0, 0, 255])).unwrap();
        assert!(matches!(
            PngFaceDecoder.decode(&png),
            Err(FaceError::Decode(image::ImageError::Limits(_)))
        ));

        let png = encode_png(&DecodedImage::filled(MAX_FACE_DIMENSION, 1, [0, 0, 0, 255])).unwrap();
        assert_eq!(PngFaceDecoder.decode(&png).unwrap().original().width(), MAX_FACE_DIMENSION);
    }

    #[test]
    fn decode_rejects_garbage() {
        let result = PngFaceDecoder.decode(b"definitely not a png");
        assert!(matches!(result, Err(FaceError::Decode(_))));
    }

    #[test]
    fn load_face_images_reports_missing_file() {
        let path = std::env::temp_dir().join("crossfire_missing_unknown_face.png");
        let _ = std::fs::remove_file(&path);
        let result = load_face_images(&path, &PngFaceDecoder);
        assert!(matches!(result, Err(FaceError::Io(_))));
    }
}
