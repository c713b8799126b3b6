use std::sync::Arc;

use cf_core::constants::{MAGIC_MAP_DIVISOR, SQUARE_SIZE};

use super::scaling::{scale2x, shrink};

/// An RGBA8 image with non-zero dimensions.
///
/// The pixel buffer is shared, so clones are cheap and can be handed to any
/// thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
}

impl DecodedImage {
    /// Wraps a row-major RGBA8 buffer.
    ///
    /// # Returns
    /// * `None` if a dimension is zero or `pixels` is not `width * height * 4` bytes.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if pixels.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels: pixels.into(),
        })
    }

    /// Creates an image of the given size filled with one colour.
    ///
    /// Zero dimensions are bumped to one pixel.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let pixels: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the RGBA value at `(x, y)`. Coordinates are clamped to the image.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        let i = (y * self.width as usize + x) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

/// The variants of one face that the client draws.
#[derive(Clone, Debug)]
pub struct FaceImages {
    original: DecodedImage,
    scaled: DecodedImage,
    magic_map: DecodedImage,
    /// The encoded bytes `original` was decoded from, if any.
    source: Option<Arc<[u8]>>,
}

impl FaceImages {
    /// Derives the scaled (2x) and magic map (1/8) variants from `original`.
    pub fn from_original(original: DecodedImage, source: Option<Arc<[u8]>>) -> Self {
        let scaled = scale2x(&original);
        let magic_map = shrink(&original, MAGIC_MAP_DIVISOR);
        Self {
            original,
            scaled,
            magic_map,
            source,
        }
    }

    /// The fully transparent face used for face number 0.
    pub fn empty() -> Self {
        Self::from_original(DecodedImage::filled(SQUARE_SIZE, SQUARE_SIZE, [0, 0, 0, 0]), None)
    }

    /// The built-in "unknown" face: a magenta and black checkerboard.
    pub fn unknown() -> Self {
        const CHECKER: u32 = 8;
        let mut pixels = Vec::with_capacity((SQUARE_SIZE * SQUARE_SIZE * 4) as usize);
        for y in 0..SQUARE_SIZE {
            for x in 0..SQUARE_SIZE {
                if ((x / CHECKER) + (y / CHECKER)) % 2 == 0 {
                    pixels.extend_from_slice(&[0xff, 0x00, 0xff, 0xff]);
                } else {
                    pixels.extend_from_slice(&[0x00, 0x00, 0x00, 0xff]);
                }
            }
        }
        let original = DecodedImage::from_rgba(SQUARE_SIZE, SQUARE_SIZE, pixels)
            .unwrap_or_else(|| DecodedImage::filled(SQUARE_SIZE, SQUARE_SIZE, [0xff, 0x00, 0xff, 0xff]));
        Self::from_original(original, None)
    }

    pub fn original(&self) -> &DecodedImage {
        &self.original
    }

    pub fn scaled(&self) -> &DecodedImage {
        &self.scaled
    }

    pub fn magic_map(&self) -> &DecodedImage {
        &self.magic_map
    }

    pub fn source(&self) -> Option<&[u8]> {
        self.source.as_deref()
    }
}

/// Immutable snapshot of one face.
///
/// Snapshots are never updated in place: when images arrive the face cache
/// stores a new snapshot and listeners receive it.
#[derive(Clone, Debug)]
pub struct Face {
    num: u32,
    name: Arc<str>,
    checksum: u32,
    /// Whether `name`/`checksum` came from the server and may key the disk cache.
    named: bool,
    images: Option<Arc<FaceImages>>,
    unknown: bool,
    generation: u64,
}

impl Face {
    /// A face announced by the server with its symbolic name and checksum.
    pub fn new(num: u32, name: &str, checksum: u32, generation: u64) -> Self {
        Self {
            num,
            name: Arc::from(name),
            checksum,
            named: true,
            images: None,
            unknown: true,
            generation,
        }
    }

    /// A face only known by its number.
    pub fn placeholder(num: u32, generation: u64) -> Self {
        Self {
            num,
            name: Arc::from(format!("face#{num}").as_str()),
            checksum: 0,
            named: false,
            images: None,
            unknown: true,
            generation,
        }
    }

    /// Returns a copy of this snapshot carrying `images`.
    pub fn with_images(&self, images: Arc<FaceImages>, unknown: bool) -> Self {
        Self {
            images: Some(images),
            unknown,
            ..self.clone()
        }
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn is_named(&self) -> bool {
        self.named
    }

    pub fn images(&self) -> Option<&Arc<FaceImages>> {
        self.images.as_ref()
    }

    /// True while the face shows (or would show) the "unknown" image.
    pub fn is_unknown(&self) -> bool {
        self.unknown
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Same number, name and checksum within the same session.
    pub fn same_identity(&self, other: &Face) -> bool {
        self.num == other.num
            && self.generation == other.generation
            && self.checksum == other.checksum
            && self.name == other.name
    }
}
