//! Constants of the Crossfire client protocol and of the face pipeline.

// =============================================================================
// Faces
// =============================================================================

/// The reserved "no face" number. Never requested from the server.
pub const EMPTY_FACE: u32 = 0;
/// Highest face number the server can assign.
pub const MAX_FACE_NUM: u32 = 65535;

/// Edge length in pixels of one map square at original resolution.
pub const SQUARE_SIZE: u32 = 64;
/// Factor between original and scaled face images.
pub const SCALED_FACTOR: u32 = 2;
/// Divisor between original and magic map face images.
pub const MAGIC_MAP_DIVISOR: u32 = 8;

/// Largest width or height accepted when decoding face data.
pub const MAX_FACE_DIMENSION: u32 = 1024;

/// Default number of "askface" commands that may await a response at once.
pub const CONCURRENT_ASKFACE_COMMANDS: usize = 8;

/// Default upper bound for a file read back from the face cache.
pub const DEFAULT_MAX_CACHED_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// Protocol (length-prefixed framing, textual command names)
// =============================================================================

/// Maximum payload size of one packet; the length prefix is a `u16`.
pub const MAXIMUM_PACKET_SIZE: usize = 65535;

/// Client command requesting the image of a face.
pub const CL_ASKFACE: &str = "askface";

/// Server command carrying the image data of a face.
pub const SV_IMAGE2: &str = "image2";
/// Server command announcing name and checksum of a face.
pub const SV_FACE2: &str = "face2";

/// Bytes following the command name of `image2`: face (4), set (1), length (4).
pub const SV_IMAGE2_HEADER_LEN: usize = 9;
/// Bytes following the command name of `face2`: face (2), set (1), checksum (4).
pub const SV_FACE2_HEADER_LEN: usize = 7;
