//! Resolution of server face numbers into images.
//!
//! [`FacesManager`] is the entry point. Requests flow through the disk cache
//! ([`FacesQueue`]) and, on a miss, to the server ([`AskfaceFaceQueue`]).

pub mod askface_queue;
pub mod decoder;
pub mod face;
pub mod face_cache;
pub mod face_queue;
pub mod faces_manager;
pub mod faces_queue;
pub mod image_cache;
pub mod scaling;

pub use askface_queue::AskfaceFaceQueue;
pub use decoder::{FaceDecoder, FaceError, PngFaceDecoder};
pub use face::{DecodedImage, Face, FaceImages};
pub use face_cache::FaceCache;
pub use face_queue::FaceQueueListener;
pub use faces_manager::{FacesManager, FacesManagerListener};
pub use faces_queue::FacesQueue;
pub use image_cache::{FileCache, ImageCache, MemoryImageCache};
