//! Client side of the Crossfire face pipeline.
//!
//! [`faces::FacesManager`] turns server-assigned face numbers into images:
//! it answers synchronously from memory (or with a placeholder), consults the
//! on-disk cache in the background, falls back to "askface" requests over the
//! server connection and notifies listeners once the real image is known.

pub mod faces;
pub mod filepaths;
pub mod network;
pub mod settings;
