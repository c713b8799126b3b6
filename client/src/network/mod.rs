//! The two face commands of the Crossfire protocol.
//!
//! Connection handling and the remaining commands live elsewhere; this module
//! only knows how to frame an "askface" request and how to recognise the
//! `image2` and `face2` replies.

pub mod client_commands;
pub mod server_commands;

/// The part of the server connection the face pipeline talks to.
pub trait AskfaceSender: Send + Sync {
    /// Asks the server for the image of `face_num`. Fire and forget: the
    /// answer arrives later as an `image2` command.
    fn send_askface(&self, face_num: u32);
}
