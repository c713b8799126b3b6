use std::{
    io::{self, Write},
    sync::{Mutex, PoisonError},
};

use cf_core::{byte_operations::frame_packet, constants::CL_ASKFACE};

use super::AskfaceSender;

/// A textual client command: the command name, a space and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCommand {
    name: &'static str,
    args: String,
}

impl ClientCommand {
    fn new(name: &'static str, args: String) -> Self {
        Self { name, args }
    }

    /// Requests the image of `face_num` from the server.
    pub fn askface(face_num: u32) -> Self {
        Self::new(CL_ASKFACE, face_num.to_string())
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Serializes the command payload without the length prefix.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.name.len() + 1 + self.args.len());
        bytes.extend_from_slice(self.name.as_bytes());
        if !self.args.is_empty() {
            bytes.push(b' ');
            bytes.extend_from_slice(self.args.as_bytes());
        }
        bytes
    }

    /// Serializes the command as one length-prefixed packet.
    pub fn to_frame(&self) -> io::Result<Vec<u8>> {
        frame_packet(&self.to_bytes()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} command exceeds the maximum packet size", self.name),
            )
        })
    }
}

/// [`AskfaceSender`] writing framed askface commands to a byte stream.
pub struct FramedAskfaceSender<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> FramedAskfaceSender<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_command(&self, command: &ClientCommand) -> io::Result<()> {
        let frame = command.to_frame()?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&frame)?;
        writer.flush()
    }
}

impl<W: Write + Send> AskfaceSender for FramedAskfaceSender<W> {
    fn send_askface(&self, face_num: u32) {
        log::debug!("send askface face={face_num}");
        if let Err(e) = self.write_command(&ClientCommand::askface(face_num)) {
            log::warn!("Failed to send askface for face {face_num}: {e}");
        }
    }
}
