use std::io::{self, Read};

use cf_core::constants::{
    SV_FACE2, SV_FACE2_HEADER_LEN, SV_IMAGE2, SV_IMAGE2_HEADER_LEN,
};
use cf_core::{read_u16_be, read_u32_be, read_u8};
use thiserror::Error;

use crate::faces::FacesManager;

/// A server packet that cannot be interpreted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,
    #[error("truncated {command} command: need {needed} bytes, got {got}")]
    Truncated {
        command: &'static str,
        needed: usize,
        got: usize,
    },
    #[error("image2 declares {declared} bytes of data but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("face2 name is not valid UTF-8")]
    InvalidName,
}

/// A parsed server command. Borrows from the packet it was parsed from.
#[derive(Debug, PartialEq, Eq)]
pub enum ServerCommand<'a> {
    /// Image data of a face, answering an askface command.
    Image2 {
        face_num: u32,
        face_set: u8,
        data: &'a [u8],
    },
    /// Name and checksum of a face.
    Face2 {
        face_num: u16,
        face_set: u8,
        checksum: u32,
        name: &'a str,
    },
    /// Any command the face pipeline does not handle.
    Other(String),
}

impl<'a> ServerCommand<'a> {
    /// Parses one packet payload (without the length prefix).
    pub fn parse(payload: &'a [u8]) -> Result<Self, ProtocolError> {
        if payload.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let (name, args) = match payload.iter().position(|&b| b == b' ') {
            Some(pos) => (&payload[..pos], &payload[pos + 1..]),
            None => (payload, &payload[payload.len()..]),
        };

        match name {
            n if n == SV_IMAGE2.as_bytes() => parse_image2(args),
            n if n == SV_FACE2.as_bytes() => parse_face2(args),
            _ => Ok(ServerCommand::Other(
                String::from_utf8_lossy(name).into_owned(),
            )),
        }
    }
}

fn parse_image2(args: &[u8]) -> Result<ServerCommand<'_>, ProtocolError> {
    if args.len() < SV_IMAGE2_HEADER_LEN {
        return Err(ProtocolError::Truncated {
            command: SV_IMAGE2,
            needed: SV_IMAGE2_HEADER_LEN,
            got: args.len(),
        });
    }

    let mut offset = 0;
    let face_num = read_u32_be!(args, offset);
    let face_set = read_u8!(args, offset);
    let declared = read_u32_be!(args, offset) as usize;

    let data = &args[offset..];
    if data.len() != declared {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: data.len(),
        });
    }

    Ok(ServerCommand::Image2 {
        face_num,
        face_set,
        data,
    })
}

fn parse_face2(args: &[u8]) -> Result<ServerCommand<'_>, ProtocolError> {
    if args.len() < SV_FACE2_HEADER_LEN {
        return Err(ProtocolError::Truncated {
            command: SV_FACE2,
            needed: SV_FACE2_HEADER_LEN,
            got: args.len(),
        });
    }

    let mut offset = 0;
    let face_num = read_u16_be!(args, offset);
    let face_set = read_u8!(args, offset);
    let checksum = read_u32_be!(args, offset);
    let name = std::str::from_utf8(&args[offset..]).map_err(|_| ProtocolError::InvalidName)?;

    Ok(ServerCommand::Face2 {
        face_num,
        face_set,
        checksum,
        name,
    })
}

/// Reads one length-prefixed packet and returns its payload.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let len = u16::from_be_bytes(len_bytes) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Hands a face command to `faces`.
///
/// # Returns
/// * `true` if the command was a face command.
pub fn dispatch_server_command(command: &ServerCommand<'_>, faces: &FacesManager) -> bool {
    match command {
        ServerCommand::Image2 {
            face_num,
            face_set,
            data,
        } => {
            faces.face_received(*face_num, *face_set, data);
            true
        }
        ServerCommand::Face2 {
            face_num,
            face_set,
            checksum,
            name,
        } => {
            faces.face_info_received(u32::from(*face_num), *face_set, *checksum, name);
            true
        }
        ServerCommand::Other(_) => false,
    }
}
