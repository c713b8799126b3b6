// Helper macros for reading network-order (big-endian) integers out of a packet.
// Callers check the packet length before reading; the macros index directly.

#[macro_export]
macro_rules! read_u8 {
    ($bytes:expr, $offset:expr) => {{
        let val = $bytes[$offset];
        $offset += 1;
        val
    }};
}

#[macro_export]
macro_rules! read_u16_be {
    ($bytes:expr, $offset:expr) => {{
        let val = u16::from_be_bytes([$bytes[$offset], $bytes[$offset + 1]]);
        $offset += 2;
        val
    }};
}

#[macro_export]
macro_rules! read_u32_be {
    ($bytes:expr, $offset:expr) => {{
        let val = u32::from_be_bytes([
            $bytes[$offset],
            $bytes[$offset + 1],
            $bytes[$offset + 2],
            $bytes[$offset + 3],
        ]);
        $offset += 4;
        val
    }};
}

use crate::constants::MAXIMUM_PACKET_SIZE;

/// Prefixes `payload` with its length as a big-endian `u16`.
///
/// Returns `None` if the payload does not fit in a single packet.
pub fn frame_packet(payload: &[u8]) -> Option<Vec<u8>> {
    if payload.len() > MAXIMUM_PACKET_SIZE {
        return None;
    }
    let len = payload.len() as u16;
    let mut out = Vec::with_capacity(2 + payload.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Some(out)
}
