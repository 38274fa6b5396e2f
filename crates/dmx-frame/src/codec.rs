//! Frame encoding
//!
//! Pure functions that turn a command and payload into the widget's wire
//! format. Encoding never logs and never touches shared state, so it can be
//! called from any thread.

use crate::error::FrameError;

/// Start-of-frame marker
pub const SOF: u8 = 0x5A;

/// End-of-frame marker
pub const EOF: u8 = 0xA5;

/// Maximum payload length: a DMX start code plus 512 slots
pub const MAX_PAYLOAD: usize = 513;

/// Bulk endpoint packet size; frames must not end on an exact packet boundary
pub const MAX_PACKET_SIZE: usize = 64;

/// Bytes preceding the payload: SOF, command (LE16), length (LE16)
pub const HEADER_LEN: usize = 5;

/// Encode a command and payload into a wire frame.
///
/// Returns [`FrameError::PayloadTooLarge`] when the payload exceeds
/// [`MAX_PAYLOAD`]. A trailing zero byte is appended iff the encoded length
/// is an exact multiple of [`MAX_PACKET_SIZE`], so the transfer always ends
/// with a short packet.
pub fn encode_frame(command: u16, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + 2);
    frame.push(SOF);
    frame.extend_from_slice(&command.to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    frame.push(EOF);

    if frame.len() % MAX_PACKET_SIZE == 0 {
        frame.push(0);
    }

    Ok(frame)
}
