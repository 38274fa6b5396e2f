//! Streaming frame decoder
//!
//! The engine deliberately leaves inbound bytes as a raw capture; this
//! decoder exists for callers that want to validate markers and reassemble
//! frames from a byte stream after the fact, and for the simulator, which
//! plays the widget end of the protocol. Bytes that cannot start a valid
//! frame are skipped until the next start marker.

use crate::codec::{EOF, HEADER_LEN, MAX_PAYLOAD, SOF};

/// A validated frame extracted from a byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Command code
    pub command: u16,
    /// Payload bytes
    pub payload: Vec<u8>,
}

/// Incremental decoder for widget frames
///
/// Push raw bytes in with [`push_bytes`](FrameDecoder::push_bytes), then
/// drain complete frames with [`next_frame`](FrameDecoder::next_frame).
/// Partial frames are buffered across pushes. Trailing pad bytes between
/// frames are consumed by the start-marker scan.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Push raw bytes into the decoder's buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next complete frame from the buffer
    pub fn next_frame(&mut self) -> Option<DecodedFrame> {
        loop {
            // Drop anything before the next start marker
            match self.buffer.iter().position(|&b| b == SOF) {
                Some(0) => {}
                Some(pos) => {
                    self.buffer.drain(..pos);
                }
                None => {
                    self.buffer.clear();
                    return None;
                }
            }

            if self.buffer.len() < HEADER_LEN {
                return None;
            }

            let command = u16::from_le_bytes([self.buffer[1], self.buffer[2]]);
            let len = u16::from_le_bytes([self.buffer[3], self.buffer[4]]) as usize;

            if len > MAX_PAYLOAD {
                // Not a real header; resync past this marker
                self.buffer.drain(..1);
                continue;
            }

            let end = HEADER_LEN + len;
            if self.buffer.len() < end + 1 {
                return None;
            }

            if self.buffer[end] != EOF {
                self.buffer.drain(..1);
                continue;
            }

            let payload = self.buffer[HEADER_LEN..end].to_vec();
            self.buffer.drain(..end + 1);
            return Some(DecodedFrame { command, payload });
        }
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_frame;

    #[test]
    fn test_decode_single_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.push_bytes(&encode_frame(0x0080, &[9, 8, 7]).unwrap());

        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.command, 0x0080);
        assert_eq!(frame.payload, vec![9, 8, 7]);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_decode_split_across_pushes() {
        let encoded = encode_frame(0x0081, &[1, 2, 3, 4]).unwrap();
        let mut decoder = FrameDecoder::new();

        decoder.push_bytes(&encoded[..4]);
        assert!(decoder.next_frame().is_none());

        decoder.push_bytes(&encoded[4..]);
        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_resync_past_garbage() {
        let mut decoder = FrameDecoder::new();
        decoder.push_bytes(&[0xFF, 0x00, 0x13]);
        decoder.push_bytes(&encode_frame(0x0080, &[42]).unwrap());

        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.command, 0x0080);
        assert_eq!(frame.payload, vec![42]);
    }

    #[test]
    fn test_bad_end_marker_dropped() {
        let mut bad = encode_frame(0x0080, &[1]).unwrap();
        let eof_at = bad.len() - 1;
        bad[eof_at] = 0x00;

        let mut decoder = FrameDecoder::new();
        decoder.push_bytes(&bad);
        decoder.push_bytes(&encode_frame(0x0080, &[2]).unwrap());

        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.payload, vec![2]);
    }

    #[test]
    fn test_pad_byte_between_frames_skipped() {
        // 58-byte payload forces a trailing pad
        let padded = encode_frame(0x0081, &[0xAB; 58]).unwrap();
        assert_eq!(padded.len(), 65);

        let mut decoder = FrameDecoder::new();
        decoder.push_bytes(&padded);
        decoder.push_bytes(&encode_frame(0x0080, &[]).unwrap());

        assert_eq!(decoder.next_frame().unwrap().payload.len(), 58);
        assert_eq!(decoder.next_frame().unwrap().command, 0x0080);
    }
}
