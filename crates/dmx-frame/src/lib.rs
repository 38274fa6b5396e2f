//! USB DMX Widget Wire Protocol
//!
//! This crate provides encoding for the framed message protocol spoken by the
//! widget over its bulk endpoints. A message on the wire looks like:
//!
//! ```text
//! [0x5A][cmd lo][cmd hi][len lo][len hi][payload ...][0xA5][optional 0x00]
//! ```
//!
//! `cmd` and `len` are 16-bit little-endian. The payload is at most 513 bytes
//! (a DMX start code plus a full 512-slot universe). A single trailing zero
//! byte is appended when the encoded frame would otherwise be an exact
//! multiple of the 64-byte bulk packet size, so the device never sees a
//! transfer whose final packet is completely full and therefore ambiguous.
//!
//! Inbound data from the widget is treated as raw captured bytes by the
//! engine; [`FrameDecoder`] is available for callers (and the simulator) that
//! want to validate and reassemble frames from a byte stream, but it is not
//! inserted into the engine's receive path.
//!
//! # Example
//!
//! ```rust
//! use dmx_frame::{encode_frame, Command};
//!
//! let frame = encode_frame(Command::TxDmx.code(), &[1, 2, 3]).unwrap();
//! assert_eq!(frame, [0x5A, 0x81, 0x00, 0x03, 0x00, 1, 2, 3, 0xA5]);
//! ```

pub mod codec;
pub mod command;
pub mod decode;
pub mod display;
pub mod error;

pub use codec::{encode_frame, EOF, HEADER_LEN, MAX_PACKET_SIZE, MAX_PAYLOAD, SOF};
pub use command::Command;
pub use decode::{DecodedFrame, FrameDecoder};
pub use error::FrameError;
