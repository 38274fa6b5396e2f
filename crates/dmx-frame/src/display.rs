//! Display helpers for captured bytes
//!
//! The engine captures inbound bytes without interpreting them; these helpers
//! format such captures for logs and diagnostics.

use std::fmt::Write as _;

use crate::command::Command;

/// Format bytes as a space-separated lowercase hex dump
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Format a command code, naming it when known
pub fn format_command(code: u16) -> String {
    match Command::from_code(code) {
        Some(cmd) => format!("{} (0x{:04x})", cmd.name(), code),
        None => format!("0x{:04x}", code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0x5A, 0x81, 0x00]), "5a 81 00");
        assert_eq!(hex_dump(&[]), "");
    }

    #[test]
    fn test_format_command() {
        assert_eq!(format_command(0x0080), "Echo (0x0080)");
        assert_eq!(format_command(0x0099), "0x0099");
    }
}
