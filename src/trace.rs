//! Diagnostic rendering of wire bytes. Not part of the protocol.

use crate::{BEL, CR};
use log::*;

/// Space separated upper case hex, e.g. `74 30 0D`
pub fn format_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i != 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02X}", byte));
    }
    out
}

/// Text rendering with the terminators blanked out
pub(crate) fn printable(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .map(|c| if c == CR as char || c == BEL as char { ' ' } else { c })
        .collect()
}

/// Verbose byte dump, `direction` is "R" or "W"
pub(crate) fn dump(direction: &str, bytes: &[u8]) {
    info!(
        "  {}: {:<24}  {}",
        direction,
        printable(bytes),
        format_hex(bytes)
    );
}
