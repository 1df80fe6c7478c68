//! Hex dump for received buffers, formatted for a serial terminal.

use core::fmt;

/// `Display`s a byte slice 16 bytes to a line, each line prefixed by the
/// offset of its first byte. Every byte is followed by a space and every
/// line, the last one included, ends in `\r\n`:
///
/// ```text
/// "00: a5 bb 69 ff ff ff ff ff ff ff ff ff ff ff ff ff \r\n"
/// "10: ff ff \r\n"
/// ```
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (line, chunk) in self.0.chunks(16).enumerate() {
            // The offset wraps like the byte counter it mirrors.
            write!(f, "{:02x}: ", (line * 16) as u8)?;
            for byte in chunk {
                write!(f, "{:02x} ", byte)?;
            }
            f.write_str("\r\n")?;
        }
        Ok(())
    }
}
