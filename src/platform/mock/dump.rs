//! Human-readable memory dump format
//!
//! Shared by the flash and EEPROM mocks to externalize their contents.
//! One line per 16-byte row: hex address, decimal address, the bytes in
//! hex, and their ASCII rendering with non-printables shown as `.`.

use std::io::{self, Write};
use std::path::Path;

/// Width of one dump row in bytes
const ROW_LEN: usize = 16;

/// Write `bytes` as dump rows to `out`
pub(crate) fn write_rows<W: Write>(out: &mut W, bytes: &[u8]) -> io::Result<()> {
    for (row, chunk) in bytes.chunks(ROW_LEN).enumerate() {
        let addr = row * ROW_LEN;
        write!(out, "{:08X} {:>10}  ", addr, addr)?;
        for col in 0..ROW_LEN {
            match chunk.get(col) {
                Some(b) => write!(out, "{:02X} ", b)?,
                None => write!(out, "   ")?,
            }
        }
        write!(out, " |")?;
        for &b in chunk {
            let c = if (0x20..0x7F).contains(&b) {
                b as char
            } else {
                '.'
            };
            write!(out, "{}", c)?;
        }
        writeln!(out, "|")?;
    }
    Ok(())
}

/// Write `bytes` as a dump file at `path`
pub(crate) fn save<P: AsRef<Path>>(path: P, bytes: &[u8]) -> io::Result<()> {
    let file = std::fs::File::create(path)?;
    let mut out = io::BufWriter::new(file);
    write_rows(&mut out, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_row_format() {
        let mut out = Vec::new();
        write_rows(&mut out, b"Test data!\0\xff\xff\xff\xff\xff").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "00000000          0  54 65 73 74 20 64 61 74 61 21 00 FF FF FF FF FF  |Test data!......|\n"
        );
    }

    #[test]
    fn test_dump_partial_row_padded() {
        let mut out = Vec::new();
        write_rows(&mut out, &[0x41, 0x42]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("00000000          0  41 42 "));
        assert!(text.ends_with("|AB|\n"));
    }

    #[test]
    fn test_dump_second_row_addresses() {
        let mut out = Vec::new();
        write_rows(&mut out, &[0u8; 32]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let second = text.lines().nth(1).unwrap();
        assert!(second.starts_with("00000010         16  "));
    }
}
