//! Writing a finished image to an Intel HEX file.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Bytes of payload per data record.
const RECORD_LEN: usize = 16;

/// Writes `image` as an Intel HEX file loading at `origin`.
///
/// The file consists of 16-byte type-00 data records followed by the
/// type-01 end record. The whole file is rendered in memory first, so a
/// failure leaves no partial output behind. Returns the written path.
pub fn write_hex(image: &[u8], origin: u16, path: &Path) -> std::io::Result<PathBuf> {
    std::fs::write(path, render(image, origin))?;
    Ok(path.to_path_buf())
}

/// Renders the HEX text for an image loading at `origin`.
pub fn render(image: &[u8], origin: u16) -> String {
    // Record specification:
    // - ':' start code
    // - payload length (1 byte)
    // - load address (2 bytes, big-endian)
    // - record type (1 byte): 0x00 data, 0x01 end of file
    // - the payload (n bytes)
    // - checksum (1 byte): two's complement of the sum of all record bytes
    let mut out = String::new();

    for (i, payload) in image.chunks(RECORD_LEN).enumerate() {
        let addr = origin.wrapping_add((i * RECORD_LEN) as u16);
        record(&mut out, addr, 0x00, payload);
    }
    record(&mut out, 0, 0x01, &[]);

    out
}

fn record(out: &mut String, addr: u16, kind: u8, payload: &[u8]) {
    let [hi, lo] = addr.to_be_bytes();

    let _ = write!(out, ":{:02X}{hi:02X}{lo:02X}{kind:02X}", payload.len());
    let mut sum = (payload.len() as u8)
        .wrapping_add(hi)
        .wrapping_add(lo)
        .wrapping_add(kind);
    for &b in payload {
        let _ = write!(out, "{b:02X}");
        sum = sum.wrapping_add(b);
    }
    let _ = writeln!(out, "{:02X}", sum.wrapping_neg());
}

#[cfg(test)]
mod test {
    use super::render;

    #[test]
    fn records_and_checksums() {
        let text = render(&[0xfb, 0xd7, 0x00, 0x00], 0x8000);
        // sum = 04 + 80 + 00 + 00 + fb + d7 = 0x256; checksum = -0x56 = 0xAA
        assert_eq!(text, ":04800000FBD70000AA\n:00000001FF\n");
    }

    #[test]
    fn long_images_split_into_sixteen_byte_records() {
        let image: Vec<u8> = (0u8..20).collect();
        let text = render(&image, 0x8000);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(":10800000"));
        assert!(lines[1].starts_with(":04801000"));
        assert_eq!(lines[2], ":00000001FF");
    }

    #[test]
    fn empty_image_still_terminates() {
        assert_eq!(render(&[], 0x8000), ":00000001FF\n");
    }
}
