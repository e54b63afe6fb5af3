//! Proportional-set-size decoding of `/proc/<pid>/smaps`
//!
//! Each mapping in `smaps` is a header line (`start-end perms offset dev
//! inode path`) followed by `Name:  value kB` field lines. Older kernels print
//! every field line at a fixed width of 28 bytes, which allows reading a
//! whole record with one `read_exact` and picking the `Pss:` value out at a
//! fixed offset instead of parsing text. Kernels from 3.8 on append a
//! `VmFlags:` line of variable width to each record.
//!
//! The fixed-offset decoder is tied to those exact layouts. Current kernels
//! add fields with other widths (`THPeligible:`, `ProtectionKey:`), so the
//! layout is probed once on the first non-empty `smaps` and a line-scanning
//! decoder is used whenever the probe does not match a fixed layout.

use std::fmt;
use std::io::{self, BufRead};

use crate::procfs::text::leading_u64;

/// Width of one fixed-layout field line, newline included.
pub const FIELD_LINE_WIDTH: usize = 28;

/// Field lines per record in the classic fixed layout.
pub const LEGACY_FIELD_LINES: usize = 14;

const PSS_LABEL: &str = "Pss:";
const VMFLAGS_LABEL: &str = "VmFlags:";
/// Position of the `Pss:` line within a record's field lines.
const PSS_LINE: usize = 2;

/// Sums the PSS of all mappings in one `smaps` file.
pub trait SmapsDecoder: fmt::Debug {
    fn name(&self) -> &'static str;

    /// Total PSS in kB. `reader` is positioned at the start of the file;
    /// `scratch` is a reusable buffer owned by the caller.
    fn sum_pss(&self, reader: &mut dyn BufRead, scratch: &mut Vec<u8>) -> io::Result<u64>;
}

/// Fixed-offset decoder for kernels printing fixed-width field lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLayoutDecoder {
    /// Fixed-width field lines per record.
    pub field_lines: usize,
    /// Whether each record ends with a variable-width `VmFlags:` line.
    pub trailing_vmflags: bool,
}

impl SmapsDecoder for FixedLayoutDecoder {
    fn name(&self) -> &'static str {
        if self.trailing_vmflags {
            "fixed-width+vmflags"
        } else {
            "fixed-width"
        }
    }

    fn sum_pss(&self, reader: &mut dyn BufRead, scratch: &mut Vec<u8>) -> io::Result<u64> {
        let block = self.field_lines * FIELD_LINE_WIDTH;
        let pss_start = PSS_LINE * FIELD_LINE_WIDTH + PSS_LABEL.len();
        let pss_end = (PSS_LINE + 1) * FIELD_LINE_WIDTH;
        let mut total = 0u64;

        loop {
            // header line naming the mapped object
            scratch.clear();
            if reader.read_until(b'\n', scratch)? == 0 {
                break;
            }

            scratch.resize(block, 0);
            match reader.read_exact(&mut scratch[..block]) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let field = String::from_utf8_lossy(&scratch[pss_start..pss_end]);
            total += leading_u64(&field).unwrap_or(0);

            if self.trailing_vmflags {
                scratch.clear();
                if reader.read_until(b'\n', scratch)? == 0 {
                    break;
                }
            }
        }

        Ok(total)
    }
}

/// Layout-agnostic decoder summing every `Pss:` line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineScanDecoder;

impl SmapsDecoder for LineScanDecoder {
    fn name(&self) -> &'static str {
        "line-scan"
    }

    fn sum_pss(&self, reader: &mut dyn BufRead, scratch: &mut Vec<u8>) -> io::Result<u64> {
        let mut total = 0u64;
        loop {
            scratch.clear();
            if reader.read_until(b'\n', scratch)? == 0 {
                break;
            }
            if let Some(rest) = scratch.strip_prefix(PSS_LABEL.as_bytes()) {
                total += leading_u64(&String::from_utf8_lossy(rest)).unwrap_or(0);
            }
        }
        Ok(total)
    }
}

/// Probe the first record of an `smaps` file and pick a decoder.
///
/// Returns `Ok(None)` when the file has no mappings (kernel threads), in
/// which case the probe should be retried on another process.
pub fn detect_layout(
    reader: &mut dyn BufRead,
    scratch: &mut Vec<u8>,
) -> io::Result<Option<Box<dyn SmapsDecoder>>> {
    scratch.clear();
    if reader.read_until(b'\n', scratch)? == 0 {
        return Ok(None);
    }

    let mut fields: Vec<Vec<u8>> = Vec::new();
    loop {
        scratch.clear();
        if reader.read_until(b'\n', scratch)? == 0 {
            break;
        }
        if is_mapping_header(scratch) {
            break;
        }
        fields.push(scratch.clone());
    }

    Ok(Some(classify_record(&fields)))
}

fn classify_record(fields: &[Vec<u8>]) -> Box<dyn SmapsDecoder> {
    let trailing_vmflags = fields.last().is_some_and(|l| l.starts_with(VMFLAGS_LABEL.as_bytes()));
    let fixed = if trailing_vmflags { &fields[..fields.len() - 1] } else { fields };

    let is_fixed = fixed.len() > PSS_LINE
        && fixed.iter().all(|l| l.len() == FIELD_LINE_WIDTH && l.ends_with(b"\n"))
        && fixed[PSS_LINE].starts_with(PSS_LABEL.as_bytes());

    if is_fixed {
        Box::new(FixedLayoutDecoder { field_lines: fixed.len(), trailing_vmflags })
    } else {
        Box::new(LineScanDecoder)
    }
}

/// `start-end ...` where start and end are hex addresses.
fn is_mapping_header(line: &[u8]) -> bool {
    let first = line.split(|b| b.is_ascii_whitespace()).next().unwrap_or_default();
    let mut halves = first.splitn(2, |&b| b == b'-');
    match (halves.next(), halves.next()) {
        (Some(start), Some(end)) => {
            !start.is_empty()
                && !end.is_empty()
                && start.iter().all(u8::is_ascii_hexdigit)
                && end.iter().all(u8::is_ascii_hexdigit)
        }
        _ => false,
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{legacy, modern};
    use super::*;
    use std::io::Cursor;

    fn detect(content: &str) -> Option<Box<dyn SmapsDecoder>> {
        let mut scratch = Vec::new();
        detect_layout(&mut Cursor::new(content.as_bytes()), &mut scratch).unwrap()
    }

    fn sum(decoder: &dyn SmapsDecoder, content: &str) -> u64 {
        let mut scratch = Vec::new();
        decoder.sum_pss(&mut Cursor::new(content.as_bytes()), &mut scratch).unwrap()
    }

    #[test]
    fn test_detect_legacy_layout() {
        let decoder = detect(&legacy(&[10, 20], false)).unwrap();
        assert_eq!(decoder.name(), "fixed-width");
    }

    #[test]
    fn test_detect_legacy_layout_with_vmflags() {
        let decoder = detect(&legacy(&[10], true)).unwrap();
        assert_eq!(decoder.name(), "fixed-width+vmflags");
    }

    #[test]
    fn test_detect_modern_layout_falls_back_to_line_scan() {
        let decoder = detect(&modern(&[10])).unwrap();
        assert_eq!(decoder.name(), "line-scan");
    }

    #[test]
    fn test_detect_empty_file() {
        assert!(detect("").is_none());
    }

    #[test]
    fn test_fixed_decoder_sums_pss() {
        let decoder =
            FixedLayoutDecoder { field_lines: LEGACY_FIELD_LINES, trailing_vmflags: false };
        assert_eq!(sum(&decoder, &legacy(&[10, 20, 300], false)), 330);
    }

    #[test]
    fn test_fixed_decoder_with_vmflags_sums_pss() {
        let decoder =
            FixedLayoutDecoder { field_lines: LEGACY_FIELD_LINES, trailing_vmflags: true };
        assert_eq!(sum(&decoder, &legacy(&[1, 2, 3, 4], true)), 10);
    }

    #[test]
    fn test_fixed_decoder_stops_on_truncated_record() {
        let decoder =
            FixedLayoutDecoder { field_lines: LEGACY_FIELD_LINES, trailing_vmflags: false };
        let mut content = legacy(&[5, 7], false);
        content.truncate(content.len() - 10);
        assert_eq!(sum(&decoder, &content), 5);
    }

    #[test]
    fn test_line_scan_ignores_pss_variants() {
        assert_eq!(sum(&LineScanDecoder, &modern(&[40, 2])), 42);
    }

    #[test]
    fn test_detected_decoder_reads_whole_file() {
        let content = legacy(&[8, 16], true);
        let decoder = detect(&content).unwrap();
        assert_eq!(sum(decoder.as_ref(), &content), 24);
    }

    #[test]
    fn test_is_mapping_header() {
        assert!(is_mapping_header(b"00400000-0040b000 r-xp 00000000 08:01 1 /bin/cat\n"));
        assert!(!is_mapping_header(b"Pss:                   4 kB\n"));
        assert!(!is_mapping_header(b"VmFlags: rd ex\n"));
    }
}
