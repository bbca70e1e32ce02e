//! PID file access. Workers write their PID files; the controller only reads and deletes them.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

// A PID never needs more than this; anything longer is garbage anyway.
const MAX_PID_FILE_LEN: u64 = 64;

/// Scans one integer from the start of `text` the way a C `%li` scan would:
/// leading whitespace, an optional sign, then digits. Trailing content is ignored.
///
/// Returns `None` for anything that is not a positive PID that fits in `u32`.
pub fn scan_pid(text: &str) -> Option<u32> {
    let s = text.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let value: u64 = digits[..end].parse().ok()?;
    if negative || value == 0 {
        return None;
    }
    u32::try_from(value).ok()
}

/// Reads a PID file. Any I/O or parse failure is reported as "no PID".
pub fn read(path: &Path) -> Option<u32> {
    let mut buf = Vec::with_capacity(MAX_PID_FILE_LEN as usize);
    File::open(path)
        .and_then(|f| f.take(MAX_PID_FILE_LEN).read_to_end(&mut buf))
        .ok()?;
    scan_pid(&String::from_utf8_lossy(&buf))
}

/// Deletes a PID file; a file that is already gone is not an error.
pub fn remove(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
