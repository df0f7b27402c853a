// Companion - platform/fs.rs
//
// Filesystem helpers for reading node query logs.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Read at most `max_bytes` from the end of the file at `path`, decoded as
/// lossy UTF-8.
///
/// When the file is larger than `max_bytes` the read starts mid-file, so the
/// first (partial) line is discarded. Only complete lines are returned.
pub fn read_tail_lossy(path: &Path, max_bytes: usize) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();
    // Start one byte early so a cut that lands exactly on a line start keeps
    // that line: the byte before it is then the '\n' discarded below.
    let offset = size.saturating_sub(max_bytes as u64 + 1);

    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity((size - offset) as usize);
    file.take(max_bytes as u64 + 1).read_to_end(&mut buf)?;

    let text = String::from_utf8_lossy(&buf).into_owned();
    if offset == 0 {
        return Ok(text);
    }

    match text.find('\n') {
        Some(nl) => Ok(text[nl + 1..].to_string()),
        None => Ok(String::new()),
    }
}
