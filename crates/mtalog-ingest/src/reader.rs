//! Streaming, lossy line reader for MTA log files
//!
//! Log files are scanned line by line without loading them into memory.
//! Invalid UTF-8 is replaced with U+FFFD instead of failing the scan, and
//! trailing `\n` / `\r\n` are stripped.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Iterator over the lines of a reader, decoded lossily
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(512),
        }
    }
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                }
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            },
            Err(e) => Some(Err(e)),
        }
    }
}

/// Open `path` for a read-only scan.
///
/// Returns `Ok(None)` when the file does not exist; any other failure is an
/// error.
pub fn open_lines(path: &Path) -> io::Result<Option<LossyLines<BufReader<File>>>> {
    match File::open(path) {
        Ok(file) => Ok(Some(LossyLines::new(BufReader::new(file)))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_strips_line_endings() {
        let lines: Vec<String> = LossyLines::new(Cursor::new("one\r\ntwo\nthree"))
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let bytes: &[u8] = b"Subject: caf\xe9 ok\nnext\n";
        let lines: Vec<String> = LossyLines::new(Cursor::new(bytes))
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Subject: caf\u{FFFD} ok");
        assert_eq!(lines[1], "next");
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_lines(&dir.path().join("absent.log")).unwrap();
        assert!(result.is_none());
    }
}
