//! Line-oriented reading over a [`Volume`] file with a fixed buffer.

use core::mem;

use thiserror_no_std::Error;

use super::{ErrorDetail, Volume, error_detail};

/// Default read buffer size; comfortably above the longest CSV row.
pub const LINE_CAPACITY: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("read failed: {0}")]
    Io(ErrorDetail),
    #[error("line longer than the read buffer")]
    TooLong,
    #[error("line is not valid UTF-8")]
    NotUtf8,
}

/// Splits a file into `\n`-terminated lines (a preceding `\r` is dropped).
///
/// A line that does not fit in `N` bytes is reported once as
/// [`LineError::TooLong`] and skipped; reading then continues with the next
/// line. Reaching the end of the file is not sticky: a later call picks up
/// anything appended in the meantime.
pub struct LineReader<F, const N: usize = LINE_CAPACITY> {
    file: F,
    buf: [u8; N],
    start: usize,
    end: usize,
    /// Dropping the tail of an over-long line
    discarding: bool,
    /// File offset of `buf[start]`
    consumed: u64,
    /// Bytes still to drop from upcoming reads when resuming
    skip: u64,
}

impl<F, const N: usize> LineReader<F, N> {
    pub fn new(file: F) -> Self {
        Self::resume(file, 0)
    }

    /// Continue a file from `offset`, as returned by [`LineReader::consumed`]
    /// on an earlier reader of the same file.
    pub fn resume(file: F, offset: u64) -> Self {
        Self {
            file,
            buf: [0; N],
            start: 0,
            end: 0,
            discarding: false,
            consumed: offset,
            skip: offset,
        }
    }

    /// Offset of the first byte not yet returned as part of a line.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn into_file(self) -> F {
        self.file
    }

    /// Read the next line, or `Ok(None)` at end of file.
    pub fn next_line<V>(&mut self, volume: &mut V) -> Result<Option<&str>, LineError>
    where
        V: Volume<File = F>,
    {
        let mut at_eof = false;

        let (from, to) = loop {
            if let Some(pos) = self.buf[self.start..self.end].iter().position(|&b| b == b'\n') {
                let from = self.start;
                let to = from + pos;
                self.advance(to + 1);
                if mem::take(&mut self.discarding) {
                    continue;
                }
                break (from, to);
            }

            if at_eof {
                if self.start == self.end {
                    return Ok(None);
                }
                // Unterminated last line
                let (from, to) = (self.start, self.end);
                self.advance(to);
                if mem::take(&mut self.discarding) {
                    return Ok(None);
                }
                break (from, to);
            }

            if self.start > 0 {
                self.buf.copy_within(self.start..self.end, 0);
                self.end -= self.start;
                self.start = 0;
            }

            if self.end == N {
                let was_discarding = mem::replace(&mut self.discarding, true);
                self.advance(self.end);
                if !was_discarding {
                    return Err(LineError::TooLong);
                }
                continue;
            }

            let read = volume
                .read(&mut self.file, &mut self.buf[self.end..])
                .map_err(|e| LineError::Io(error_detail(&e)))?;
            if read == 0 {
                at_eof = true;
                continue;
            }
            self.take_read(read);
        };

        let line = &self.buf[from..to];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        core::str::from_utf8(line)
            .map(Some)
            .map_err(|_| LineError::NotUtf8)
    }

    fn advance(&mut self, to: usize) {
        self.consumed += (to - self.start) as u64;
        self.start = to;
    }

    /// Account for `read` fresh bytes at `buf[end..]`, dropping any still owed
    /// to a resume offset.
    fn take_read(&mut self, read: usize) {
        let skipped = self.skip.min(read as u64) as usize;
        if skipped > 0 {
            self.buf
                .copy_within(self.end + skipped..self.end + read, self.end);
            self.skip -= skipped as u64;
        }
        self.end += read - skipped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryVolume, OpenMode};
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;

    fn volume_with(contents: &[u8]) -> MemoryVolume {
        let mut volume = MemoryVolume::new();
        volume.insert("lines.txt", contents);
        volume.attach().unwrap();
        volume
    }

    fn collect<const N: usize>(
        volume: &mut MemoryVolume,
        reader: &mut LineReader<<MemoryVolume as Volume>::File, N>,
    ) -> Vec<Result<String, LineError>> {
        let mut out = Vec::new();
        loop {
            match reader.next_line(volume) {
                Ok(Some(line)) => out.push(Ok(line.to_string())),
                Ok(None) => break,
                Err(e) => out.push(Err(e)),
            }
        }
        out
    }

    #[test]
    fn test_splits_crlf_and_lf() {
        let mut volume = volume_with(b"one\r\ntwo\nthree");
        let file = volume.open("lines.txt", OpenMode::Read).unwrap();
        let mut reader = LineReader::<_, 16>::new(file);

        let lines = collect(&mut volume, &mut reader);
        assert_eq!(
            lines,
            ["one", "two", "three"].map(|s| Ok::<_, LineError>(s.to_string())).to_vec()
        );
        assert_eq!(reader.consumed(), 14);
    }

    #[test]
    fn test_lines_span_buffer_refills() {
        // Buffer of 8 forces several compactions across these lines
        let mut volume = volume_with(b"abcde\nfghij\nklmno\n");
        let file = volume.open("lines.txt", OpenMode::Read).unwrap();
        let mut reader = LineReader::<_, 8>::new(file);

        let lines = collect(&mut volume, &mut reader);
        assert_eq!(
            lines,
            ["abcde", "fghij", "klmno"].map(|s| Ok::<_, LineError>(s.to_string())).to_vec()
        );
    }

    #[test]
    fn test_too_long_line_is_skipped_once() {
        let mut volume = volume_with(b"ok\nthis-line-is-way-too-long\nafter\n");
        let file = volume.open("lines.txt", OpenMode::Read).unwrap();
        let mut reader = LineReader::<_, 8>::new(file);

        let lines = collect(&mut volume, &mut reader);
        assert_eq!(
            lines,
            alloc::vec![
                Ok("ok".to_string()),
                Err(LineError::TooLong),
                Ok("after".to_string()),
            ]
        );
    }

    #[test]
    fn test_resume_continues_after_offset() {
        let mut volume = volume_with(b"first\nsecond\nthird\n");
        let file = volume.open("lines.txt", OpenMode::Read).unwrap();
        let mut reader = LineReader::<_, 16>::new(file);
        assert_eq!(reader.next_line(&mut volume).unwrap(), Some("first"));
        let offset = reader.consumed();
        volume.close(reader.into_file()).unwrap();

        let file = volume.open("lines.txt", OpenMode::Read).unwrap();
        let mut reader = LineReader::<_, 16>::resume(file, offset);
        assert_eq!(reader.next_line(&mut volume).unwrap(), Some("second"));
        assert_eq!(reader.next_line(&mut volume).unwrap(), Some("third"));
        assert_eq!(reader.next_line(&mut volume).unwrap(), None);
    }

    #[test]
    fn test_end_of_file_is_not_sticky() {
        let mut volume = volume_with(b"a\n");
        let file = volume.open("lines.txt", OpenMode::Read).unwrap();
        let mut reader = LineReader::<_, 16>::new(file);
        assert_eq!(reader.next_line(&mut volume).unwrap(), Some("a"));
        assert_eq!(reader.next_line(&mut volume).unwrap(), None);

        let mut writer = volume.open("lines.txt", OpenMode::Append).unwrap();
        volume.write(&mut writer, b"b\n").unwrap();
        volume.close(writer).unwrap();

        assert_eq!(reader.next_line(&mut volume).unwrap(), Some("b"));
    }
}
