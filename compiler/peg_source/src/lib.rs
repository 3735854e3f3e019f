//! Source buffers for the PEG virtual machine.
//!
//! A [`SourceBuffer`] gives byte, UTF-8 and line-number access to one input
//! and formats diagnostics against positions in it. Two implementations:
//! - [`StringSource`]: the whole input resident in memory
//! - [`PagedSource`]: a large file read through a small FIFO page cache
//!
//! [`load_source`] picks one by file size.
//!
//! Positions are byte offsets. Reading at or past [`SourceBuffer::len`]
//! yields [`EOF`], which is also the value of a literal NUL byte; the two
//! cannot be told apart.

mod diagnostic;
mod error;
mod paged;
mod string;
mod utf8;

use std::fs;
use std::path::Path;

pub use diagnostic::MessageKind;
pub use error::SourceError;
pub use paged::{PagedSource, DEFAULT_CACHE_PAGES, PAGE_SIZE};
pub use string::StringSource;
pub use utf8::utf8_len;

/// Byte returned for positions past the end of input.
pub const EOF: u8 = 0;

/// Files larger than this are opened as a [`PagedSource`].
pub const PAGED_THRESHOLD: u64 = 16 * 1024;

/// Uniform access to one input.
///
/// Methods take `&mut self` because a paged buffer changes its resident
/// pages on every out-of-page access.
pub trait SourceBuffer {
    /// Name used in diagnostics (file path or `(string)`).
    fn resource_name(&self) -> &str;

    /// Line number reported for the first line.
    fn start_line(&self) -> u64;

    /// Total number of bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The byte at `pos`, or [`EOF`] at or past the end.
    fn byte_at(&mut self, pos: u64) -> u8;

    /// Whether `text` occurs at `pos`. False when it would run past the end.
    fn matches(&mut self, pos: u64, text: &[u8]) -> bool;

    /// Bytes in `start..end`, clamped to the input.
    fn subbytes(&mut self, start: u64, end: u64) -> Vec<u8>;

    /// Text in `start..end`; invalid UTF-8 is replaced.
    fn substring(&mut self, start: u64, end: u64) -> String {
        String::from_utf8_lossy(&self.subbytes(start, end)).into_owned()
    }

    /// Line containing `pos`, counted from [`start_line`](Self::start_line).
    fn line_number(&mut self, pos: u64) -> u64;

    /// Code point whose encoding starts at `pos`.
    fn codepoint_at(&mut self, pos: u64) -> u32 {
        let lead = self.byte_at(pos);
        let mut rest = [0; 3];
        for (i, slot) in rest.iter_mut().enumerate().take(utf8_len(lead) - 1) {
            *slot = self.byte_at(pos + 1 + i as u64);
        }
        utf8::decode(lead, rest)
    }

    /// Encoded length of the code point at `pos`.
    fn codepoint_len(&mut self, pos: u64) -> usize {
        utf8_len(self.byte_at(pos))
    }

    /// Position of the first byte of the line containing `pos`.
    fn line_start(&mut self, pos: u64) -> u64 {
        let mut start = pos.min(self.len());
        while start > 0 && self.byte_at(start - 1) != b'\n' {
            start -= 1;
        }
        start
    }

    /// Indentation at `pos`: the line's leading spaces and tabs. When more
    /// than one other byte sits between them and `pos`, a space for each of
    /// those bytes follows.
    fn indent_text(&mut self, pos: u64) -> String {
        let start = self.line_start(pos);
        let mut ws_end = start;
        while ws_end < pos && matches!(self.byte_at(ws_end), b' ' | b'\t') {
            ws_end += 1;
        }
        let mut indent = self.substring(start, ws_end);
        if ws_end + 1 < pos {
            indent.extend(std::iter::repeat(' ').take((pos - ws_end) as usize));
        }
        indent
    }

    /// `(name:line) [kind] message`
    fn format_position_message(&mut self, kind: MessageKind, pos: u64, message: &str) -> String {
        let line = self.line_number(pos);
        format!("({}:{line}) [{kind}] {message}", self.resource_name())
    }

    /// The position message followed by an excerpt of the surrounding text
    /// and a caret line under `pos`.
    fn format_position_line(&mut self, kind: MessageKind, pos: u64, message: &str) -> String {
        let mut out = self.format_position_message(kind, pos, message);
        out.push_str(&diagnostic::text_around(self, pos, "\n "));
        out
    }
}

/// Open `path`, in memory when small and paged otherwise.
///
/// The bytes are kept as read. Line endings are not normalized, so a CRLF
/// file keeps its `\r` bytes in excerpts and counts lines by `\n` alone.
pub fn load_source(path: impl AsRef<Path>) -> Result<Box<dyn SourceBuffer>, SourceError> {
    let path = path.as_ref();
    let size = fs::metadata(path)
        .map_err(|e| SourceError::io(path, e))?
        .len();
    if size > PAGED_THRESHOLD {
        return Ok(Box::new(PagedSource::open(path)?));
    }
    let bytes = fs::read(path).map_err(|e| SourceError::io(path, e))?;
    Ok(Box::new(StringSource::with_name(
        &path.display().to_string(),
        1,
        bytes,
    )))
}
