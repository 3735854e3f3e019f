//! In-memory source buffer.

use crate::{SourceBuffer, EOF};

/// The whole input held as one byte array with a trailing NUL.
#[derive(Clone, Debug)]
pub struct StringSource {
    name: Box<str>,
    start_line: u64,
    /// Input bytes followed by one `EOF`.
    bytes: Box<[u8]>,
}

impl StringSource {
    /// An anonymous source named `(string)` starting at line 1.
    pub fn new(text: impl AsRef<[u8]>) -> Self {
        Self::with_name("(string)", 1, text)
    }

    /// A source reported as `name`, whose first line is `start_line`.
    pub fn with_name(name: &str, start_line: u64, text: impl AsRef<[u8]>) -> Self {
        let text = text.as_ref();
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text);
        bytes.push(EOF);
        StringSource {
            name: name.into(),
            start_line,
            bytes: bytes.into_boxed_slice(),
        }
    }

    #[inline]
    fn text(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 1]
    }

    #[inline]
    fn clamp(&self, pos: u64) -> usize {
        usize::try_from(pos).map_or(self.text().len(), |p| p.min(self.text().len()))
    }
}

impl SourceBuffer for StringSource {
    fn resource_name(&self) -> &str {
        &self.name
    }

    fn start_line(&self) -> u64 {
        self.start_line
    }

    fn len(&self) -> u64 {
        self.text().len() as u64
    }

    #[inline]
    fn byte_at(&mut self, pos: u64) -> u8 {
        usize::try_from(pos)
            .ok()
            .and_then(|p| self.bytes.get(p))
            .copied()
            .unwrap_or(EOF)
    }

    fn matches(&mut self, pos: u64, text: &[u8]) -> bool {
        let start = self.clamp(pos);
        if start as u64 != pos {
            return false;
        }
        self.text()
            .get(start..start + text.len())
            .is_some_and(|window| window == text)
    }

    fn subbytes(&mut self, start: u64, end: u64) -> Vec<u8> {
        let end = self.clamp(end);
        let start = self.clamp(start).min(end);
        self.text()[start..end].to_vec()
    }

    /// Counts newlines from the start of input on every call.
    fn line_number(&mut self, pos: u64) -> u64 {
        let end = self.clamp(pos);
        let newlines = self.text()[..end].iter().filter(|&&b| b == b'\n').count();
        self.start_line + newlines as u64
    }
}
