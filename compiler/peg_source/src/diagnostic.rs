//! Position excerpts for diagnostics.

use std::fmt;

use crate::utf8::is_continuation;
use crate::{SourceBuffer, EOF};

/// Look back at most this many bytes for the start of the excerpt.
const MAX_BEFORE: u64 = 60;
/// Cap on the excerpt width.
const MAX_WIDTH: u64 = 78;

/// Severity label in `[kind]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Error,
    Warning,
    Notice,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageKind::Error => "error",
            MessageKind::Warning => "warning",
            MessageKind::Notice => "notice",
        })
    }
}

/// `delim`, the excerpt around `pos`, `delim`, then a marker line with `^`
/// under `pos`.
///
/// Newlines inside the excerpt print as `\N` and tabs as four spaces, with
/// the marker line padded to match. Continuation bytes of a multi-byte
/// character take no marker column.
pub(crate) fn text_around<S: SourceBuffer + ?Sized>(src: &mut S, pos: u64, delim: &str) -> String {
    let len = src.len();
    let mut pos = pos;
    while pos > 0 && src.byte_at(pos) == EOF {
        pos -= 1;
    }

    let mut start = pos;
    while start > 0 {
        let ch = src.byte_at(start);
        if ch == b'\n' && start < pos {
            start += 1;
            break;
        }
        if pos - start > MAX_BEFORE && ch.is_ascii() {
            break;
        }
        start -= 1;
    }

    let mut end = pos + 1;
    if end < len {
        loop {
            let ch = src.byte_at(end);
            if ch == EOF || ch == b'\n' || (end - start > MAX_WIDTH && ch.is_ascii()) {
                break;
            }
            end += 1;
        }
    } else {
        end = len;
    }

    let mut source = Vec::new();
    let mut marker = String::new();
    for i in start..end {
        let ch = src.byte_at(i);
        let here = i == pos;
        match ch {
            b'\n' => {
                source.extend_from_slice(b"\\N");
                marker.push_str(if here { "^^" } else { "\\N" });
            }
            b'\t' => {
                source.extend_from_slice(b"    ");
                marker.push_str(if here { "^^^^" } else { "    " });
            }
            _ => {
                source.push(ch);
                if here {
                    marker.push('^');
                } else if !is_continuation(ch) {
                    marker.push(' ');
                }
            }
        }
    }

    let source = String::from_utf8_lossy(&source);
    format!("{delim}{source}{delim}{marker}")
}
