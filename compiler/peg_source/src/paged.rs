//! File-backed source buffer with a FIFO page cache.
//!
//! The input is read in aligned pages of [`PAGE_SIZE`] bytes. Up to
//! `capacity` pages stay resident and are evicted in the order they were
//! loaded, regardless of later use. A capacity of zero keeps only the page
//! most recently loaded.
//!
//! Line numbers come from a per-page index holding the number of newlines
//! before each page. An entry is filled when its page is loaded right after
//! its predecessor (the common forward scan). Entries still missing when a
//! line number is asked for are backfilled by scanning the pages between the
//! nearest known entry and the target, so any access order gives the same
//! answers.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::{SourceBuffer, SourceError, EOF};

pub const PAGE_SIZE: usize = 4096;
pub const DEFAULT_CACHE_PAGES: usize = 8;

const PAGE: u64 = PAGE_SIZE as u64;

static ZERO_PAGE: [u8; PAGE_SIZE] = [0; PAGE_SIZE];

type Page = Box<[u8]>;

pub struct PagedSource<R = File> {
    name: Box<str>,
    start_line: u64,
    reader: R,
    len: u64,
    capacity: usize,
    pages: FxHashMap<u64, Page>,
    /// Resident page indices, oldest first.
    order: VecDeque<u64>,
    /// The one resident page when `capacity` is zero.
    single: Option<(u64, Page)>,
    /// Newlines before each page; `None` until computed.
    lines: Vec<Option<u64>>,
}

impl PagedSource<File> {
    /// Open `path` with the default cache of [`DEFAULT_CACHE_PAGES`] pages.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        Self::open_with_capacity(path, DEFAULT_CACHE_PAGES)
    }

    pub fn open_with_capacity(path: impl AsRef<Path>, capacity: usize) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SourceError::io(path, e))?;
        Self::from_reader(&path.display().to_string(), file, capacity)
            .map_err(|e| SourceError::io(path, e))
    }
}

impl<R: Read + Seek> PagedSource<R> {
    /// Wrap any seekable reader. Its length is taken once, here.
    pub fn from_reader(name: &str, mut reader: R, capacity: usize) -> io::Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        let mut lines = vec![None; (len / PAGE) as usize + 1];
        lines[0] = Some(0);
        debug!(resource = name, len, capacity, "paged source opened");
        let mut source = PagedSource {
            name: name.into(),
            start_line: 1,
            reader,
            len,
            capacity,
            pages: FxHashMap::default(),
            order: VecDeque::with_capacity(capacity),
            single: None,
            lines,
        };
        source.page(0);
        Ok(source)
    }

    /// Report the first line as `line` instead of 1.
    #[must_use]
    pub fn with_start_line(mut self, line: u64) -> Self {
        self.start_line = line;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Indices of the resident pages, oldest first.
    pub fn resident_pages(&self) -> Vec<u64> {
        if self.capacity == 0 {
            self.single.iter().map(|(index, _)| *index).collect()
        } else {
            self.order.iter().copied().collect()
        }
    }

    /// Make page `index` resident and return it.
    fn page(&mut self, index: u64) -> &[u8] {
        if self.capacity == 0 {
            if !matches!(&self.single, Some((i, _)) if *i == index) {
                let mut buf = match self.single.take() {
                    Some((previous, buf)) => {
                        if index.checked_sub(1) == Some(previous) {
                            record_line_start(&mut self.lines, index, &buf);
                        }
                        buf
                    }
                    None => vec![0; PAGE_SIZE].into_boxed_slice(),
                };
                read_page(&mut self.reader, &self.name, index, &mut buf);
                self.single = Some((index, buf));
            }
            return self.single.as_ref().map_or(&ZERO_PAGE[..], |(_, buf)| &buf[..]);
        }

        if !self.pages.contains_key(&index) {
            let mut buf: Page = vec![0; PAGE_SIZE].into_boxed_slice();
            read_page(&mut self.reader, &self.name, index, &mut buf);
            if self.order.len() >= self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.pages.remove(&evicted);
                    trace!(page = evicted, "page evicted");
                }
            }
            self.order.push_back(index);
            self.pages.insert(index, buf);
            if let Some(previous) = index.checked_sub(1).and_then(|i| self.pages.get(&i)) {
                record_line_start(&mut self.lines, index, previous);
            }
        }
        self.pages.get(&index).map_or(&ZERO_PAGE[..], |buf| &buf[..])
    }

    /// Newlines before page `index`, backfilling the index as needed.
    fn lines_before_page(&mut self, index: u64) -> u64 {
        let target = index as usize;
        if let Some(count) = self.lines[target] {
            return count;
        }
        let mut known = target;
        while known > 0 && self.lines[known].is_none() {
            known -= 1;
        }
        trace!(from = known, to = target, "backfilling line index");

        let mut scratch: Option<Page> = None;
        for k in known..target {
            let page = k as u64;
            let newlines = match resident_page(&self.pages, &self.single, page) {
                Some(buf) => count_newlines(buf),
                None => {
                    let buf = scratch.get_or_insert_with(|| vec![0; PAGE_SIZE].into_boxed_slice());
                    read_page(&mut self.reader, &self.name, page, buf);
                    count_newlines(buf)
                }
            };
            let before = self.lines[k].unwrap_or(0);
            self.lines[k + 1] = Some(before + newlines);
        }
        self.lines[target].unwrap_or(0)
    }
}

impl<R: Read + Seek> SourceBuffer for PagedSource<R> {
    fn resource_name(&self) -> &str {
        &self.name
    }

    fn start_line(&self) -> u64 {
        self.start_line
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn byte_at(&mut self, pos: u64) -> u8 {
        if pos >= self.len {
            return EOF;
        }
        self.page(pos / PAGE)[(pos % PAGE) as usize]
    }

    fn matches(&mut self, pos: u64, text: &[u8]) -> bool {
        let Some(end) = pos.checked_add(text.len() as u64) else {
            return false;
        };
        if end > self.len {
            return false;
        }
        let offset = (pos % PAGE) as usize;
        if offset + text.len() <= PAGE_SIZE {
            return &self.page(pos / PAGE)[offset..offset + text.len()] == text;
        }
        self.subbytes(pos, end) == text
    }

    /// Copies page by page when the range crosses page boundaries.
    fn subbytes(&mut self, start: u64, end: u64) -> Vec<u8> {
        let end = end.min(self.len);
        let mut at = start.min(end);
        let mut out = Vec::with_capacity((end - at) as usize);
        while at < end {
            let offset = (at % PAGE) as usize;
            let take = (end - at).min(PAGE - offset as u64) as usize;
            out.extend_from_slice(&self.page(at / PAGE)[offset..offset + take]);
            at += take as u64;
        }
        out
    }

    fn line_number(&mut self, pos: u64) -> u64 {
        let pos = pos.min(self.len);
        let index = pos / PAGE;
        let offset = (pos % PAGE) as usize;
        let within = count_newlines(&self.page(index)[..offset]);
        self.start_line + self.lines_before_page(index) + within
    }
}

fn count_newlines(bytes: &[u8]) -> u64 {
    bytes.iter().filter(|&&b| b == b'\n').count() as u64
}

/// Fill in the line index entry for `index` from its predecessor page.
fn record_line_start(lines: &mut [Option<u64>], index: u64, previous: &[u8]) {
    let i = index as usize;
    if i == 0 || i >= lines.len() || lines[i].is_some() {
        return;
    }
    if let Some(before) = lines[i - 1] {
        lines[i] = Some(before + count_newlines(previous));
    }
}

fn resident_page<'a>(
    pages: &'a FxHashMap<u64, Page>,
    single: &'a Option<(u64, Page)>,
    index: u64,
) -> Option<&'a [u8]> {
    match single {
        Some((i, buf)) if *i == index => Some(&buf[..]),
        _ => pages.get(&index).map(|buf| &buf[..]),
    }
}

/// Read page `index` into `buf`, zero-filling whatever the reader does not
/// supply. A failed read leaves the whole page zeroed, which reads as end of
/// input.
fn read_page<R: Read + Seek>(reader: &mut R, name: &str, index: u64, buf: &mut [u8]) {
    let filled = match fill(reader, index * PAGE, buf) {
        Ok(n) => n,
        Err(err) => {
            warn!(resource = name, page = index, %err, "page read failed");
            0
        }
    };
    buf[filled..].fill(0);
}

fn fill<R: Read + Seek>(reader: &mut R, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
