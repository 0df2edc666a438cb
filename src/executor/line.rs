// src/executor/line.rs

//! Reassembly of line records from arbitrary byte chunks
//!
//! Pipes and network reads split data wherever they like. A chunk boundary
//! is not a record boundary: bytes are held until a `\n` arrives, and only
//! whole lines come out.

/// Longest line kept before a forced split
pub const DEFAULT_MAX_LINE: usize = 64 * 1024;

/// Byte buffer that yields complete lines
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }

    /// No forced splits; for framed records the producer already bounds
    pub fn unbounded() -> Self {
        Self {
            pending: Vec::new(),
            max_line: usize::MAX,
        }
    }

    /// Lines longer than `max_line` bytes are emitted in pieces
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line: max_line.max(1),
        }
    }

    /// Add a chunk and take every line it completes
    ///
    /// Line terminators (`\n` or `\r\n`) are stripped. Invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.extend(&rest[..pos], &mut lines);
            rest = &rest[pos + 1..];
            lines.push(take_line(&mut self.pending));
        }
        self.extend(rest, &mut lines);

        lines
    }

    fn extend(&mut self, bytes: &[u8], lines: &mut Vec<String>) {
        self.pending.extend_from_slice(bytes);
        while self.pending.len() > self.max_line {
            let tail = self.pending.split_off(self.max_line);
            lines.push(take_line(&mut self.pending));
            self.pending = tail;
        }
    }

    /// Take the trailing partial line at end of input
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(take_line(&mut self.pending))
        }
    }

    /// Bytes held for an incomplete line
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn take_line(buf: &mut Vec<u8>) -> String {
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    line
}
