// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

//! Bounded line assembly for decoded events.
//!
//! The platform drives the decode callback on a thread it owns, so per-event
//! output goes through one fixed-capacity buffer instead of growing
//! allocations. Writes that do not fit are truncated, never buffered past
//! capacity, and the buffer is handed to the sink as one atomic flush.

use std::fmt;

/// Receives the flushed buffers, one or more per accepted event.
pub trait TraceSink {
    fn puts(&mut self, text: &str);
}

pub struct StdoutSink;

impl TraceSink for StdoutSink {
    fn puts(&mut self, text: &str) {
        use std::io::Write;

        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = lock.write_all(text.as_bytes());
        let _ = lock.flush();
    }
}

pub struct LineBuf {
    buf: String,
    capacity: usize,
    width: usize,
}

struct Truncating<'a> {
    buf: &'a mut String,
    left: usize,
    written: usize,
}

impl fmt::Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if s.len() <= self.left {
            self.buf.push_str(s);
            self.left -= s.len();
            self.written += s.len();
            return Ok(());
        }
        // cut back to a char boundary
        let mut end = self.left;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.push_str(&s[..end]);
        self.written += end;
        self.left = 0;
        Err(fmt::Error)
    }
}

impl LineBuf {
    pub fn new(capacity: usize, width: usize) -> Self {
        LineBuf {
            buf: String::with_capacity(capacity),
            capacity,
            width,
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Append formatted text, truncating at the capacity bound.
    /// Returns the number of bytes actually written, zero when full.
    pub fn add(&mut self, args: fmt::Arguments<'_>) -> usize {
        use fmt::Write;

        let left = self.remaining();
        if left == 0 {
            return 0;
        }
        let mut w = Truncating {
            buf: &mut self.buf,
            left,
            written: 0,
        };
        let _ = w.write_fmt(args);
        w.written
    }

    pub fn add_str(&mut self, s: &str) -> usize {
        self.add(format_args!("{}", s))
    }

    pub fn add_char(&mut self, c: char) -> usize {
        if self.remaining() < c.len_utf8() {
            return 0;
        }
        self.buf.push(c);
        c.len_utf8()
    }

    /// Append a long text field, breaking at `brk` (or `-`) whenever the
    /// rest of the current line cannot hold the next word, re-indenting
    /// each continuation by `indent`. Repeated break characters collapse.
    pub fn wrap_long_line(&mut self, text: &str, indent: usize, brk: char) {
        let chars = text.chars().collect::<Vec<char>>();
        let mut left = self.width.saturating_sub(indent);
        let mut start = 0;
        let mut c = 0;

        while c < chars.len() {
            let ch = chars[c];
            if ch == brk || ch == '-' {
                let next = chars[c + 1..]
                    .iter()
                    .position(|&x| x == brk)
                    .map(|p| c + 1 + p)
                    .unwrap_or(chars.len());

                if left < 2 || left <= next - c {
                    if brk != ' ' {
                        self.add_char(brk);
                    }
                    self.add_char('\n');
                    for _ in 0..indent {
                        self.add_char(' ');
                    }
                    left = self.width.saturating_sub(indent);
                    c += 1;
                    start = c;
                    continue;
                }

                // drop repeated break characters
                if c > start && (chars[c - 1] == brk || chars[c - 1] == '-') {
                    c += 1;
                    start = c;
                    continue;
                }
            }
            if self.add_char(chars[c]) == 0 {
                break;
            }
            c += 1;
            left = left.saturating_sub(1);
        }
        self.add_char('\n');
    }

    /// Hand the assembled text to the sink, then rewind.
    pub fn flush<S: TraceSink + ?Sized>(&mut self, sink: &mut S) {
        if !self.buf.is_empty() {
            sink.puts(&self.buf);
        }
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::{LineBuf, TraceSink};

    #[derive(Default)]
    struct Collector(Vec<String>);

    impl TraceSink for Collector {
        fn puts(&mut self, text: &str) {
            self.0.push(text.to_string());
        }
    }

    #[test]
    fn add_truncates_at_capacity() {
        let mut buf = LineBuf::new(10, 80);
        assert_eq!(buf.add(format_args!("0123456789abcdef")), 10);
        assert_eq!(buf.remaining(), 0);
        assert_eq!(buf.as_str(), "0123456789");
        // full buffer, nothing more fits
        assert_eq!(buf.add(format_args!("x")), 0);
        assert_eq!(buf.add_char('x'), 0);
        assert_eq!(buf.as_str().len(), 10);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut buf = LineBuf::new(5, 80);
        // 'é' is two bytes, the fifth byte would split it
        buf.add(format_args!("abcdé"));
        assert_eq!(buf.as_str(), "abcd");
        assert!(buf.remaining() >= 1);
    }

    #[test]
    fn flush_hands_over_and_resets() {
        let mut buf = LineBuf::new(100, 80);
        let mut sink = Collector::default();
        buf.add(format_args!("line one\n"));
        buf.flush(&mut sink);
        assert_eq!(sink.0, vec!["line one\n".to_string()]);
        assert!(buf.is_empty());
        // empty flush does not reach the sink
        buf.flush(&mut sink);
        assert_eq!(sink.0.len(), 1);
    }

    #[test]
    fn wrap_breaks_and_reindents() {
        let mut buf = LineBuf::new(1000, 20);
        buf.wrap_long_line("alpha\\beta\\gamma\\delta\\epsilon", 8, '\\');
        let text = buf.as_str().to_string();
        for line in text.lines().skip(1) {
            assert!(line.starts_with("        "), "line {:?} not indented", line);
        }
        assert!(text.contains('\n'));
    }

    #[test]
    fn wrap_collapses_repeated_breaks() {
        let mut buf = LineBuf::new(1000, 200);
        buf.wrap_long_line("a\\\\b--c", 0, '\\');
        assert_eq!(buf.as_str(), "a\\b-c\n");
    }

    #[test]
    fn wrap_without_break_chars_is_verbatim() {
        let mut buf = LineBuf::new(1000, 200);
        buf.wrap_long_line("plain", 4, '\\');
        assert_eq!(buf.as_str(), "plain\n");
    }
}
