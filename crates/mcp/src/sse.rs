/// Splits an event stream into lines, tolerating chunk boundaries
/// anywhere, including inside a multi-byte character.
#[derive(Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Appends a chunk and returns the lines it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    /// Returns whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = vec![];
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            push_line(&mut lines, &self.buf[start..end]);
            start = end + 1;
        }
        if flush {
            push_line(&mut lines, &self.buf[start..]);
            self.buf.clear();
        } else {
            self.buf.drain(..start);
        }
        lines
    }
}

fn push_line(lines: &mut Vec<String>, raw: &[u8]) {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    match str::from_utf8(raw) {
        Ok(line) if !line.trim().is_empty() => lines.push(line.to_owned()),
        Ok(_) => {}
        Err(_) => warn!("dropping a non-UTF-8 event stream line"),
    }
}

/// Returns the payload of a `data:` line.
#[inline]
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_lines() {
        let mut buf = LineBuffer::default();
        assert_eq!(
            buf.push(b"event: message\r\ndata: {\"id\""),
            vec!["event: message"]
        );
        assert_eq!(buf.push(b":1}\r\n\r\n"), vec!["data: {\"id\":1}"]);
        assert!(buf.finish().is_empty());
    }

    #[test]
    fn test_flush_unterminated_line() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"data: tail").is_empty());
        assert_eq!(buf.finish(), vec!["data: tail"]);
    }

    #[test]
    fn test_data_payload() {
        assert_eq!(data_payload("data: {\"id\":1}"), Some("{\"id\":1}"));
        assert_eq!(data_payload("data:{}"), Some("{}"));
        assert_eq!(data_payload("event: message"), None);
    }
}
