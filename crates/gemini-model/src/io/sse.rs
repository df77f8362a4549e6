use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Bytes are buffered raw and only decoded once a whole event has been
/// received, so a multi-byte character split across chunks is fine.
pub struct Sse {
    buf: Vec<u8>,
    chunks: Chunks,
    eof: bool,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
            eof: false,
        }
    }

    /// Returns the `data` payload of the next event, or `None` when the
    /// stream has ended. Incomplete trailing data is discarded.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain what is already buffered before reading more, a
            // single chunk may carry several events.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }
            if self.eof {
                return Ok(None);
            }
            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.eof = true,
            }
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        // event         = *( comment / field ) end-of-line
        // comment       = colon *any-char end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        //
        // Only `data` carries a payload, `event`, `id` and `retry` are
        // accepted and ignored. Events made of comments only (keep-alive)
        // are skipped.
        loop {
            let Some((end, delim_len)) = find_event_end(&self.buf) else {
                return Ok(None);
            };
            let raw: Vec<u8> = self.buf.drain(..end + delim_len).collect();
            let block =
                str::from_utf8(&raw[..end]).map_err(|_| Error::InvalidPayload)?;

            let mut data: Option<String> = None;
            for line in block.split('\n') {
                let line = line.strip_suffix('\r').unwrap_or(line);
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let (field, value) = match line.split_once(':') {
                    Some((field, value)) => {
                        (field, value.strip_prefix(' ').unwrap_or(value))
                    }
                    None => (line, ""),
                };
                match field {
                    "data" => {
                        let data = data.get_or_insert_default();
                        if !data.is_empty() {
                            data.push('\n');
                        }
                        data.push_str(value);
                    }
                    "event" | "id" | "retry" => {}
                    _ => return Err(Error::InvalidPayload),
                }
            }

            if let Some(data) = data {
                return Ok(Some(data));
            }
        }
    }
}

/// Finds the first blank line, accepting both `\n\n` and `\r\n\r\n`.
/// Returns the offset where the event ends and the delimiter length.
fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = find(buf, b"\n\n").map(|idx| (idx, 2));
    let crlf = find(buf, b"\r\n\r\n").map(|idx| (idx, 4));
    match (lf, crlf) {
        (Some(lf), Some(crlf)) => Some(if crlf.0 < lf.0 { crlf } else { lf }),
        (lf, crlf) => lf.or(crlf),
    }
}

#[inline]
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
