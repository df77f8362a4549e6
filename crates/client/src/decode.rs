/// Errors decoding the relay's byte stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The stream carried bytes that are not UTF-8.
    #[error("invalid UTF-8 sequence in the stream")]
    Invalid,
    /// The stream ended in the middle of a character.
    #[error("stream ended inside a UTF-8 sequence")]
    Truncated,
}

/// A UTF-8 decoder that keeps an incomplete trailing sequence around
/// until the next chunk completes it.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decodes as much of `bytes` as possible, holding back a character
    /// that is split across chunks.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<String, DecodeError> {
        self.pending.extend_from_slice(bytes);
        let valid_up_to = match str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // `error_len` is `None` when the input merely stops early.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(DecodeError::Invalid),
        };
        let rest = self.pending.split_off(valid_up_to);
        let decoded = std::mem::replace(&mut self.pending, rest);
        String::from_utf8(decoded).map_err(|_| DecodeError::Invalid)
    }

    /// Checks that the stream did not stop inside a character.
    pub fn finish(self) -> Result<(), DecodeError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::Truncated)
        }
    }
}
