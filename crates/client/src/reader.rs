#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;
use tracing::Instrument;

use crate::ClientError;
use crate::decode::Utf8Decoder;

/// The body of a relay response.
pub enum ByteStream {
    Response(Response),
    #[cfg(test)]
    VecDeque(VecDeque<Result<Bytes, ClientError>>),
}

impl ByteStream {
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Self::Response(response)
    }

    #[cfg(test)]
    #[inline]
    pub fn from_vec_deque(chunks: VecDeque<Result<Bytes, ClientError>>) -> Self {
        Self::VecDeque(chunks)
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, ClientError> {
        match self {
            ByteStream::Response(response) => Ok(response.chunk().await?),
            #[cfg(test)]
            ByteStream::VecDeque(chunks) => chunks.pop_front().transpose(),
        }
    }
}

/// What the reader loop reports about a turn.
#[derive(Debug)]
pub enum TurnEvent {
    /// The buffer as it stands after a read that produced text.
    BufferGrew(String),
    /// The stream ended, cleanly or not. Sent exactly once.
    Completed(Result<(), ClientError>),
}

/// Reads `stream` to the end, growing one buffer.
///
/// `emit` returns `false` once nobody listens anymore, the loop then
/// stops and releases the stream without completing the turn.
pub async fn read_turn<F>(stream: ByteStream, emit: F)
where
    F: FnMut(TurnEvent) -> bool,
{
    read_turn_inner(stream, emit)
        .instrument(debug_span!("reader loop"))
        .await
}

async fn read_turn_inner<F>(mut stream: ByteStream, mut emit: F)
where
    F: FnMut(TurnEvent) -> bool,
{
    let mut decoder = Utf8Decoder::default();
    let mut buffer = String::new();

    let outcome = loop {
        let bytes = match stream.next_chunk().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break decoder.finish().map_err(ClientError::from),
            Err(err) => break Err(err),
        };
        trace!("read {} bytes", bytes.len());

        let text = match decoder.decode(&bytes) {
            Ok(text) => text,
            Err(err) => break Err(err.into()),
        };
        if text.is_empty() {
            // Only part of a character so far.
            continue;
        }
        buffer.push_str(&text);
        if !emit(TurnEvent::BufferGrew(buffer.clone())) {
            debug!("receiver is gone, dropping the stream");
            return;
        }
    };

    match &outcome {
        Ok(()) => debug!("stream finished after {} bytes", buffer.len()),
        Err(err) => warn!("stream broke after {} bytes: {err}", buffer.len()),
    }
    emit(TurnEvent::Completed(outcome));
}
