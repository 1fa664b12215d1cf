//! Guarded access to the request body.
//!
//! The transport delivers the body as one forward-only sequence of bytes. It can be
//! read either raw, through an [`InputStream`], or decoded, through a [`BodyReader`],
//! but never both: the first opener fixes the [`BodyAccessMode`] for the rest of the
//! request. Opening again in the same mode hands out a clone of the same handle,
//! sharing one read cursor.
//!
//! The parameter parser may drain a form body on the handler's behalf; the mode is then
//! [`BodyAccessMode::Consumed`] and any handle opened afterwards starts at end of input.

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use encoding_rs::{Decoder, DecoderResult};
use http_body::Body;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::BodyExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::encoding::{Charset, EncodingResolver};
use crate::error::{BoxError, ParameterError, RequestError};
use crate::ensure;

pub(crate) type RawBody = UnsyncBoxBody<Bytes, BoxError>;

/// Boxes any transport body into the facade's body type.
pub(crate) fn box_body<B>(body: B) -> RawBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyAccessMode {
    /// Nobody touched the body yet.
    Unopened,
    /// The parameter parser drained the body, no handle was handed out.
    Consumed,
    /// Opened as raw bytes.
    AsStream,
    /// Opened as decoded text.
    AsReader,
}

struct BodyCursor {
    body: Option<RawBody>,
    read: u64,
}

impl BodyCursor {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, RequestError> {
        loop {
            let Some(body) = self.body.as_mut() else {
                return Ok(None);
            };

            match body.frame().await {
                Some(Ok(frame)) => {
                    // trailers carry no body bytes
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };
                    if data.is_empty() {
                        continue;
                    }
                    self.read += data.len() as u64;
                    return Ok(Some(data));
                }
                Some(Err(e)) => {
                    error!(cause = %e, read = self.read, "failed to read request body");
                    self.body = None;
                    return Err(RequestError::body(e));
                }
                None => {
                    debug!(size = self.read, "request body finished");
                    self.body = None;
                    return Ok(None);
                }
            }
        }
    }

    async fn read_to_end(&mut self, limit: Option<u64>) -> Result<Bytes, RequestError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            if let Some(max_size) = limit
                && buf.len() as u64 + chunk.len() as u64 > max_size
            {
                warn!(max_size, read = self.read, "request body exceeds the limit, discarding the rest");
                self.body = None;
                return Err(ParameterError::BodyTooLarge { max_size }.into());
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    fn is_finished(&self) -> bool {
        self.body.as_ref().is_none_or(http_body::Body::is_end_stream)
    }
}

type SharedCursor = Arc<Mutex<BodyCursor>>;

/// Enforces that the body is read either as bytes or as text, never both.
pub struct BodyAccessGuard {
    mode: BodyAccessMode,
    cursor: SharedCursor,
    stream: Option<InputStream>,
    reader: Option<BodyReader>,
}

impl BodyAccessGuard {
    pub(crate) fn new(body: RawBody) -> Self {
        let cursor = BodyCursor { body: Some(body), read: 0 };
        Self { mode: BodyAccessMode::Unopened, cursor: Arc::new(Mutex::new(cursor)), stream: None, reader: None }
    }

    pub fn mode(&self) -> BodyAccessMode {
        self.mode
    }

    /// Opens the body as raw bytes.
    ///
    /// Fails if the body is already opened as a reader. Freezes the encoding.
    pub fn open_as_stream(&mut self, encoding: &mut EncodingResolver) -> Result<InputStream, RequestError> {
        ensure!(
            self.mode != BodyAccessMode::AsReader,
            RequestError::illegal_state("the body has already been opened as a reader")
        );

        if let Some(stream) = &self.stream {
            return Ok(stream.clone());
        }

        encoding.freeze();
        let stream = InputStream { cursor: Arc::clone(&self.cursor) };
        debug!(from = ?self.mode, "request body opened as stream");
        self.mode = BodyAccessMode::AsStream;
        self.stream = Some(stream.clone());
        Ok(stream)
    }

    /// Opens the body as text decoded with the resolved charset.
    ///
    /// Fails if the body is already opened as a stream, or if the charset can not be resolved.
    pub fn open_as_reader(&mut self, encoding: &mut EncodingResolver) -> Result<BodyReader, RequestError> {
        ensure!(
            self.mode != BodyAccessMode::AsStream,
            RequestError::illegal_state("the body has already been opened as a stream")
        );

        if let Some(reader) = &self.reader {
            return Ok(reader.clone());
        }

        let charset = encoding.resolve()?;
        encoding.freeze();
        let reader = BodyReader::new(Arc::clone(&self.cursor), charset);
        debug!(from = ?self.mode, charset = %charset, "request body opened as reader");
        self.mode = BodyAccessMode::AsReader;
        self.reader = Some(reader.clone());
        Ok(reader)
    }

    /// Drains the whole body on behalf of the parameter parser.
    ///
    /// Only valid while the body is unopened. The mode moves to `Consumed` before the
    /// first read, so an interrupted drain still counts as consumption.
    pub(crate) async fn consume(&mut self, limit: Option<u64>) -> Result<Bytes, RequestError> {
        ensure!(
            self.mode == BodyAccessMode::Unopened,
            RequestError::illegal_state("the body has already been opened")
        );

        self.mode = BodyAccessMode::Consumed;
        self.cursor.lock().await.read_to_end(limit).await
    }
}

impl fmt::Debug for BodyAccessGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyAccessGuard").field("mode", &self.mode).finish_non_exhaustive()
    }
}

/// Raw byte access to the request body.
///
/// Clones share the same cursor: a chunk read through one clone is not seen by another.
#[derive(Clone)]
pub struct InputStream {
    cursor: SharedCursor,
}

impl InputStream {
    /// Reads the next chunk, `None` at end of body.
    pub async fn read_chunk(&self) -> Result<Option<Bytes>, RequestError> {
        self.cursor.lock().await.next_chunk().await
    }

    /// Reads everything left in the body.
    pub async fn read_to_end(&self) -> Result<Bytes, RequestError> {
        self.cursor.lock().await.read_to_end(None).await
    }

    pub async fn is_finished(&self) -> bool {
        self.cursor.lock().await.is_finished()
    }

    /// Number of body bytes read so far, by any handle.
    pub async fn bytes_read(&self) -> u64 {
        self.cursor.lock().await.read
    }
}

impl fmt::Debug for InputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputStream").finish_non_exhaustive()
    }
}

struct ReaderState {
    cursor: SharedCursor,
    decoder: Decoder,
    pending: String,
    eof: bool,
}

impl ReaderState {
    /// Decodes the next body chunk into `pending`, returns `false` once the body is exhausted.
    async fn fill(&mut self, charset: Charset) -> Result<bool, RequestError> {
        if self.eof {
            return Ok(false);
        }

        let chunk = self.cursor.lock().await.next_chunk().await?;
        match chunk {
            Some(bytes) => {
                self.decode(&bytes, false, charset)?;
                Ok(true)
            }
            None => {
                self.eof = true;
                self.decode(&[], true, charset)?;
                Ok(false)
            }
        }
    }

    fn decode(&mut self, mut src: &[u8], last: bool, charset: Charset) -> Result<(), RequestError> {
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length_without_replacement(src.len())
                .ok_or_else(|| RequestError::malformed_input("body chunk too large to decode"))?;
            self.pending.reserve(needed);

            let (result, read) = self.decoder.decode_to_string_without_replacement(src, &mut self.pending, last);
            match result {
                DecoderResult::InputEmpty => return Ok(()),
                DecoderResult::OutputFull => src = &src[read..],
                DecoderResult::Malformed(_, _) => {
                    return Err(RequestError::malformed_input(format!("body is not valid {charset}")));
                }
            }
        }
    }
}

/// Decoded text access to the request body.
///
/// Multi-byte sequences split across transport chunks are decoded correctly; an
/// invalid sequence fails the read with [`RequestError::MalformedInput`].
#[derive(Clone)]
pub struct BodyReader {
    state: Arc<Mutex<ReaderState>>,
    charset: Charset,
}

impl BodyReader {
    fn new(cursor: SharedCursor, charset: Charset) -> Self {
        let decoder = charset.encoding().new_decoder_without_bom_handling();
        let state = ReaderState { cursor, decoder, pending: String::new(), eof: false };
        Self { state: Arc::new(Mutex::new(state)), charset }
    }

    /// The charset chosen when the reader was opened.
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Reads the next piece of decoded text, `None` at end of body.
    pub async fn read_chunk(&self) -> Result<Option<String>, RequestError> {
        let mut state = self.state.lock().await;
        while state.pending.is_empty() {
            if !state.fill(self.charset).await? {
                break;
            }
        }

        if state.pending.is_empty() {
            Ok(None)
        } else {
            Ok(Some(std::mem::take(&mut state.pending)))
        }
    }

    /// Reads one line without its terminator (`\n` or `\r\n`), `None` at end of body.
    pub async fn read_line(&self) -> Result<Option<String>, RequestError> {
        let mut state = self.state.lock().await;
        loop {
            if let Some(pos) = state.pending.find('\n') {
                let mut line: String = state.pending.drain(..=pos).collect();
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
                return Ok(Some(line));
            }

            if !state.fill(self.charset).await? {
                return if state.pending.is_empty() { Ok(None) } else { Ok(Some(std::mem::take(&mut state.pending))) };
            }
        }
    }

    /// Reads all remaining text.
    pub async fn read_to_string(&self) -> Result<String, RequestError> {
        let mut state = self.state.lock().await;
        while state.fill(self.charset).await? {}
        Ok(std::mem::take(&mut state.pending))
    }
}

impl fmt::Debug for BodyReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyReader").field("charset", &self.charset).finish_non_exhaustive()
    }
}
