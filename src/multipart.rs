//! # multipart: streaming `multipart/form-data` encoder
//!
//! Wraps a single named file field around a [`ByteSource`] and produces the
//! complete multipart body as a lazy, finite, single-pass chunk stream, so
//! arbitrarily large inputs are never buffered whole.
//!
//! The boundary token is a fresh v4 UUID per encoder instance, which keeps
//! boundaries from being reused across uploads. A boundary-like sequence
//! occurring inside the payload itself is an accepted risk and is not
//! detected or escaped.

use std::io;

use bytes::Bytes;
use futures::stream::Stream;
use uuid::Uuid;

use crate::source::ByteSource;

/// Chunk size used when re-chunking the source into body pieces.
pub const DEFAULT_CHUNK_SIZE: usize = 8096;

/// Encoder for one `multipart/form-data` field carrying a file payload.
pub struct MultipartEncoder<S> {
    boundary: String,
    headers: Vec<(String, String)>,
    source: S,
}

impl<S: ByteSource> MultipartEncoder<S> {
    /// Encoder with default headers and a fresh random boundary.
    pub fn new(field: &str, source: S, filename: Option<&str>) -> Self {
        Self::with_options(field, source, filename, None, Vec::new())
    }

    /// Encoder with an explicit boundary and/or extra part headers.
    ///
    /// User-supplied headers win over the defaults on a case-sensitive name
    /// match; insertion order is preserved in the emitted header block.
    pub fn with_options(
        field: &str,
        source: S,
        filename: Option<&str>,
        boundary: Option<String>,
        extra_headers: Vec<(String, String)>,
    ) -> Self {
        let boundary = boundary.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let mut headers = extra_headers;

        if !headers.iter().any(|(name, _)| name == "Content-Disposition") {
            let mut disposition = format!("form-data; name=\"{field}\"");
            if let Some(name) = filename {
                disposition.push_str(&format!("; filename=\"{name}\""));
            }
            headers.push(("Content-Disposition".to_string(), disposition));
        }

        if !headers.iter().any(|(name, _)| name == "Content-Type") {
            headers.push((
                "Content-Type".to_string(),
                "application/octet-stream".to_string(),
            ));
        }

        Self {
            boundary,
            headers,
            source,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Exact `Content-Type` header value for the request carrying this body.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn header_block(&self) -> Vec<u8> {
        self.headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\r\n")
            .into_bytes()
    }

    /// Exact encoded body length, available only when the source reports a
    /// known size. Framing adds the opening boundary line, the header block
    /// with its blank-line separator, a trailing CRLF, and optionally the
    /// closing boundary marker.
    pub fn compute_size(&self, include_final_boundary: bool) -> Option<u64> {
        let payload = self.source.known_size()?;
        let boundary_len = self.boundary.len() as u64;
        let mut size = payload + boundary_len + 4 + self.header_block().len() as u64 + 4 + 2;
        if include_final_boundary {
            size += boundary_len + 6;
        }
        Some(size)
    }

    /// Consume the encoder into a finite, single-pass chunk stream forming
    /// the complete body. Payload pieces are at most `chunk_size` bytes.
    /// Not restartable: the underlying source is drained as a side effect.
    pub fn into_stream(
        self,
        include_final_boundary: bool,
        chunk_size: usize,
    ) -> impl Stream<Item = io::Result<Bytes>> + Send
    where
        S: 'static,
    {
        let header_block = self.header_block();
        let encode = Encode {
            source: self.source,
            boundary: self.boundary,
            header_block,
            include_final_boundary,
            chunk_size: chunk_size.max(1),
            state: EncodeState::Opening,
        };

        futures::stream::unfold(encode, |mut encode| async move {
            loop {
                match encode.state {
                    EncodeState::Opening => {
                        encode.state = EncodeState::Headers;
                        let line = format!("--{}\r\n", encode.boundary);
                        return Some((Ok(Bytes::from(line)), encode));
                    }
                    EncodeState::Headers => {
                        encode.state = EncodeState::Payload;
                        let mut block = std::mem::take(&mut encode.header_block);
                        block.extend_from_slice(b"\r\n\r\n");
                        return Some((Ok(Bytes::from(block)), encode));
                    }
                    EncodeState::Payload => {
                        let mut buf = vec![0u8; encode.chunk_size];
                        match encode.source.read_chunk(&mut buf).await {
                            Ok(0) => {
                                encode.state = EncodeState::Trailer;
                            }
                            Ok(n) => {
                                buf.truncate(n);
                                return Some((Ok(Bytes::from(buf)), encode));
                            }
                            Err(e) => {
                                encode.state = EncodeState::Done;
                                return Some((Err(e), encode));
                            }
                        }
                    }
                    EncodeState::Trailer => {
                        encode.state = if encode.include_final_boundary {
                            EncodeState::Closing
                        } else {
                            EncodeState::Done
                        };
                        return Some((Ok(Bytes::from_static(b"\r\n")), encode));
                    }
                    EncodeState::Closing => {
                        encode.state = EncodeState::Done;
                        let marker = format!("--{}--\r\n", encode.boundary);
                        return Some((Ok(Bytes::from(marker)), encode));
                    }
                    EncodeState::Done => return None,
                }
            }
        })
    }
}

#[derive(Clone, Copy)]
enum EncodeState {
    Opening,
    Headers,
    Payload,
    Trailer,
    Closing,
    Done,
}

struct Encode<S> {
    source: S,
    boundary: String,
    header_block: Vec<u8>,
    include_final_boundary: bool,
    chunk_size: usize,
    state: EncodeState,
}
