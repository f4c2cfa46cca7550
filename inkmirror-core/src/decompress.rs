//! Streaming decompression of the remote capture output.
//!
//! [`StreamDecompressor`] wraps the remote command's stdout and yields
//! decompressed chunks lazily. It is the sole owner of decoder state and
//! cannot be restarted.
//!
//! # Failure classification
//!
//! | Condition                                   | Result                       |
//! |---------------------------------------------|------------------------------|
//! | stream closed before any compressed byte    | [`MirrorError::NoData`]      |
//! | transport read failed                       | [`MirrorError::Io`]          |
//! | decoder rejected the bytes                  | [`MirrorError::Decompression`] |
//!
//! `NoData` is resolved further with the remote exit status via
//! [`classify_empty_stream`].

use std::io::{self, BufRead, BufReader, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use lz4_flex::frame::FrameDecoder;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::{EXIT_COMMAND_NOT_FOUND, MirrorError};

/// Upper bound on the size of one decompressed chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

// ── Compression ──────────────────────────────────────────────────

/// Container format produced by the remote compression filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// LZ4 frame format (`lz4` command-line tool).
    #[default]
    Lz4,
    /// Zstandard frame format (`zstd -c`).
    Zstd,
}

// ── ReadProbe ────────────────────────────────────────────────────

/// Observations about the compressed side, shared with the decoder's reader.
#[derive(Debug, Default)]
struct ReadProbe {
    consumed: AtomicU64,
    transport_failed: AtomicBool,
}

/// Counts the compressed bytes handed to the decoder.
struct ProbedReader<R> {
    inner: R,
    probe: Arc<ReadProbe>,
}

impl<R: Read> Read for ProbedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.probe.consumed.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::Interrupted {
                    self.probe.transport_failed.store(true, Ordering::Relaxed);
                }
                Err(e)
            }
        }
    }
}

// ── Lz4Frames ────────────────────────────────────────────────────

/// LZ4 decoder that continues across concatenated frames.
///
/// The frame decoder reports end of input at every frame boundary. The
/// stream only ends once the source itself has no bytes left.
struct Lz4Frames<R: BufRead> {
    decoder: Option<FrameDecoder<R>>,
}

impl<R: BufRead> Lz4Frames<R> {
    fn new(source: R) -> Self {
        Self {
            decoder: Some(FrameDecoder::new(source)),
        }
    }
}

impl<R: BufRead> Read for Lz4Frames<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let Some(decoder) = self.decoder.as_mut() else {
                return Ok(0);
            };
            let n = decoder.read(buf)?;
            if n > 0 || buf.is_empty() {
                return Ok(n);
            }
            if decoder.get_mut().fill_buf()?.is_empty() {
                return Ok(0);
            }
            // Another frame follows on the same source.
            if let Some(finished) = self.decoder.take() {
                self.decoder = Some(FrameDecoder::new(finished.into_inner()));
            }
        }
    }
}

// ── StreamDecompressor ───────────────────────────────────────────

/// Lazy, unbounded sequence of decompressed chunks.
///
/// Iteration yields `Ok(chunk)` until the stream ends, or a single `Err`
/// after which it is exhausted.
pub struct StreamDecompressor {
    decoder: Box<dyn Read + Send>,
    probe: Arc<ReadProbe>,
    buf: Vec<u8>,
    produced: u64,
    done: bool,
}

impl StreamDecompressor {
    /// Wrap `source`, decoding it as `compression`.
    pub fn new<R>(source: R, compression: Compression) -> Result<Self, MirrorError>
    where
        R: Read + Send + 'static,
    {
        let probe = Arc::new(ReadProbe::default());
        let reader = BufReader::new(ProbedReader {
            inner: source,
            probe: Arc::clone(&probe),
        });
        let decoder: Box<dyn Read + Send> = match compression {
            Compression::Lz4 => Box::new(Lz4Frames::new(reader)),
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(reader)?),
        };

        Ok(Self {
            decoder,
            probe,
            buf: vec![0u8; CHUNK_SIZE],
            produced: 0,
            done: false,
        })
    }

    /// Compressed bytes consumed so far.
    pub fn compressed_bytes(&self) -> u64 {
        self.probe.consumed.load(Ordering::Relaxed)
    }

    /// Decompressed bytes produced so far.
    pub fn decompressed_bytes(&self) -> u64 {
        self.produced
    }

    /// Read the next decompressed chunk. `Ok(None)` marks the end of stream.
    pub fn next_chunk(&mut self) -> Result<Option<Bytes>, MirrorError> {
        loop {
            match self.decoder.read(&mut self.buf) {
                Ok(0) => {
                    return if self.compressed_bytes() == 0 {
                        Err(MirrorError::NoData)
                    } else {
                        Ok(None)
                    };
                }
                Ok(n) => {
                    self.produced += n as u64;
                    return Ok(Some(Bytes::copy_from_slice(&self.buf[..n])));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.classify(e)),
            }
        }
    }

    fn classify(&self, e: io::Error) -> MirrorError {
        if self.probe.transport_failed.load(Ordering::Relaxed) {
            MirrorError::Io(e)
        } else if self.compressed_bytes() == 0 {
            MirrorError::NoData
        } else {
            MirrorError::Decompression(e)
        }
    }
}

impl Iterator for StreamDecompressor {
    type Item = Result<Bytes, MirrorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// ── Empty-stream classification ──────────────────────────────────

/// Decide what an empty capture stream means, given how the remote
/// command exited.
///
/// A "command not found" status means a helper binary is missing and no
/// frame can ever be produced: that is fatal. Anything else is treated as
/// a deliberately terminated command and only logged.
pub fn classify_empty_stream(exit_code: Option<i32>, stderr: &str) -> Result<(), MirrorError> {
    match exit_code {
        Some(EXIT_COMMAND_NOT_FOUND) => {
            error!("remote helper missing, check the decompressor and extractor paths: {stderr}");
            Err(MirrorError::ToolMissing {
                exit_code: EXIT_COMMAND_NOT_FOUND,
                stderr: stderr.trim().to_string(),
            })
        }
        status => {
            warn!("frame data stream is empty (exit status {status:?}) {}", stderr.trim());
            Ok(())
        }
    }
}
