//! Frame demultiplexer
//!
//! Containers without a TTY have their stdout and stderr multiplexed into a
//! single stream. Each frame starts with an 8-byte header:
//!
//! ```text
//! [stream: u8][0, 0, 0][length: u32 big-endian][payload; length]
//! ```
//!
//! TTY containers are not multiplexed and their bytes pass through as-is.

use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::io::StreamReader;

use dlog_docker::ByteStream;

use crate::DemuxError;

const HEADER_LEN: usize = 8;

/// Largest payload a single frame may declare; anything bigger is a corrupt header
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Which stream a frame belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
    /// Error reported by the daemon itself
    System,
}

impl TryFrom<u8> for StreamKind {
    type Error = DemuxError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Stdin),
            1 => Ok(Self::Stdout),
            2 => Ok(Self::Stderr),
            3 => Ok(Self::System),
            other => Err(DemuxError::UnknownStream(other)),
        }
    }
}

/// One decoded chunk of output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFrame {
    pub stream: StreamKind,
    pub payload: bytes::Bytes,
}

/// Incremental decoder for the runtime's log framing
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFrameCodec {
    tty: bool,
}

impl LogFrameCodec {
    pub fn new(tty: bool) -> Self {
        Self { tty }
    }
}

impl Decoder for LogFrameCodec {
    type Item = LogFrame;
    type Error = DemuxError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LogFrame>, DemuxError> {
        if self.tty {
            if src.is_empty() {
                return Ok(None);
            }
            return Ok(Some(LogFrame {
                stream: StreamKind::Stdout,
                payload: src.split().freeze(),
            }));
        }

        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let stream = StreamKind::try_from(src[0])?;
        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(DemuxError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();

        Ok(Some(LogFrame { stream, payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<LogFrame>, DemuxError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let needed = if src.len() < HEADER_LEN {
            HEADER_LEN
        } else {
            HEADER_LEN + u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize
        };

        Err(DemuxError::Truncated {
            needed,
            available: src.len(),
        })
    }
}

/// Decode a runtime byte stream into frames
pub fn frames(
    stream: ByteStream,
    tty: bool,
) -> impl Stream<Item = Result<LogFrame, DemuxError>> + Send + Unpin {
    let reader = StreamReader::new(stream.map_err(std::io::Error::other));
    FramedRead::new(reader, LogFrameCodec::new(tty))
}

/// Drain a finite runtime stream into one buffer of payload bytes
pub async fn read_all(stream: ByteStream, tty: bool) -> Result<Vec<u8>, DemuxError> {
    let mut frames = frames(stream, tty);
    let mut out = Vec::new();

    while let Some(frame) = frames.next().await {
        let frame = frame?;
        if frame.stream == StreamKind::System {
            tracing::warn!("runtime error in log stream: {}", String::from_utf8_lossy(&frame.payload));
        }
        out.extend_from_slice(&frame.payload);
    }

    Ok(out)
}

/// Demultiplex a complete buffer, appending payloads to `out`
///
/// On error everything decoded before the bad frame stays in `out`.
pub fn demux_into(input: &[u8], tty: bool, out: &mut Vec<u8>) -> Result<(), DemuxError> {
    let mut codec = LogFrameCodec::new(tty);
    let mut buf = BytesMut::from(input);

    while let Some(frame) = codec.decode(&mut buf)? {
        out.extend_from_slice(&frame.payload);
    }
    while let Some(frame) = codec.decode_eof(&mut buf)? {
        out.extend_from_slice(&frame.payload);
    }

    Ok(())
}

/// Demultiplex a complete buffer
pub fn demux(input: &[u8], tty: bool) -> Result<Vec<u8>, DemuxError> {
    let mut out = Vec::with_capacity(input.len());
    demux_into(input, tty, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use dlog_docker::mock::{STDERR, STDOUT, frame};
    use futures::stream;

    fn framed(parts: &[(u8, &[u8])]) -> Vec<u8> {
        parts.iter().flat_map(|(s, p)| frame(*s, p).to_vec()).collect()
    }

    #[test]
    fn test_demux_concatenates_in_frame_order() {
        let parts: Vec<(u8, &[u8])> = vec![
            (STDOUT, b"hello\n"),
            (STDERR, b"err\n"),
            (STDOUT, b""),
            (STDOUT, b"partial line"),
            (STDERR, b" continues\n"),
        ];
        let expected: Vec<u8> = parts.iter().flat_map(|(_, p)| p.to_vec()).collect();

        assert_eq!(demux(&framed(&parts), false).unwrap(), expected);
    }

    #[test]
    fn test_demux_large_payload() {
        let big = vec![b'x'; 70_000];
        let input = framed(&[(STDOUT, &big), (STDERR, b"tail\n")]);
        let out = demux(&input, false).unwrap();
        assert_eq!(out.len(), big.len() + 5);
        assert!(out.ends_with(b"tail\n"));
    }

    #[test]
    fn test_tty_passthrough() {
        let raw = b"\x01\x00\x00\x00 not a header\n";
        assert_eq!(demux(raw, true).unwrap(), raw.to_vec());
    }

    #[test]
    fn test_truncated_payload_keeps_prior_output() {
        let mut input = framed(&[(STDOUT, b"ok\n")]);
        let second = frame(STDERR, b"cut short");
        input.extend_from_slice(&second[..second.len() - 3]);

        let mut out = Vec::new();
        let err = demux_into(&input, false, &mut out).unwrap_err();
        assert!(matches!(err, DemuxError::Truncated { needed: 17, available: 14 }));
        assert_eq!(out, b"ok\n");
    }

    #[test]
    fn test_truncated_header() {
        let mut input = framed(&[(STDOUT, b"a")]);
        input.extend_from_slice(&[1, 0, 0]);
        let err = demux(&input, false).unwrap_err();
        assert!(matches!(err, DemuxError::Truncated { needed: 8, available: 3 }));
    }

    #[test]
    fn test_unknown_stream_selector() {
        let input = frame(9, b"?");
        assert!(matches!(
            demux(&input, false),
            Err(DemuxError::UnknownStream(9))
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_ends_stream() {
        let mut corrupt = vec![STDOUT, 0, 0, 0];
        corrupt.extend_from_slice(&u32::MAX.to_be_bytes());

        // The stream never ends, so only the header check can stop the reader
        let chunks: Vec<Result<Bytes, dlog_docker::RuntimeError>> = vec![
            Ok(frame(STDOUT, b"before\n")),
            Ok(Bytes::from(corrupt)),
        ];
        let mut frames = frames(stream::iter(chunks).chain(stream::pending()).boxed(), false);

        let first = frames.next().await.unwrap().unwrap();
        assert_eq!(&first.payload[..], b"before\n");

        let err = tokio::time::timeout(std::time::Duration::from_secs(2), frames.next())
            .await
            .expect("reader kept buffering")
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            err,
            DemuxError::FrameTooLarge { len, max: MAX_FRAME_LEN } if len == u32::MAX as usize
        ));
    }

    #[tokio::test]
    async fn test_frames_split_across_chunks() {
        let input = framed(&[(STDOUT, b"hello\n"), (STDERR, b"err\n")]);
        // Split at awkward points: inside the first header and inside the second payload
        let chunks: Vec<Result<Bytes, dlog_docker::RuntimeError>> = vec![
            Ok(Bytes::copy_from_slice(&input[..3])),
            Ok(Bytes::copy_from_slice(&input[3..20])),
            Ok(Bytes::copy_from_slice(&input[20..])),
        ];

        let out = read_all(stream::iter(chunks).boxed(), false).await.unwrap();
        assert_eq!(out, b"hello\nerr\n");
    }

    #[tokio::test]
    async fn test_stream_error_surfaces() {
        let chunks: Vec<Result<Bytes, dlog_docker::RuntimeError>> = vec![
            Ok(frame(STDOUT, b"one\n")),
            Err(dlog_docker::RuntimeError::Stream("connection reset".into())),
        ];

        let err = read_all(stream::iter(chunks).boxed(), false).await.unwrap_err();
        assert!(matches!(err, DemuxError::Io(_)));
    }
}
