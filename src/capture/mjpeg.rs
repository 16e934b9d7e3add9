//! MJPEG stream splitting
//!
//! The preview decode handle is an ffmpeg child writing an MJPEG stream to
//! a pipe. Individual JPEGs are recovered by scanning for the SOI/EOI
//! markers; a marker may straddle two reads, so unconsumed bytes carry
//! over between calls in the caller-owned scratch buffer.

use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

const READ_CHUNK: usize = 8192;

/// Extract the next complete JPEG from an MJPEG byte stream
///
/// Bytes before the first SOI marker are discarded. Returns
/// `UnexpectedEof` when the stream ends mid-frame (the producer died).
pub async fn next_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    scratch: &mut Vec<u8>,
) -> io::Result<Bytes> {
    loop {
        if let Some(start) = find_marker(scratch, SOI) {
            if start > 0 {
                scratch.drain(..start);
            }
            // EOI search skips the SOI marker itself
            if let Some(end) = find_marker(&scratch[2..], EOI) {
                let frame_len = 2 + end + 2;
                let frame = Bytes::copy_from_slice(&scratch[..frame_len]);
                scratch.drain(..frame_len);
                return Ok(frame);
            }
        } else if scratch.len() > 1 {
            // No SOI in the buffer; keep one trailing byte in case the
            // marker straddles this read and the next
            let drop_len = scratch.len() - 1;
            scratch.drain(..drop_len);
        }

        let mut chunk = [0u8; READ_CHUNK];
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "mjpeg stream ended",
            ));
        }
        scratch.extend_from_slice(&chunk[..n]);
    }
}

fn find_marker(buf: &[u8], marker: [u8; 2]) -> Option<usize> {
    buf.windows(2).position(|w| w == marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xFF, 0xD8];
        frame.extend_from_slice(body);
        frame.extend_from_slice(&[0xFF, 0xD9]);
        frame
    }

    /// Reader that yields one byte per poll, to exercise marker
    /// boundaries between reads
    struct TrickleReader {
        data: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for TrickleReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            if this.pos < this.data.len() {
                buf.put_slice(&this.data[this.pos..this.pos + 1]);
                this.pos += 1;
            }
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_single_frame() {
        let data = jpeg(&[1, 2, 3]);
        let mut reader = &data[..];
        let mut scratch = Vec::new();

        let frame = next_frame(&mut reader, &mut scratch).await.unwrap();
        assert_eq!(&frame[..], &data[..]);
        assert!(scratch.is_empty());
    }

    #[tokio::test]
    async fn test_back_to_back_frames() {
        let first = jpeg(&[1, 1]);
        let second = jpeg(&[2, 2, 2]);
        let mut data = first.clone();
        data.extend_from_slice(&second);
        let mut reader = &data[..];
        let mut scratch = Vec::new();

        assert_eq!(
            &next_frame(&mut reader, &mut scratch).await.unwrap()[..],
            &first[..]
        );
        assert_eq!(
            &next_frame(&mut reader, &mut scratch).await.unwrap()[..],
            &second[..]
        );
    }

    #[tokio::test]
    async fn test_garbage_before_soi_is_skipped() {
        let frame = jpeg(&[7]);
        let mut data = vec![0x00, 0x12, 0xFF, 0x00];
        data.extend_from_slice(&frame);
        let mut reader = &data[..];
        let mut scratch = Vec::new();

        assert_eq!(
            &next_frame(&mut reader, &mut scratch).await.unwrap()[..],
            &frame[..]
        );
    }

    #[tokio::test]
    async fn test_markers_split_across_reads() {
        let frame = jpeg(&[0xAB, 0xCD, 0xEF]);
        let mut reader = TrickleReader {
            data: frame.clone(),
            pos: 0,
        };
        let mut scratch = Vec::new();

        let out = next_frame(&mut reader, &mut scratch).await.unwrap();
        assert_eq!(&out[..], &frame[..]);
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_error() {
        let data = vec![0xFF, 0xD8, 1, 2, 3];
        let mut reader = &data[..];
        let mut scratch = Vec::new();

        let err = next_frame(&mut reader, &mut scratch).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
