//! PRELOGIN framing channel for the TLS handshake.
//!
//! TDS 7.x requires the TLS handshake itself to ride inside PRELOGIN
//! packets: each outgoing flight is wrapped in a PRELOGIN header, each
//! incoming PRELOGIN packet is stripped down to its payload before the TLS
//! engine sees it. After `handshake_complete()` the channel is a
//! transparent pass-through and TLS records go straight to the socket.

use std::cmp;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const HEADER_LEN: usize = 8;
const KIND_PRELOGIN: u8 = 0x12;
const FLAG_EOM: u8 = 0x01;

/// Transport adapter that frames TLS handshake traffic in PRELOGIN packets.
pub struct PreloginChannel<S> {
    stream: S,
    wrapping: bool,

    // Incoming packet state
    header: [u8; HEADER_LEN],
    header_filled: usize,
    payload_remaining: usize,

    // Outgoing flight buffered until flush
    out: Vec<u8>,
    out_pos: usize,
    out_framed: bool,
}

impl<S> PreloginChannel<S> {
    /// Wrap a transport; wrapping mode is on until the handshake ends.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            wrapping: true,
            header: [0u8; HEADER_LEN],
            header_filled: 0,
            payload_remaining: 0,
            out: vec![0u8; HEADER_LEN],
            out_pos: HEADER_LEN,
            out_framed: false,
        }
    }

    /// Switch to pass-through; call once the TLS handshake finished.
    pub fn handshake_complete(&mut self) {
        self.wrapping = false;
    }

    /// The wrapped transport.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwrap the transport.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PreloginChannel<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !this.wrapping {
            return Pin::new(&mut this.stream).poll_read(cx, buf);
        }

        // Finish reading the packet header first.
        while this.payload_remaining == 0 && this.header_filled < HEADER_LEN {
            let mut header_buf = ReadBuf::new(&mut this.header[this.header_filled..]);
            match Pin::new(&mut this.stream).poll_read(cx, &mut header_buf)? {
                Poll::Ready(()) => {
                    let n = header_buf.filled().len();
                    if n == 0 {
                        return Poll::Ready(Ok(())); // EOF
                    }
                    this.header_filled += n;
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        if this.payload_remaining == 0 {
            if this.header[0] != KIND_PRELOGIN {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "expected PRELOGIN packet during TLS handshake, got 0x{:02X}",
                        this.header[0]
                    ),
                )));
            }
            let length = u16::from_be_bytes([this.header[2], this.header[3]]) as usize;
            this.payload_remaining = length.saturating_sub(HEADER_LEN);
            this.header_filled = 0;
            tracing::trace!(bytes = this.payload_remaining, "unwrapping handshake packet");
        }

        // Hand at most one packet's payload to the TLS engine.
        let want = cmp::min(this.payload_remaining, buf.remaining());
        if want == 0 {
            return Poll::Ready(Ok(()));
        }

        let mut scratch = vec![0u8; want];
        let mut scratch_buf = ReadBuf::new(&mut scratch);
        match Pin::new(&mut this.stream).poll_read(cx, &mut scratch_buf)? {
            Poll::Ready(()) => {
                let n = scratch_buf.filled().len();
                if n > 0 {
                    buf.put_slice(&scratch[..n]);
                    this.payload_remaining -= n;
                }
                Poll::Ready(Ok(()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PreloginChannel<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if !this.wrapping {
            return Pin::new(&mut this.stream).poll_write(cx, data);
        }

        // Buffer the flight; the header is written at flush time when the
        // total length is known.
        this.out.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.wrapping && this.out.len() > HEADER_LEN {
            if !this.out_framed {
                let total = this.out.len();
                this.out[0] = KIND_PRELOGIN;
                this.out[1] = FLAG_EOM;
                this.out[2] = (total >> 8) as u8;
                this.out[3] = total as u8;
                this.out[4] = 0;
                this.out[5] = 0;
                this.out[6] = 1;
                this.out[7] = 0;
                this.out_framed = true;
                this.out_pos = 0;
                tracing::trace!(bytes = total, "wrapping handshake flight");
            }

            while this.out_pos < this.out.len() {
                match Pin::new(&mut this.stream).poll_write(cx, &this.out[this.out_pos..])? {
                    Poll::Ready(n) => this.out_pos += n,
                    Poll::Pending => return Poll::Pending,
                }
            }

            this.out.truncate(HEADER_LEN);
            this.out_pos = HEADER_LEN;
            this.out_framed = false;
        }

        Pin::new(&mut this.stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    use super::*;

    #[tokio::test]
    async fn wraps_writes_in_prelogin_frames() {
        let (near, mut far) = duplex(4096);
        let mut channel = PreloginChannel::new(near);

        channel.write_all(b"client hello").await.unwrap();
        channel.flush().await.unwrap();

        let mut header = [0u8; HEADER_LEN];
        far.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], KIND_PRELOGIN);
        assert_eq!(header[1], FLAG_EOM);
        let length = u16::from_be_bytes([header[2], header[3]]) as usize;
        assert_eq!(length, HEADER_LEN + 12);

        let mut payload = vec![0u8; 12];
        far.read_exact(&mut payload).await.unwrap();
        assert_eq!(&payload, b"client hello");
    }

    #[tokio::test]
    async fn unwraps_prelogin_frames_on_read() {
        let (near, mut far) = duplex(4096);
        let mut channel = PreloginChannel::new(near);

        let payload = b"server hello";
        let total = (HEADER_LEN + payload.len()) as u16;
        let mut frame = vec![KIND_PRELOGIN, FLAG_EOM];
        frame.extend_from_slice(&total.to_be_bytes());
        frame.extend_from_slice(&[0, 0, 1, 0]);
        frame.extend_from_slice(payload);
        far.write_all(&frame).await.unwrap();

        let mut out = vec![0u8; payload.len()];
        channel.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, payload);
    }

    #[tokio::test]
    async fn rejects_non_prelogin_during_handshake() {
        let (near, mut far) = duplex(4096);
        let mut channel = PreloginChannel::new(near);

        far.write_all(&[0x04, 0x01, 0x00, 0x0C, 0, 0, 1, 0, 1, 2, 3, 4])
            .await
            .unwrap();

        let mut out = [0u8; 4];
        let err = channel.read_exact(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn passes_through_after_handshake() {
        let (near, mut far) = duplex(4096);
        let mut channel = PreloginChannel::new(near);
        channel.handshake_complete();

        channel.write_all(b"raw").await.unwrap();
        channel.flush().await.unwrap();

        let mut out = [0u8; 3];
        far.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, b"raw");
    }
}
