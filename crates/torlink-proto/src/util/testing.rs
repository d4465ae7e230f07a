//! Test-only plumbing: an in-memory duplex byte stream, so links and
//! circuits can be exercised against a simulated peer without any
//! sockets.

use futures::channel::mpsc;
use futures::io::{AsyncRead, AsyncWrite};
use futures::stream::Stream;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// One end of an in-memory byte stream.
///
/// Writes never block; reads wait until the peer has written.  Chunk
/// boundaries from the writing side are preserved internally but not
/// exposed, so the reader sees a plain byte stream.
pub(crate) struct LocalStream {
    /// Bytes we write go here.
    tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Bytes the peer wrote come from here.
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Partially consumed chunk from the peer.
    pending: Vec<u8>,
}

/// Return two connected stream ends.
pub(crate) fn stream_pair() -> (LocalStream, LocalStream) {
    let (tx_a, rx_b) = mpsc::unbounded();
    let (tx_b, rx_a) = mpsc::unbounded();
    let a = LocalStream {
        tx: tx_a,
        rx: rx_a,
        pending: Vec::new(),
    };
    let b = LocalStream {
        tx: tx_b,
        rx: rx_b,
        pending: Vec::new(),
    };
    (a, b)
}

impl AsyncRead for LocalStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        while this.pending.is_empty() {
            match Pin::new(&mut this.rx).poll_next(cx) {
                Poll::Ready(Some(v)) => this.pending = v,
                Poll::Ready(None) => return Poll::Ready(Ok(0)),
                Poll::Pending => return Poll::Pending,
            }
        }
        let n = std::cmp::min(buf.len(), this.pending.len());
        buf[..n].copy_from_slice(&this.pending[..n]);
        this.pending.drain(..n);
        Poll::Ready(Ok(n))
    }
}

impl AsyncWrite for LocalStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if this.tx.unbounded_send(buf.to_vec()).is_err() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "peer end is gone",
            )));
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().tx.close_channel();
        Poll::Ready(Ok(()))
    }
}
