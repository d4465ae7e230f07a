//! Anonymized data streams, multiplexed over a circuit.

use crate::circuit::Circuit;
use crate::Result;

use torlink_cell::relaycell::msg::Data;
use torlink_cell::relaycell::StreamId;

use futures::io::{AsyncRead, AsyncWrite};

/// An open stream through the last hop of a circuit.
///
/// The handle borrows its circuit, since reading from a stream means
/// pulling inbound cells for the whole circuit.  To work with another
/// stream, drop this handle and get a new one from
/// [`Circuit::stream`]; buffered inbound data stays with the circuit.
pub struct DataStream<'c, T: AsyncRead + AsyncWrite + Unpin> {
    /// The circuit this stream runs over.
    circ: &'c mut Circuit<T>,
    /// Our id on that circuit.
    id: StreamId,
    /// A chunk taken from the circuit but not yet fully read.
    pending: Vec<u8>,
    /// How much of `pending` has been read already.
    offset: usize,
}

impl<'c, T> DataStream<'c, T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream id on a circuit in a handle.
    pub(crate) fn new(circ: &'c mut Circuit<T>, id: StreamId) -> Self {
        DataStream {
            circ,
            id,
            pending: Vec::new(),
            offset: 0,
        }
    }

    /// Return this stream's id on its circuit.
    pub fn stream_id(&self) -> StreamId {
        self.id
    }

    /// Send `b` to the other end of the stream, split across as many
    /// DATA cells as it needs.
    ///
    /// Fails with [`crate::Error::WindowExhausted`] when flow control
    /// has run out of credit; reading inbound traffic and retrying is
    /// the way forward.
    pub async fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        for chunk in b.chunks(Data::MAXLEN) {
            self.circ.send_data(self.id, chunk).await?;
        }
        Ok(())
    }

    /// Read up to `buf.len()` bytes from the stream.
    ///
    /// Returns 0 only once the other end has closed the stream.
    pub async fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.offset < self.pending.len() {
            return Ok(self.extract_pending(buf));
        }
        match self.circ.read_stream(self.id).await? {
            Some(chunk) => {
                self.pending = chunk;
                self.offset = 0;
                Ok(self.extract_pending(buf))
            }
            None => Ok(0),
        }
    }

    /// Close this stream, telling the exit we're done with it.
    pub async fn close(self) -> Result<()> {
        self.circ.end_stream(self.id).await
    }

    /// Copy as much buffered data as fits into `buf`.
    fn extract_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = std::cmp::min(buf.len(), self.pending.len() - self.offset);
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        n
    }
}
