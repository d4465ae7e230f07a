//! Define an error type for torlink-proto.

use thiserror::Error;

/// An error type for the protocol engine.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// An error that occurred while encoding or decoding a cell.
    #[error("cell encoding error: {0}")]
    BytesErr(#[from] torlink_cell::Error),
    /// An IO error on the underlying transport.
    #[error("io error: {0}")]
    IoErr(#[from] std::io::Error),
    /// TLS setup failed before the link handshake could start.
    #[error("tls error: {0}")]
    TlsErr(#[from] async_native_tls::Error),
    /// The relay didn't offer any link protocol version we speak.
    #[error("no usable link protocol in common")]
    NoVersion,
    /// The peer violated the link protocol.
    #[error("link protocol violation: {0}")]
    LinkProto(String),
    /// Something went wrong at the circuit protocol layer.
    #[error("circuit protocol violation: {0}")]
    CircProto(String),
    /// A circuit extension failed for a protocol reason.
    #[error("cannot extend circuit: {0}")]
    CircExtend(&'static str),
    /// The handshake's authentication didn't check out.
    ///
    /// The hop must be abandoned: keys derived from an
    /// unauthenticated handshake are worthless.
    #[error("handshake failed")]
    BadHandshake,
    /// A relay cell's digest didn't match at any hop of the circuit.
    ///
    /// This means the circuit's crypto state has desynchronized from
    /// its hops (or the cell was corrupted in flight); either way the
    /// circuit is unusable and must be closed.
    #[error("bad relay cell authentication")]
    BadCellAuth,
    /// Flow control denied a send.
    ///
    /// Not a failure: the caller should wait for a sendme to restore
    /// its window and then retry.
    #[error("send window exhausted")]
    WindowExhausted,
    /// The link this circuit runs on is gone.
    #[error("link closed: {0}")]
    LinkClosed(&'static str),
    /// The circuit is closed, or closed while we were waiting on it.
    #[error("circuit closed: {0}")]
    CircuitClosed(&'static str),
    /// The stream was closed by the other end.
    #[error("stream closed: {0}")]
    StreamClosed(&'static str),
    /// An operation was attempted in a circuit state that doesn't
    /// permit it.
    #[error("operation invalid in state {0}")]
    BadState(&'static str),
    /// An internal programming error.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        let e: Error = torlink_cell::Error::Truncated.into();
        assert_eq!(
            format!("{}", e),
            "cell encoding error: object truncated (or not fully present)"
        );
        assert_eq!(format!("{}", Error::BadHandshake), "handshake failed");
    }
}
