//! Talking directly (over a TLS connection) to a Tor relay.
//!
//! A link carries every circuit we build through one guard.  To open
//! one, call [`start_client_handshake`] on a TLS stream, `connect()`
//! the result, and `finish()` that; you get a [`LinkSocket`] for
//! sending cells and a [`Reactor`] that must be spawned to pump the
//! inbound side.

mod circmap;
mod handshake;
mod reactor;

use crate::circuit::Circuit;
use crate::{Error, Result};

use torlink_cell::cell::codec::CellCodec;
use torlink_cell::cell::msg::CellMsg;
use torlink_cell::cell::{Cell, CircId};

use bytes::BytesMut;
use futures::channel::oneshot;
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use futures::lock::Mutex;

use rand::Rng;

use std::sync::Arc;

use log::trace;

pub use handshake::{OutboundLinkHandshake, UnverifiedLink};
pub use reactor::Reactor;

/// An open client link, ready to send and receive Tor cells.
pub struct LinkSocket<T: AsyncRead + AsyncWrite + Unpin> {
    /// Shared state between every handle on this link.
    inner: Arc<LinkImpl<T>>,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Clone for LinkSocket<T> {
    fn clone(&self) -> Self {
        LinkSocket {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Main implementation type for a link.
struct LinkImpl<T: AsyncRead + AsyncWrite + Unpin> {
    /// The negotiated link protocol version.
    link_protocol: u16,
    /// The write half of the TLS stream, with its encoder.  Held
    /// under its own lock since every cell send needs it, while the
    /// circuit map is only needed when circuits come and go.
    io: Mutex<WriteState<T>>,
    /// The live circuits on this link, shared with the reactor.
    circmap: Arc<Mutex<circmap::CircMap>>,
    /// Tells the reactor to shut down, if we still can.
    closeflag: Mutex<Option<oneshot::Sender<()>>>,
}

/// Everything needed to put a cell on the wire.
struct WriteState<T: AsyncRead + AsyncWrite + Unpin> {
    /// The write half of the TLS stream.
    w: WriteHalf<T>,
    /// Frame encoder for the negotiated link version.
    codec: CellCodec,
    /// Scratch buffer the encoder writes into.
    buf: BytesMut,
}

/// Launch a new client handshake over a TLS stream.
///
/// Call `connect()` on the result to negotiate versions and read the
/// relay's handshake cells, then `finish()` to get the open link.
pub fn start_client_handshake<T>(tls: T) -> OutboundLinkHandshake<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    OutboundLinkHandshake::new(tls)
}

impl<T> LinkSocket<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Construct a link socket and its reactor around a stream whose
    /// handshake has finished.  `readbuf` holds any bytes already
    /// read past the handshake.
    pub(crate) fn new(link_protocol: u16, tls: T, readbuf: BytesMut) -> (Self, Reactor<T>) {
        let (r, w) = tls.split();
        let circmap = Arc::new(Mutex::new(circmap::CircMap::new()));
        let (sendclosed, recvclosed) = oneshot::channel::<()>();

        let reactor = Reactor::new(
            Arc::clone(&circmap),
            recvclosed,
            r,
            readbuf,
            CellCodec::new(link_protocol),
        );

        let inner = LinkImpl {
            link_protocol,
            io: Mutex::new(WriteState {
                w,
                codec: CellCodec::new(link_protocol),
                buf: BytesMut::new(),
            }),
            circmap,
            closeflag: Mutex::new(Some(sendclosed)),
        };

        (
            LinkSocket {
                inner: Arc::new(inner),
            },
            reactor,
        )
    }

    /// Return the negotiated link protocol version.
    pub fn link_protocol(&self) -> u16 {
        self.inner.link_protocol
    }

    /// Refuse to send cells that have no business going from client
    /// to relay on an open link.
    fn check_cell(&self, cell: &Cell) -> Result<()> {
        match cell.msg() {
            CellMsg::Created2(_) => Err(Error::LinkProto(
                "Can't send a created2 cell on a client link".into(),
            )),
            CellMsg::Versions(_)
            | CellMsg::Certs(_)
            | CellMsg::AuthChallenge(_)
            | CellMsg::Netinfo(_) => Err(Error::LinkProto(format!(
                "Can't send {} cell after handshake is done",
                cell.msg().cmd()
            ))),
            _ => Ok(()),
        }
    }

    /// Transmit a single cell on this link.
    pub async fn send_cell(&self, cell: Cell) -> Result<()> {
        trace!("Sending {} on {}", cell.msg().cmd(), cell.circid());
        self.check_cell(&cell)?;

        let mut io = self.inner.io.lock().await;
        io.buf.clear();
        let WriteState { w, codec, buf } = &mut *io;
        codec.write_cell(cell, buf)?;
        w.write_all(buf).await?;
        w.flush().await?;
        Ok(())
    }

    /// Allocate a circuit id on this link and return the circuit
    /// object that owns it.
    ///
    /// The circuit starts out inactive; call `create` on it to build
    /// its first hop.
    pub async fn new_circ<R: Rng>(&self, rng: &mut R) -> Result<Circuit<T>> {
        let (id, receiver) = self.inner.circmap.lock().await.add_ent(rng)?;
        Ok(Circuit::new(id, self.clone(), receiver))
    }

    /// Forget the circuit with the given id: cells for it will be
    /// dropped from now on.
    pub(crate) async fn remove_circ(&self, id: CircId) {
        self.inner.circmap.lock().await.remove(id);
    }

    /// Shut the link down, stopping the reactor.
    pub async fn terminate(&self) {
        if let Some(flag) = self.inner.closeflag.lock().await.take() {
            // An error just means the reactor is already gone.
            let _ = flag.send(());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::testing::stream_pair;

    use torlink_cell::cell::msg;

    use futures::executor::block_on;
    use futures::join;

    /// Everything a well-behaved relay says during the handshake, as
    /// one byte string.
    fn relay_handshake_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&msg::Versions::new(vec![3, 4]).encode_for_handshake());
        let mut codec = CellCodec::new(4);
        let mut buf = BytesMut::new();
        codec
            .write_cell(Cell::new(0.into(), msg::Certs::new(Vec::new())), &mut buf)
            .unwrap();
        codec
            .write_cell(
                Cell::new(0.into(), msg::Netinfo::for_client(0, "192.0.2.7".parse().unwrap())),
                &mut buf,
            )
            .unwrap();
        out.extend_from_slice(&buf);
        out
    }

    #[test]
    fn handshake_across_split_reads() {
        block_on(async {
            let (client, mut relay) = stream_pair();

            let relay_side = async move {
                // Consume the client's VERSIONS before answering.
                let mut hdr = [0_u8; 5];
                relay.read_exact(&mut hdr).await.unwrap();
                let len = u16::from_be_bytes([hdr[3], hdr[4]]) as usize;
                let mut body = vec![0_u8; len];
                relay.read_exact(&mut body).await.unwrap();

                // Dribble our side out in tiny pieces, so no cell
                // ever arrives in one read.
                let script = relay_handshake_bytes();
                for piece in script.chunks(7) {
                    relay.write_all(piece).await.unwrap();
                }
                relay
            };
            let client_side = async move { start_client_handshake(client).connect().await.unwrap() };

            let (mut relay, link) = join!(relay_side, client_side);
            assert_eq!(link.reported_addr(), Some("192.0.2.7".parse().unwrap()));

            let (socket, _reactor) = link.finish("198.51.100.1".parse().unwrap()).await.unwrap();
            assert_eq!(socket.link_protocol(), 4);

            // Our NETINFO went out: one fixed cell, command 8 after
            // the 4-byte circuit id.
            let mut cell = [0_u8; 514];
            relay.read_exact(&mut cell).await.unwrap();
            assert_eq!(&cell[0..5], &[0, 0, 0, 0, 8]);
        });
    }

    #[test]
    fn no_shared_version() {
        block_on(async {
            let (client, mut relay) = stream_pair();

            let relay_side = async move {
                let mut hdr = [0_u8; 5];
                relay.read_exact(&mut hdr).await.unwrap();
                let mut body = vec![0_u8; u16::from_be_bytes([hdr[3], hdr[4]]) as usize];
                relay.read_exact(&mut body).await.unwrap();
                // A versions cell offering only version 99.
                relay.write_all(&[0, 0, 7, 0, 2, 0, 99]).await.unwrap();
            };
            let client_side = async move { start_client_handshake(client).connect().await };

            let (_, r) = join!(relay_side, client_side);
            assert!(matches!(r, Err(Error::NoVersion)));
        });
    }

    #[test]
    fn not_a_relay() {
        block_on(async {
            let (client, mut relay) = stream_pair();
            relay
                .write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n")
                .await
                .unwrap();
            let r = start_client_handshake(client).connect().await;
            assert!(matches!(r, Err(Error::LinkProto(_))));
        });
    }

    #[test]
    fn eof_during_handshake() {
        block_on(async {
            let (client, mut relay) = stream_pair();
            // A correct versions cell, then end-of-stream.  The relay
            // end stays alive so the client's own writes still land.
            relay.write_all(&[0, 0, 7, 0, 2, 0, 4]).await.unwrap();
            relay.close().await.unwrap();
            let r = start_client_handshake(client).connect().await;
            assert!(matches!(r, Err(Error::LinkProto(_))));
            drop(relay);
        });
    }
}
