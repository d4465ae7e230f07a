//! Code to handle incoming cells on a link.
//!
//! The reactor owns the read half of the TLS stream.  It reassembles
//! cells out of arbitrarily-sized reads and hands each one to the
//! circuit it belongs to.

use super::circmap::CircMap;
use crate::{Error, Result};

use torlink_cell::cell::codec::CellCodec;
use torlink_cell::cell::msg::CellMsg;
use torlink_cell::cell::{Cell, CircId};

use bytes::BytesMut;
use futures::channel::oneshot;
use futures::future::Fuse;
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use futures::lock::Mutex;
use futures::select_biased;
use futures::sink::SinkExt;
use futures::FutureExt;

use std::sync::Arc;

use log::{debug, trace, warn};

/// Size of one read from the transport.
const READ_CHUNK_LEN: usize = 2048;

/// Object to handle incoming cells on a link.
///
/// This type is returned when you finish a link handshake; you need
/// to spawn a task that calls `run()` on it.
#[must_use = "If you don't call run() on a reactor, the link won't work."]
pub struct Reactor<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Signal that the owning socket wants the link shut down.
    closeflag: Fuse<oneshot::Receiver<()>>,
    /// The read half of the TLS stream.
    input: ReadHalf<T>,
    /// Carry-over buffer: bytes read but not yet parsed as a cell.
    buf: BytesMut,
    /// Frame decoder for the negotiated link version.
    codec: CellCodec,
    /// Cell-handling state shared with the socket.
    core: ReactorCore,
}

/// The dispatch half of the reactor, separate so that cell handling
/// doesn't borrow the read machinery.
struct ReactorCore {
    /// Map from circuit id to that circuit's inbound queue.
    circs: Arc<Mutex<CircMap>>,
}

impl<T> Reactor<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Construct a new Reactor.
    pub(super) fn new(
        circmap: Arc<Mutex<CircMap>>,
        closeflag: oneshot::Receiver<()>,
        input: ReadHalf<T>,
        buf: BytesMut,
        codec: CellCodec,
    ) -> Self {
        Reactor {
            closeflag: closeflag.fuse(),
            input,
            buf,
            codec,
            core: ReactorCore { circs: circmap },
        }
    }

    /// Launch the reactor, and run until the link closes or we
    /// encounter an error.
    ///
    /// Whatever the outcome, every circuit on the link sees its queue
    /// close, so none of them waits on a dead link forever.
    pub async fn run(mut self) -> Result<()> {
        let mut close_future = self.closeflag;
        let mut chunk = vec![0_u8; READ_CHUNK_LEN];

        let result = 'outer: loop {
            // Drain every complete frame already buffered.
            loop {
                match self.codec.decode_cell(&mut self.buf) {
                    Ok(Some(cell)) => {
                        if let Err(e) = self.core.handle_cell(cell).await {
                            break 'outer Err(e);
                        }
                    }
                    Ok(None) => break,
                    // A frame that decoded badly is dropped; the codec
                    // has already consumed it, so reassembly of the
                    // next frame is unaffected.
                    Err(e) => warn!("dropping undecodable cell: {}", e),
                }
            }

            let mut read_future = self.input.read(&mut chunk[..]).fuse();
            let item = select_biased! {
                _ = close_future => break Ok(()), // we were asked to close
                item = read_future => item,
            };
            match item {
                Ok(0) => break Ok(()), // the stream closed.
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) => break 'outer Err(e.into()),
            }
        };

        // Closing the queues is what tells the circuits the link is
        // gone.
        self.core.circs.lock().await.clear();
        result
    }
}

impl ReactorCore {
    /// Process one cell received on the link.  Most cells get ignored
    /// or rejected; relay traffic gets delivered to its circuit.
    async fn handle_cell(&mut self, cell: Cell) -> Result<()> {
        let (circid, msg) = cell.into_circid_and_msg();
        trace!("Received {} on {}", msg.cmd(), circid);

        match msg {
            // These aren't allowed on a client link.
            CellMsg::Create2(_) | CellMsg::RelayEarly(_) => Err(Error::LinkProto(format!(
                "{} cell on client link",
                msg.cmd()
            ))),

            // These aren't allowed after the handshake is done.
            CellMsg::Versions(_)
            | CellMsg::Certs(_)
            | CellMsg::AuthChallenge(_)
            | CellMsg::Netinfo(_) => Err(Error::LinkProto(format!(
                "{} cell after handshake is done",
                msg.cmd()
            ))),

            // These are always ignored.
            CellMsg::Padding(_) | CellMsg::Vpadding(_) | CellMsg::Unrecognized(_) => Ok(()),

            // A relay tearing down any circuit is a guard-level
            // failure: the whole link goes down with it.
            m @ CellMsg::Destroy(_) => {
                self.deliver_msg(circid, m).await?;
                Err(Error::LinkClosed("relay destroyed a circuit"))
            }

            // These are allowed and need to be handled.
            m @ CellMsg::Relay(_) | m @ CellMsg::Created2(_) => self.deliver_msg(circid, m).await,

            // The message enum is open-ended; anything else would
            // have decoded as Unrecognized above.
            _ => Ok(()),
        }
    }

    /// Give `msg` to the appropriate circuit.
    async fn deliver_msg(&mut self, circid: CircId, msg: CellMsg) -> Result<()> {
        let mut map = self.circs.lock().await;

        if let Some(sender) = map.get_mut(circid) {
            if sender.send(msg).await.is_err() {
                // The circuit went away; forget it.
                debug!("circuit {} is gone; dropping cell", circid);
                map.remove(circid);
            }
            Ok(())
        } else {
            debug!("cell for unknown circuit {}; dropping", circid);
            Ok(())
        }
    }
}
