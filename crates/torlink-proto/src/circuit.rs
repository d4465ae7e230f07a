//! Multi-hop circuits through the Tor network.
//!
//! A circuit is built one hop at a time: `create` negotiates keys
//! with the guard, and each `extend` asks the last hop to pass a
//! handshake one relay further.  Once built, `begin_stream` opens an
//! anonymized TCP connection through the final hop.
//!
//! A circuit is owned by a single task; everything here takes `&mut
//! self`, and only the link it runs over is shared.

pub(crate) mod sendme;

use crate::crypto::cell::{CryptoBox, RelayCellBody};
use crate::crypto::handshake::ntor::{self, NtorHandshakeState};
use crate::link::LinkSocket;
use crate::router::OnionRouter;
use crate::stream::DataStream;
use crate::{Error, Result};

use torlink_cell::cell::msg::{self, CellMsg, HTYPE_NTOR};
use torlink_cell::cell::{Cell, CircId};
use torlink_cell::relaycell::msg::{self as rmsg, EndReason, LinkSpec, RelayMsg};
use torlink_cell::relaycell::{RelayCell, StreamId};

use futures::io::{AsyncRead, AsyncWrite};
use futures::stream::StreamExt;

use futures::channel::mpsc;
use rand::{CryptoRng, Rng};

use std::collections::{HashMap, VecDeque};
use std::mem;

use log::{debug, info};

/// Where a circuit is in its lifecycle.
///
/// The handshake-carrying states own the ntor state for the hop being
/// negotiated; it is taken out when the relay's reply arrives.
enum CircuitState {
    /// Allocated, but no CREATE2 sent yet.
    Inactive,
    /// CREATE2 sent; waiting for CREATED2.
    Creating(NtorHandshakeState),
    /// One hop open.
    Created,
    /// EXTEND2 sent; waiting for EXTENDED2.
    Extending(NtorHandshakeState),
    /// Two or more hops open.
    Extended,
    /// Torn down; nothing more can happen here.
    Closed,
}

/// One open hop of a circuit.
struct CircHop {
    /// The relay at this hop.
    router: OnionRouter,
    /// The onion-layer keys shared with it.
    crypto: CryptoBox,
}

/// Per-stream state the circuit keeps.
struct StreamEnt {
    /// The stream's flow-control windows.
    window: sendme::FlowWindow,
    /// Data received but not yet picked up by the stream's reader.
    pending: VecDeque<Vec<u8>>,
    /// Set when the exit has closed the stream.
    received_end: Option<EndReason>,
}

impl StreamEnt {
    fn new() -> Self {
        StreamEnt {
            window: sendme::FlowWindow::new_stream(),
            pending: VecDeque::new(),
            received_end: None,
        }
    }
}

/// A client's view of a circuit, open or in progress.
pub struct Circuit<T: AsyncRead + AsyncWrite + Unpin> {
    /// This circuit's id on its link.
    id: CircId,
    /// The link the circuit runs over.
    link: LinkSocket<T>,
    /// Inbound cells for this circuit, fed by the link's reactor.
    input: mpsc::Receiver<CellMsg>,
    /// Where the circuit is in its lifecycle.
    state: CircuitState,
    /// The open hops, guard first.
    hops: Vec<CircHop>,
    /// Circuit-level flow control, shared by every stream.
    circ_window: sendme::FlowWindow,
    /// The open streams, by id.
    streams: HashMap<StreamId, StreamEnt>,
}

impl<T> Circuit<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Construct a circuit that has an id on a link but no hops yet.
    pub(crate) fn new(id: CircId, link: LinkSocket<T>, input: mpsc::Receiver<CellMsg>) -> Self {
        Circuit {
            id,
            link,
            input,
            state: CircuitState::Inactive,
            hops: Vec::new(),
            circ_window: sendme::FlowWindow::new_circ(),
            streams: HashMap::new(),
        }
    }

    /// Return this circuit's id on its link.
    pub fn id(&self) -> CircId {
        self.id
    }

    /// Return the number of open hops.
    pub fn n_hops(&self) -> usize {
        self.hops.len()
    }

    /// Return the relay at hop `n`, if the circuit reaches that far.
    /// Hop 0 is the guard.
    pub fn hop_router(&self, n: usize) -> Option<&OnionRouter> {
        self.hops.get(n).map(|h| &h.router)
    }

    /// True if the circuit has at least one hop and no handshake or
    /// teardown in progress.
    pub fn is_open(&self) -> bool {
        matches!(self.state, CircuitState::Created | CircuitState::Extended)
    }

    /// Negotiate the first hop of this circuit with `guard`, which
    /// must be the relay the underlying link connects to.
    pub async fn create<R>(&mut self, rng: &mut R, guard: &OnionRouter) -> Result<()>
    where
        R: Rng + CryptoRng,
    {
        if !matches!(self.state, CircuitState::Inactive) {
            return Err(Error::BadState("circuit has already been used"));
        }
        info!("circuit {}: creating through {}", self.id, guard);

        let (hs, cmsg) = ntor::client_handshake(rng, &guard.ntor_public());
        self.state = CircuitState::Creating(hs);
        self.send_msg(msg::Create2::new(HTYPE_NTOR, cmsg).into())
            .await?;

        let created = match self.read_msg().await? {
            CellMsg::Created2(c) => c,
            CellMsg::Destroy(d) => {
                info!("circuit {}: relay refused it: {}", self.id, d.reason());
                self.close_inner();
                return Err(Error::CircExtend("Relay refused to create the circuit"));
            }
            m => {
                self.close_inner();
                return Err(Error::CircProto(format!(
                    "Got cell command {} in response to CREATE2",
                    m.cmd()
                )));
            }
        };

        let hs = match mem::replace(&mut self.state, CircuitState::Closed) {
            CircuitState::Creating(hs) => hs,
            _ => return Err(Error::Internal("create handshake state went missing")),
        };
        // On a bad reply the state stays Closed and the hop is dead.
        let keygen = ntor::client_complete(&hs, created.into_body())?;
        let crypto = CryptoBox::construct(keygen)?;
        self.hops.push(CircHop {
            router: guard.clone(),
            crypto,
        });
        self.state = CircuitState::Created;
        debug!("circuit {}: first hop open", self.id);
        Ok(())
    }

    /// Ask the last hop to extend this circuit to `next`.
    ///
    /// Traffic for already-open streams keeps flowing while the
    /// extend is pending.
    pub async fn extend<R>(&mut self, rng: &mut R, next: &OnionRouter) -> Result<()>
    where
        R: Rng + CryptoRng,
    {
        match self.state {
            CircuitState::Created | CircuitState::Extended => (),
            _ => return Err(Error::BadState("circuit isn't ready to extend")),
        }
        info!("circuit {}: extending to {}", self.id, next);

        let (hs, cmsg) = ntor::client_handshake(rng, &next.ntor_public());
        let linkspec = vec![
            LinkSpec::OrPort(next.ipv4(), next.port()),
            LinkSpec::RsaId(next.id().to_array()),
        ];
        let extend = rmsg::Extend2::new(linkspec, HTYPE_NTOR, cmsg);

        let hop = self.hops.len() - 1;
        self.state = CircuitState::Extending(hs);
        // An extend request must travel in a RELAY_EARLY cell.
        self.send_relay_cell(hop, true, RelayCell::new(0.into(), extend))
            .await?;

        let reply = loop {
            let (from_hop, cell) = self.recv_relay_cell().await?;
            let (streamid, m) = cell.into_streamid_and_msg();
            match m {
                RelayMsg::Extended2(e) => {
                    if from_hop != hop || !streamid.is_zero() {
                        self.close_inner();
                        return Err(Error::CircProto(
                            "EXTENDED2 from somewhere other than the extending hop".into(),
                        ));
                    }
                    break e;
                }
                m => self.dispatch_msg(from_hop, streamid, m).await?,
            }
        };

        let hs = match mem::replace(&mut self.state, CircuitState::Closed) {
            CircuitState::Extending(hs) => hs,
            _ => return Err(Error::Internal("extend handshake state went missing")),
        };
        let keygen = ntor::client_complete(&hs, reply.into_body())?;
        let crypto = CryptoBox::construct(keygen)?;
        self.hops.push(CircHop {
            router: next.clone(),
            crypto,
        });
        self.state = CircuitState::Extended;
        debug!("circuit {}: now {} hops", self.id, self.hops.len());
        Ok(())
    }

    /// Open an anonymized connection to `host`:`port` through the
    /// last hop of this circuit.
    pub async fn begin_stream<R: Rng>(
        &mut self,
        rng: &mut R,
        host: &str,
        port: u16,
    ) -> Result<DataStream<'_, T>> {
        match self.state {
            CircuitState::Created | CircuitState::Extended => (),
            _ => return Err(Error::BadState("circuit isn't open")),
        }
        let id = self.alloc_stream_id(rng);
        self.streams.insert(id, StreamEnt::new());
        debug!(
            "circuit {}: opening stream {} to {}:{}",
            self.id, id, host, port
        );

        let begin = rmsg::Begin::new(host, port, 0)?;
        let hop = self.hops.len() - 1;
        self.send_relay_cell(hop, false, RelayCell::new(id, begin))
            .await?;

        loop {
            let (from_hop, cell) = self.recv_relay_cell().await?;
            let (streamid, m) = cell.into_streamid_and_msg();
            if streamid != id {
                self.dispatch_msg(from_hop, streamid, m).await?;
                continue;
            }
            match m {
                RelayMsg::Connected(c) => {
                    if let Some(a) = c.addr() {
                        debug!("stream {}: connected from {}", id, a);
                    }
                    return Ok(DataStream::new(self, id));
                }
                RelayMsg::End(e) => {
                    self.streams.remove(&id);
                    info!("stream {}: exit refused it: {:?}", id, e.reason());
                    return Err(Error::StreamClosed("exit refused to open the stream"));
                }
                m => self.dispatch_msg(from_hop, streamid, m).await?,
            }
        }
    }

    /// Return a handle for an already-open stream on this circuit.
    pub fn stream(&mut self, id: StreamId) -> DataStream<'_, T> {
        DataStream::new(self, id)
    }

    /// Tear this circuit down and forget it on the link.
    pub async fn close(&mut self) {
        self.link.remove_circ(self.id).await;
        self.close_inner();
    }

    /// Send one DATA cell's worth of bytes on a stream.
    ///
    /// Fails with [`Error::WindowExhausted`] when either the stream
    /// or the circuit window is out of credit; the caller should read
    /// inbound traffic (which carries SENDMEs) and retry.
    pub(crate) async fn send_data(&mut self, id: StreamId, body: &[u8]) -> Result<()> {
        match self.state {
            CircuitState::Created | CircuitState::Extended => (),
            _ => return Err(Error::BadState("circuit isn't open")),
        }
        {
            let ent = self
                .streams
                .get_mut(&id)
                .ok_or(Error::StreamClosed("no such stream"))?;
            if ent.received_end.is_some() {
                return Err(Error::StreamClosed("stream was closed by the exit"));
            }
            if !ent.window.can_authorize() || !self.circ_window.can_authorize() {
                return Err(Error::WindowExhausted);
            }
            ent.window.authorize_send();
            self.circ_window.authorize_send();
        }
        let data = rmsg::Data::new(body)?;
        let hop = self.hops.len() - 1;
        self.send_relay_cell(hop, false, RelayCell::new(id, data))
            .await
    }

    /// Wait for the next chunk of data on a stream.
    ///
    /// Returns `Ok(None)` once the exit has closed the stream and all
    /// buffered data has been read.
    pub(crate) async fn read_stream(&mut self, id: StreamId) -> Result<Option<Vec<u8>>> {
        loop {
            match self.streams.get_mut(&id) {
                None => return Err(Error::StreamClosed("no such stream")),
                Some(ent) => {
                    if let Some(chunk) = ent.pending.pop_front() {
                        return Ok(Some(chunk));
                    }
                    if ent.received_end.is_some() {
                        return Ok(None);
                    }
                }
            }
            let (from_hop, cell) = self.recv_relay_cell().await?;
            let (streamid, m) = cell.into_streamid_and_msg();
            self.dispatch_msg(from_hop, streamid, m).await?;
        }
    }

    /// Close a stream we opened, telling the exit we're done with it.
    pub(crate) async fn end_stream(&mut self, id: StreamId) -> Result<()> {
        let ent = match self.streams.remove(&id) {
            Some(ent) => ent,
            None => return Ok(()),
        };
        // If the exit already ended the stream there is nobody left
        // to tell.
        if ent.received_end.is_some() || self.hops.is_empty() {
            return Ok(());
        }
        let hop = self.hops.len() - 1;
        self.send_relay_cell(hop, false, RelayCell::new(id, rmsg::End::new(EndReason::Done)))
            .await
    }

    /// Pick an unused nonzero stream id.
    fn alloc_stream_id<R: Rng>(&self, rng: &mut R) -> StreamId {
        loop {
            let id: StreamId = rng.gen::<u16>().into();
            if !id.is_zero() && !self.streams.contains_key(&id) {
                return id;
            }
        }
    }

    /// Transmit `msg` on this circuit's id.
    async fn send_msg(&mut self, msg: CellMsg) -> Result<()> {
        self.link.send_cell(Cell::new(self.id, msg)).await
    }

    /// Wait for the next cell addressed to this circuit.
    async fn read_msg(&mut self) -> Result<CellMsg> {
        match self.input.next().await {
            Some(m) => Ok(m),
            None => {
                self.close_inner();
                Err(Error::CircuitClosed("the link went away"))
            }
        }
    }

    /// Encode a relay cell, address it to hop `hop`, wrap it in that
    /// many onion layers, and transmit it.
    async fn send_relay_cell(&mut self, hop: usize, early: bool, cell: RelayCell) -> Result<()> {
        let mut body: RelayCellBody = cell.encode()?.into();
        self.hops[hop].crypto.client_originate(&mut body);
        for h in self.hops[..=hop].iter_mut().rev() {
            h.crypto.client_encrypt(&mut body);
        }
        let relay = msg::Relay::from_raw(body.into());
        let msg = if early { relay.into_early() } else { relay.into() };
        self.send_msg(msg).await
    }

    /// Wait for a relay cell, peel it, and say which hop sent it.
    ///
    /// A cell no hop recognizes means the circuit's crypto state is
    /// ruined, so the circuit closes.
    async fn recv_relay_cell(&mut self) -> Result<(usize, RelayCell)> {
        let body = match self.read_msg().await? {
            CellMsg::Relay(r) => r,
            CellMsg::Destroy(d) => {
                info!("circuit {}: destroyed by the relay: {}", self.id, d.reason());
                self.close_inner();
                return Err(Error::CircuitClosed("relay sent a DESTROY"));
            }
            m => {
                self.close_inner();
                return Err(Error::CircProto(format!(
                    "Got unexpected cell command {} on an open circuit",
                    m.cmd()
                )));
            }
        };

        let mut cell = RelayCellBody::from(body.into_raw());
        let mut hopnum = None;
        for (i, hop) in self.hops.iter_mut().enumerate() {
            hop.crypto.client_decrypt(&mut cell);
            if hop.crypto.client_recognized(&mut cell) {
                hopnum = Some(i);
                break;
            }
        }
        match hopnum {
            Some(h) => Ok((h, RelayCell::decode(cell.into())?)),
            None => {
                self.close_inner();
                Err(Error::BadCellAuth)
            }
        }
    }

    /// Process one relay message, closing the circuit if it turns out
    /// to be fatal.
    async fn dispatch_msg(&mut self, hop: usize, streamid: StreamId, msg: RelayMsg) -> Result<()> {
        let r = self.handle_relay_msg(hop, streamid, msg).await;
        if r.is_err() {
            self.close_inner();
        }
        r
    }

    /// Process one relay message that isn't the reply some operation
    /// is waiting for.
    async fn handle_relay_msg(
        &mut self,
        hop: usize,
        streamid: StreamId,
        msg: RelayMsg,
    ) -> Result<()> {
        match msg {
            RelayMsg::Data(d) => self.handle_data(hop, streamid, d).await,
            RelayMsg::Sendme(_) => {
                // The stream id says which level the credit is for.
                // A circuit-level v1 body carries a digest; verifying
                // it is the relay's job, not ours, so we don't.
                if streamid.is_zero() {
                    self.circ_window.received_sendme()
                } else if let Some(ent) = self.streams.get_mut(&streamid) {
                    ent.window.received_sendme()
                } else {
                    debug!("SENDME for unknown stream {}; dropping", streamid);
                    Ok(())
                }
            }
            RelayMsg::End(e) => {
                match self.streams.get_mut(&streamid) {
                    Some(ent) => {
                        debug!("stream {} ended by exit: {:?}", streamid, e.reason());
                        ent.received_end = Some(e.reason());
                    }
                    None => debug!("END for unknown stream {}; dropping", streamid),
                }
                Ok(())
            }
            RelayMsg::Truncated(t) => {
                info!("circuit {}: truncated: {}", self.id, t.reason());
                Err(Error::CircuitClosed("a hop was removed from the circuit"))
            }
            RelayMsg::Drop => Ok(()),
            RelayMsg::Connected(_) => {
                debug!("unsolicited CONNECTED on stream {}; dropping", streamid);
                Ok(())
            }
            RelayMsg::Unrecognized(u) => {
                debug!("relay cell with unknown command {}; dropping", u.cmd());
                Ok(())
            }
            m => Err(Error::CircProto(format!(
                "Client got a {} relay cell",
                m.cmd()
            ))),
        }
    }

    /// Handle an inbound DATA cell: account for it against both
    /// windows, send any SENDMEs we now owe, and queue the bytes for
    /// the stream's reader.
    async fn handle_data(&mut self, hop: usize, streamid: StreamId, d: rmsg::Data) -> Result<()> {
        if self.circ_window.received_data()? {
            // A circuit-level SENDME goes back to the hop the data
            // came from, carrying the digest of the last cell we
            // recognized from it.
            let tag = self.hops[hop].crypto.last_backward_digest();
            self.send_relay_cell(hop, false, RelayCell::new(0.into(), rmsg::Sendme::new_tag(tag)))
                .await?;
            self.circ_window.delivered_sendme();
        }

        if streamid.is_zero() {
            debug!("DATA cell addressed to no stream; dropping");
            return Ok(());
        }
        let owed = match self.streams.get_mut(&streamid) {
            Some(ent) => {
                let owed = ent.window.received_data()?;
                ent.pending.push_back(d.into());
                owed
            }
            None => {
                debug!("DATA for unknown stream {}; dropping", streamid);
                return Ok(());
            }
        };
        if owed {
            self.send_relay_cell(hop, false, RelayCell::new(streamid, rmsg::Sendme::new_empty()))
                .await?;
            if let Some(ent) = self.streams.get_mut(&streamid) {
                ent.window.delivered_sendme();
            }
        }
        Ok(())
    }

    /// Mark this circuit dead.  The link learns about it when the
    /// owner calls `close`, or when the link itself goes away.
    fn close_inner(&mut self) {
        self.state = CircuitState::Closed;
        self.streams.clear();
    }
}
