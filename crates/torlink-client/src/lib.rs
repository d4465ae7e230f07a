//! A minimal client for talking to the Tor network.
//!
//! This crate ties the protocol pieces of `torlink-proto` together:
//! given something that can pick relays, [`TorClient::bootstrap`]
//! dials the guard over TLS, negotiates a link, builds a three-hop
//! circuit, and hands out anonymized streams.
//!
//! Where the relays come from is the caller's problem; implement
//! [`RouterProvider`] over whatever directory information you have.

#![deny(missing_docs)]

use torlink_proto::circuit::Circuit;
use torlink_proto::stream::DataStream;
use torlink_proto::{start_client_handshake, transport, LinkSocket, OnionRouter, RelayId};

use async_native_tls::TlsStream;
use async_std::net::TcpStream;
use async_std::task;

use log::{info, warn};

use std::net::IpAddr;

use thiserror::Error;

/// The TLS stream type every client link runs over.
type Tls = TlsStream<TcpStream>;

/// An anonymized stream opened through a [`TorClient`].
pub type TorStream<'a> = DataStream<'a, Tls>;

/// An error from bootstrapping or using a client.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The provider had no suitable relay for a hop.
    #[error("no suitable relay available for the {0} hop")]
    NoRelay(&'static str),
    /// The protocol layer failed.
    #[error("protocol failure")]
    Proto(#[from] torlink_proto::Error),
}

/// A Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Something that can pick the relays a circuit is built through.
///
/// Implementations draw on directory information this crate knows
/// nothing about.  `used` carries the identities already in the
/// circuit, so a path never visits the same relay twice.
pub trait RouterProvider {
    /// Pick the guard that anchors a new circuit.
    fn pick_guard(&self) -> Option<OnionRouter>;
    /// Pick a middle relay, avoiding the identities in `used`.
    fn pick_middle(&self, used: &[RelayId]) -> Option<OnionRouter>;
    /// Pick an exit relay, avoiding the identities in `used`.
    fn pick_exit(&self, used: &[RelayId]) -> Option<OnionRouter>;
}

/// A [`RouterProvider`] over a fixed list of relays, picking the
/// first match by consensus flag.
pub struct StaticRouterList {
    /// The relays to choose from.
    routers: Vec<OnionRouter>,
}

impl StaticRouterList {
    /// Build a provider over a fixed relay list.
    pub fn new(routers: Vec<OnionRouter>) -> Self {
        StaticRouterList { routers }
    }

    fn pick<F: Fn(&OnionRouter) -> bool>(&self, used: &[RelayId], f: F) -> Option<OnionRouter> {
        self.routers
            .iter()
            .find(|r| f(r) && !used.contains(&r.id()))
            .cloned()
    }
}

impl RouterProvider for StaticRouterList {
    fn pick_guard(&self) -> Option<OnionRouter> {
        self.pick(&[], |r| r.has_flag("Guard"))
    }
    fn pick_middle(&self, used: &[RelayId]) -> Option<OnionRouter> {
        self.pick(used, |_| true)
    }
    fn pick_exit(&self, used: &[RelayId]) -> Option<OnionRouter> {
        self.pick(used, |r| r.has_flag("Exit"))
    }
}

/// A bootstrapped Tor client: one link to a guard, one three-hop
/// circuit over it.
pub struct TorClient {
    /// The link to the guard.
    link: LinkSocket<Tls>,
    /// The circuit streams are opened on.
    circ: Circuit<Tls>,
}

impl TorClient {
    /// Dial the network and build a three-hop circuit.
    ///
    /// Connects to the guard the provider picks, negotiates a link,
    /// spawns the link's reactor, and extends the circuit through a
    /// middle relay to an exit.
    pub async fn bootstrap<P: RouterProvider>(provider: &P) -> Result<Self> {
        let guard = provider.pick_guard().ok_or(Error::NoRelay("guard"))?;
        let middle = provider
            .pick_middle(&[guard.id()])
            .ok_or(Error::NoRelay("middle"))?;
        let exit = provider
            .pick_exit(&[guard.id(), middle.id()])
            .ok_or(Error::NoRelay("exit"))?;
        info!("picked path {} -> {} -> {}", guard, middle, exit);

        let tls = transport::connect(guard.or_addr().into()).await?;
        let unverified = start_client_handshake(tls).connect().await?;
        let (link, reactor) = unverified.finish(IpAddr::V4(guard.ipv4())).await?;
        task::spawn(async move {
            if let Err(e) = reactor.run().await {
                warn!("link reactor exited: {}", e);
            }
        });

        let mut rng = rand::thread_rng();
        let mut circ = link.new_circ(&mut rng).await?;
        circ.create(&mut rng, &guard).await?;
        circ.extend(&mut rng, &middle).await?;
        circ.extend(&mut rng, &exit).await?;
        info!("circuit {} is open with {} hops", circ.id(), circ.n_hops());

        Ok(TorClient { link, circ })
    }

    /// Open an anonymized connection to `host`:`port` through the
    /// circuit's exit.
    pub async fn begin_stream(&mut self, host: &str, port: u16) -> Result<TorStream<'_>> {
        let mut rng = rand::thread_rng();
        Ok(self.circ.begin_stream(&mut rng, host, port).await?)
    }

    /// Borrow the client's circuit directly.
    pub fn circuit(&mut self) -> &mut Circuit<Tls> {
        &mut self.circ
    }

    /// Tear the circuit and the link down.
    pub async fn shutdown(mut self) {
        self.circ.close().await;
        self.link.terminate().await;
    }
}
