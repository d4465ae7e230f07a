//! Handshakes, circuit cryptography, and cell dispatch for the core
//! Tor client protocol.
//!
//! # Overview
//!
//! This crate turns the cell types of `torlink-cell` into a working
//! protocol engine:
//!
//! * [`link`] owns the TLS byte stream to a guard relay, negotiates
//!   the link protocol, reassembles cells from arbitrary reads, and
//!   dispatches them by circuit id.
//! * [`circuit`] is the client's view of one circuit: the ntor
//!   handshakes that build it, the per-hop onion encryption, the
//!   sliding-window flow control, and the streams multiplexed on it.
//! * [`crypto`] holds the pieces with no protocol state machine in
//!   them: relay-cell encryption layers and the ntor key agreement.
//!
//! Certificate validation is intentionally absent: a Tor client's
//! trust anchor is the relay identity baked into the ntor handshake,
//! not web PKI.

#![deny(missing_docs)]

pub mod circuit;
mod crypto;
mod err;
pub mod link;
pub mod router;
pub mod stream;
pub mod transport;
mod util;

pub use circuit::Circuit;
pub use err::Error;
pub use link::{start_client_handshake, LinkSocket};
pub use router::{OnionRouter, RelayId};
pub use stream::DataStream;

use zeroize::Zeroizing;

/// A vector of bytes that gets cleared when it's dropped.
pub type SecretBytes = Zeroizing<Vec<u8>>;

/// A Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
