//! Descriptions of the relays a circuit is built through.
//!
//! Relay selection and directory handling live with the caller; this
//! crate only needs each hop's address, keys, and enough metadata for
//! the caller to pick suitable hops.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use x25519_dalek::PublicKey;

use crate::crypto::handshake::ntor::NtorPublicKey;

/// A relay's RSA identity fingerprint, as a 20 byte SHA1 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelayId([u8; 20]);

impl RelayId {
    /// Construct a RelayId from a 20 byte slice.
    ///
    /// Returns None if the slice has the wrong length.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == 20 {
            let mut b = [0u8; 20];
            b.copy_from_slice(bytes);
            Some(RelayId(b))
        } else {
            None
        }
    }

    /// Return this identity as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }

    /// Return this identity as a fixed-size array.
    pub fn to_array(&self) -> [u8; 20] {
        self.0
    }
}

impl From<[u8; 20]> for RelayId {
    fn from(b: [u8; 20]) -> Self {
        RelayId(b)
    }
}

impl fmt::Display for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", hex::encode(self.0))
    }
}

impl fmt::Debug for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelayId({})", self)
    }
}

/// Everything we need to know about a relay in order to connect to it
/// or extend a circuit to it.
#[derive(Clone, Debug)]
pub struct OnionRouter {
    /// The relay's self-chosen nickname.  Not unique; only useful for
    /// logs.
    name: String,
    /// RSA identity fingerprint.
    id: RelayId,
    /// IPv4 OR address.
    addr: Ipv4Addr,
    /// Port for the OR protocol.
    or_port: u16,
    /// Port for the directory protocol, or 0 if the relay has none.
    dir_port: u16,
    /// Curve25519 onion key for the ntor handshake.
    ntor_onion_key: PublicKey,
    /// Consensus flags ("Guard", "Exit", "Fast", ...), as published.
    flags: Vec<String>,
}

impl OnionRouter {
    /// Construct a new OnionRouter description.
    pub fn new(
        name: String,
        id: RelayId,
        addr: Ipv4Addr,
        or_port: u16,
        dir_port: u16,
        ntor_onion_key: PublicKey,
        flags: Vec<String>,
    ) -> Self {
        OnionRouter {
            name,
            id,
            addr,
            or_port,
            dir_port,
            ntor_onion_key,
            flags,
        }
    }

    /// Return this relay's nickname.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return this relay's identity fingerprint.
    pub fn id(&self) -> RelayId {
        self.id
    }

    /// Return this relay's IPv4 address.
    pub fn ipv4(&self) -> Ipv4Addr {
        self.addr
    }

    /// Return this relay's OR port.
    pub fn port(&self) -> u16 {
        self.or_port
    }

    /// Return this relay's directory port, or 0 if it has none.
    pub fn dir_port(&self) -> u16 {
        self.dir_port
    }

    /// Return this relay's OR address and port together.
    pub fn or_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.addr, self.or_port)
    }

    /// Return this relay's ntor onion key.
    pub fn ntor_onion_key(&self) -> &PublicKey {
        &self.ntor_onion_key
    }

    /// True if the relay carries the given consensus flag.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// The key bundle the ntor handshake wants.
    pub(crate) fn ntor_public(&self) -> NtorPublicKey {
        NtorPublicKey {
            id: self.id,
            pk: self.ntor_onion_key,
        }
    }
}

impl fmt::Display for OnionRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] at {}", self.name, self.id, self.or_addr())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn example() -> OnionRouter {
        OnionRouter::new(
            "PoptartRelay".into(),
            RelayId::from([3; 20]),
            Ipv4Addr::new(127, 0, 0, 1),
            9001,
            9030,
            PublicKey::from([9; 32]),
            vec!["Fast".into(), "Guard".into(), "Running".into()],
        )
    }

    #[test]
    fn relay_id() {
        assert!(RelayId::from_bytes(&[7; 19]).is_none());
        assert!(RelayId::from_bytes(&[7; 21]).is_none());
        let id = RelayId::from_bytes(&[7; 20]).unwrap();
        assert_eq!(id.as_bytes(), &[7; 20]);
        assert_eq!(
            format!("{}", id),
            "$0707070707070707070707070707070707070707"
        );
    }

    #[test]
    fn router_accessors() {
        let r = example();
        assert_eq!(r.name(), "PoptartRelay");
        assert_eq!(r.ipv4(), Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(r.port(), 9001);
        assert_eq!(r.dir_port(), 9030);
        assert_eq!(r.or_addr(), "127.0.0.1:9001".parse().unwrap());
        assert_eq!(r.id(), RelayId::from([3; 20]));
        assert_eq!(r.ntor_onion_key().as_bytes(), &[9; 32]);
    }

    #[test]
    fn flags() {
        let r = example();
        assert!(r.has_flag("Guard"));
        assert!(r.has_flag("Fast"));
        assert!(!r.has_flag("Exit"));
        assert!(!r.has_flag("guard"));
    }
}
