//! The decoded bodies of each link-protocol cell type.

use super::{CellCmd, RawCellBody, CELL_DATA_LEN};
use crate::wire::{Readable, Reader, Writeable, Writer};
use crate::{Error, Result};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// The link protocol versions this implementation can speak.
///
/// Version 3 gave us the modern handshake; version 4 widened circuit
/// ids to 32 bits.  We decline anything older or newer.
pub const LINK_VERSIONS: &[u16] = &[3, 4];

/// Trait implemented by every cell body type.
pub trait Body: Sized {
    /// Convert this body into a [`CellMsg`].
    fn into_message(self) -> CellMsg;
    /// Consume this body and encode it onto `w`.
    ///
    /// Does not encode the cell header or any padding.
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W);
    /// Decode a body of this type from `r`.
    ///
    /// Fixed-length cells hand the decoder the entire padded payload;
    /// decoders must tolerate trailing zero padding.
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self>;
}

/// The decoded contents of one cell.
#[derive(Debug)]
#[non_exhaustive]
pub enum CellMsg {
    /// Fixed-length padding. (Ignored.)
    Padding(Padding),
    /// Variable-length padding. (Ignored.)
    Vpadding(Vpadding),
    /// Link version negotiation.
    Versions(Versions),
    /// The peer's certificate chain.
    Certs(Certs),
    /// Link-authentication challenge.
    AuthChallenge(AuthChallenge),
    /// Address and clock information.
    Netinfo(Netinfo),
    /// Extend a circuit to its first hop.
    Create2(Create2),
    /// Successful response to a Create2.
    Created2(Created2),
    /// Tear down a circuit.
    Destroy(Destroy),
    /// An encrypted relay message on some circuit.
    Relay(Relay),
    /// An encrypted relay message that may contain an extend request.
    RelayEarly(Relay),
    /// A cell whose command we don't recognize.
    Unrecognized(Unrecognized),
}

impl CellMsg {
    /// Return the wire command byte for this message.
    pub fn cmd(&self) -> u8 {
        use CellMsg::*;
        match self {
            Padding(_) => CellCmd::Padding.value(),
            Vpadding(_) => CellCmd::Vpadding.value(),
            Versions(_) => CellCmd::Versions.value(),
            Certs(_) => CellCmd::Certs.value(),
            AuthChallenge(_) => CellCmd::AuthChallenge.value(),
            Netinfo(_) => CellCmd::Netinfo.value(),
            Create2(_) => CellCmd::Create2.value(),
            Created2(_) => CellCmd::Created2.value(),
            Destroy(_) => CellCmd::Destroy.value(),
            Relay(_) => CellCmd::Relay.value(),
            RelayEarly(_) => CellCmd::RelayEarly.value(),
            Unrecognized(c) => c.cmd,
        }
    }

    /// Encode this message's body onto `w`.
    pub fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        use CellMsg::*;
        match self {
            Padding(b) => b.encode_onto(w),
            Vpadding(b) => b.encode_onto(w),
            Versions(b) => b.encode_onto(w),
            Certs(b) => b.encode_onto(w),
            AuthChallenge(b) => b.encode_onto(w),
            Netinfo(b) => b.encode_onto(w),
            Create2(b) => b.encode_onto(w),
            Created2(b) => b.encode_onto(w),
            Destroy(b) => b.encode_onto(w),
            Relay(b) | RelayEarly(b) => b.encode_onto(w),
            Unrecognized(b) => b.encode_onto(w),
        }
    }

    /// Decode the body for command `cmd` from `r`.
    pub fn decode(cmd: u8, r: &mut Reader<'_>) -> Result<Self> {
        Ok(match CellCmd::from_value(cmd) {
            Some(CellCmd::Padding) => Padding::decode_from_reader(r)?.into_message(),
            Some(CellCmd::Vpadding) => Vpadding::decode_from_reader(r)?.into_message(),
            Some(CellCmd::Versions) => Versions::decode_from_reader(r)?.into_message(),
            Some(CellCmd::Certs) => Certs::decode_from_reader(r)?.into_message(),
            Some(CellCmd::AuthChallenge) => AuthChallenge::decode_from_reader(r)?.into_message(),
            Some(CellCmd::Netinfo) => Netinfo::decode_from_reader(r)?.into_message(),
            Some(CellCmd::Create2) => Create2::decode_from_reader(r)?.into_message(),
            Some(CellCmd::Created2) => Created2::decode_from_reader(r)?.into_message(),
            Some(CellCmd::Destroy) => Destroy::decode_from_reader(r)?.into_message(),
            Some(CellCmd::Relay) => Relay::decode_from_reader(r)?.into_message(),
            Some(CellCmd::RelayEarly) => {
                CellMsg::RelayEarly(Relay::decode_from_reader(r)?)
            }
            Some(CellCmd::Authenticate) | None => {
                CellMsg::Unrecognized(Unrecognized::decode_with_cmd(cmd, r))
            }
        })
    }
}

/// Wire a body type into the [`CellMsg`] enum.
macro_rules! msg_impl {
    ($body:ident) => {
        impl From<$body> for CellMsg {
            fn from(b: $body) -> CellMsg {
                CellMsg::$body(b)
            }
        }
    };
}

/// A fixed-length padding cell, sent to keep the link alive.
#[derive(Debug, Default, Clone)]
pub struct Padding {}
msg_impl! {Padding}
impl Padding {
    /// Construct a new padding cell.
    pub fn new() -> Self {
        Padding {}
    }
}
impl Body for Padding {
    fn into_message(self) -> CellMsg {
        CellMsg::Padding(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, _w: &mut W) {}
    fn decode_from_reader(_r: &mut Reader<'_>) -> Result<Self> {
        Ok(Padding {})
    }
}

/// A variable-length padding cell.
#[derive(Debug, Clone)]
pub struct Vpadding {
    /// How many bytes of padding to send.
    len: u16,
}
msg_impl! {Vpadding}
impl Body for Vpadding {
    fn into_message(self) -> CellMsg {
        CellMsg::Vpadding(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_zeros(self.len as usize);
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        if r.remaining() > u16::MAX as usize {
            return Err(Error::BadMessage("too much padding"));
        }
        let len = r.remaining() as u16;
        r.advance(len as usize)?;
        Ok(Vpadding { len })
    }
}

/// A versions cell: the first cell on the link in either direction,
/// listing the link protocol versions each side can speak.
#[derive(Debug, Clone)]
pub struct Versions {
    /// The versions offered, in wire order.
    versions: Vec<u16>,
}
msg_impl! {Versions}
impl Versions {
    /// Construct a new versions cell.
    pub fn new<T: Into<Vec<u16>>>(versions: T) -> Self {
        Versions {
            versions: versions.into(),
        }
    }
    /// Encode this cell as a complete frame for the link handshake.
    ///
    /// The versions cell always uses the old 2-byte circuit id, since
    /// it is sent before any version has been negotiated.
    pub fn encode_for_handshake(self) -> Vec<u8> {
        let mut v = Vec::new();
        v.write_u16(0); // circuit id
        v.write_u8(CellCmd::Versions.value());
        v.write_u16((self.versions.len() * 2) as u16);
        for ver in self.versions.iter() {
            v.write_u16(*ver);
        }
        v
    }
    /// Return the best link protocol version shared between `self`
    /// and the versions this implementation supports, if any.
    pub fn best_shared_link_protocol(&self, supported: &[u16]) -> Option<u16> {
        self.versions
            .iter()
            .filter(|v| supported.contains(v))
            .max()
            .copied()
    }
}
impl Body for Versions {
    fn into_message(self) -> CellMsg {
        CellMsg::Versions(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        for v in self.versions.iter() {
            w.write_u16(*v);
        }
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let mut versions = Vec::new();
        while r.remaining() >= 2 {
            versions.push(r.take_u16()?);
        }
        r.should_be_exhausted()?;
        Ok(Versions { versions })
    }
}

/// One certificate within a [`Certs`] cell.
///
/// We keep the type byte and the raw body; this implementation does
/// not validate certificate contents, since the circuit handshake
/// (not the link certificates) is its trust anchor.
#[derive(Debug, Clone)]
pub struct TorCert {
    /// Declared type of this certificate.
    pub cert_type: u8,
    /// Raw certificate body.
    pub cert: Vec<u8>,
}

/// A certs cell, giving the peer's certificate chain.
#[derive(Debug, Clone, Default)]
pub struct Certs {
    /// The certificates, in wire order.
    certs: Vec<TorCert>,
}
msg_impl! {Certs}
impl Certs {
    /// Construct a certs cell from a list of certificates.
    pub fn new(certs: Vec<TorCert>) -> Self {
        Certs { certs }
    }
    /// Return the raw body of the first certificate of the given
    /// type, if any.
    pub fn cert_body(&self, cert_type: u8) -> Option<&[u8]> {
        self.certs
            .iter()
            .find(|c| c.cert_type == cert_type)
            .map(|c| &c.cert[..])
    }
}
impl Body for Certs {
    fn into_message(self) -> CellMsg {
        CellMsg::Certs(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_u8(self.certs.len() as u8);
        for c in self.certs {
            w.write_u8(c.cert_type);
            w.write_u16(c.cert.len() as u16);
            w.write_all(&c.cert[..]);
        }
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let n = r.take_u8()?;
        let mut certs = Vec::new();
        for _ in 0..n {
            let cert_type = r.take_u8()?;
            let len = r.take_u16()?;
            let cert = r.take(len as usize)?.into();
            certs.push(TorCert { cert_type, cert });
        }
        Ok(Certs { certs })
    }
}

/// An authentication challenge from the relay.
///
/// Clients that don't authenticate (that's us) read it and move on.
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    /// Random challenge bytes.
    challenge: [u8; 32],
    /// Authentication methods the relay will accept.
    methods: Vec<u16>,
}
msg_impl! {AuthChallenge}
impl Body for AuthChallenge {
    fn into_message(self) -> CellMsg {
        CellMsg::AuthChallenge(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_all(&self.challenge[..]);
        w.write_u16(self.methods.len() as u16);
        for m in self.methods {
            w.write_u16(m);
        }
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let challenge = r.extract()?;
        let n_methods = r.take_u16()?;
        let mut methods = Vec::new();
        for _ in 0..n_methods {
            methods.push(r.take_u16()?);
        }
        Ok(AuthChallenge { challenge, methods })
    }
}

/// Encode one netinfo address record.
fn enc_one_netinfo_addr<W: Writer + ?Sized>(w: &mut W, addr: &IpAddr) {
    match addr {
        IpAddr::V4(ipv4) => {
            w.write_u8(0x04);
            w.write_u8(4);
            w.write(ipv4);
        }
        IpAddr::V6(ipv6) => {
            w.write_u8(0x06);
            w.write_u8(16);
            w.write(ipv6);
        }
    }
}

/// Decode one netinfo address record; unknown or malformed address
/// types are skipped and yield None.
fn take_one_netinfo_addr(r: &mut Reader<'_>) -> Result<Option<IpAddr>> {
    let atype = r.take_u8()?;
    let alen = r.take_u8()?;
    let abody = r.take(alen as usize)?;
    match (atype, alen) {
        (0x04, 4) => {
            let bytes = [abody[0], abody[1], abody[2], abody[3]];
            Ok(Some(IpAddr::V4(bytes.into())))
        }
        (0x06, 16) => {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(abody);
            Ok(Some(IpAddr::V6(bytes.into())))
        }
        (_, _) => Ok(None),
    }
}

/// A netinfo cell, exchanged at the end of the link handshake.
#[derive(Debug, Clone)]
pub struct Netinfo {
    /// The sender's clock, in seconds since the epoch.
    timestamp: u32,
    /// The address the sender believes the other side of the link has.
    other_addr: Option<IpAddr>,
    /// Addresses the sender claims for itself.
    my_addrs: Vec<IpAddr>,
}
msg_impl! {Netinfo}
impl Netinfo {
    /// Construct the netinfo reply a client sends to finish the link
    /// handshake.  `relay_addr` is the address of the relay we dialed.
    pub fn for_client(timestamp: u32, relay_addr: IpAddr) -> Self {
        Netinfo {
            timestamp,
            other_addr: Some(relay_addr),
            my_addrs: Vec::new(), // clients don't advertise addresses
        }
    }
    /// Return the address the sender believes we have, if it sent one
    /// we could parse.
    pub fn other_addr(&self) -> Option<IpAddr> {
        self.other_addr
    }
}
impl Body for Netinfo {
    fn into_message(self) -> CellMsg {
        CellMsg::Netinfo(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_u32(self.timestamp);
        match self.other_addr {
            Some(addr) => enc_one_netinfo_addr(w, &addr),
            None => {
                // A zero-length "unspecified" address record.
                w.write_u8(0);
                w.write_u8(0);
            }
        }
        w.write_u8(self.my_addrs.len() as u8);
        for addr in self.my_addrs.iter() {
            enc_one_netinfo_addr(w, addr);
        }
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let timestamp = r.take_u32()?;
        let other_addr = take_one_netinfo_addr(r)?;
        let n_addrs = r.take_u8()?;
        let mut my_addrs = Vec::new();
        for _ in 0..n_addrs {
            if let Some(a) = take_one_netinfo_addr(r)? {
                my_addrs.push(a);
            }
        }
        Ok(Netinfo {
            timestamp,
            other_addr,
            my_addrs,
        })
    }
}

/// Handshake type value for the ntor handshake in CREATE2 and
/// EXTEND2 messages.
pub const HTYPE_NTOR: u16 = 0x0002;

/// A create2 cell: launch the first hop of a circuit.
#[derive(Debug, Clone)]
pub struct Create2 {
    /// Which handshake is inside.
    handshake_type: u16,
    /// The client's handshake message.
    handshake: Vec<u8>,
}
msg_impl! {Create2}
impl Create2 {
    /// Construct a create2 message for the given handshake type.
    pub fn new<B: Into<Vec<u8>>>(handshake_type: u16, handshake: B) -> Self {
        Create2 {
            handshake_type,
            handshake: handshake.into(),
        }
    }
    /// Return the handshake type.
    pub fn handshake_type(&self) -> u16 {
        self.handshake_type
    }
    /// Return the handshake body.
    pub fn body(&self) -> &[u8] {
        &self.handshake[..]
    }
}
impl Body for Create2 {
    fn into_message(self) -> CellMsg {
        CellMsg::Create2(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_u16(self.handshake_type);
        w.write_u16(self.handshake.len() as u16);
        w.write_all(&self.handshake[..]);
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let handshake_type = r.take_u16()?;
        let hlen = r.take_u16()?;
        let handshake = r.take(hlen as usize)?.into();
        Ok(Create2 {
            handshake_type,
            handshake,
        })
    }
}

/// A created2 cell: the relay's answer to our create2.
///
/// For the ntor handshake the body is the relay's ephemeral public
/// key (32 bytes) followed by its authentication tag (32 bytes).
#[derive(Debug, Clone)]
pub struct Created2 {
    /// The relay's handshake response.
    handshake: Vec<u8>,
}
msg_impl! {Created2}
impl Created2 {
    /// Construct a created2 message.
    pub fn new<B: Into<Vec<u8>>>(handshake: B) -> Self {
        Created2 {
            handshake: handshake.into(),
        }
    }
    /// Consume this message and return the handshake response.
    pub fn into_body(self) -> Vec<u8> {
        self.handshake
    }
}
impl Body for Created2 {
    fn into_message(self) -> CellMsg {
        CellMsg::Created2(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_u16(self.handshake.len() as u16);
        w.write_all(&self.handshake[..]);
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let hlen = r.take_u16()?;
        let handshake = r.take(hlen as usize)?.into();
        Ok(Created2 { handshake })
    }
}

/// Declared reason for tearing down a circuit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum DestroyReason {
    /// No reason given.
    None,
    /// A protocol violation.
    Protocol,
    /// Internal error at the relay.
    Internal,
    /// Requested by a truncate message.
    Requested,
    /// The relay is going to sleep.
    Hibernating,
    /// The relay is out of some resource.
    ResourceLimit,
    /// Couldn't connect to the next relay.
    ConnectFailed,
    /// The next relay presented the wrong identity.
    OrIdentity,
    /// The connection carrying this circuit closed.
    ChannelClosed,
    /// The circuit expired.
    Finished,
    /// Circuit construction took too long.
    Timeout,
    /// The circuit was destroyed without a client truncate.
    Destroyed,
    /// No such hidden service.
    NoSuchService,
    /// A reason code we don't recognize.
    Unrecognized(u8),
}

impl DestroyReason {
    /// Return the wire value for this reason.
    pub fn value(self) -> u8 {
        use DestroyReason::*;
        match self {
            None => 0,
            Protocol => 1,
            Internal => 2,
            Requested => 3,
            Hibernating => 4,
            ResourceLimit => 5,
            ConnectFailed => 6,
            OrIdentity => 7,
            ChannelClosed => 8,
            Finished => 9,
            Timeout => 10,
            Destroyed => 11,
            NoSuchService => 12,
            Unrecognized(v) => v,
        }
    }
    /// Convert a wire value into a reason.
    pub fn from_value(v: u8) -> Self {
        use DestroyReason::*;
        match v {
            0 => None,
            1 => Protocol,
            2 => Internal,
            3 => Requested,
            4 => Hibernating,
            5 => ResourceLimit,
            6 => ConnectFailed,
            7 => OrIdentity,
            8 => ChannelClosed,
            9 => Finished,
            10 => Timeout,
            11 => Destroyed,
            12 => NoSuchService,
            _ => Unrecognized(v),
        }
    }
}

impl std::fmt::Display for DestroyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use DestroyReason::*;
        let s = match self {
            None => "no reason",
            Protocol => "tor protocol violation",
            Internal => "internal error",
            Requested => "client sent a TRUNCATE command",
            Hibernating => "relay is hibernating",
            ResourceLimit => "relay is out of resources",
            ConnectFailed => "unable to reach relay",
            OrIdentity => "connected, but relay had wrong identity",
            ChannelClosed => "connection failed",
            Finished => "circuit expired for being too dirty or old",
            Timeout => "circuit construction took too long",
            Destroyed => "circuit was destroyed without client truncate",
            NoSuchService => "no such onion service",
            Unrecognized(v) => return write!(f, "unrecognized reason {}", v),
        };
        write!(f, "{}", s)
    }
}

/// A destroy cell: tear down the circuit it names.
#[derive(Debug, Clone)]
pub struct Destroy {
    /// Why the circuit is being torn down.
    reason: DestroyReason,
}
msg_impl! {Destroy}
impl Destroy {
    /// Construct a destroy message.
    pub fn new(reason: DestroyReason) -> Self {
        Destroy { reason }
    }
    /// Return the reason for this destroy.
    pub fn reason(&self) -> DestroyReason {
        self.reason
    }
}
impl Body for Destroy {
    fn into_message(self) -> CellMsg {
        CellMsg::Destroy(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_u8(self.reason.value());
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        // Some implementations send an empty body; treat it as "none".
        let reason = match r.take_u8() {
            Ok(v) => DestroyReason::from_value(v),
            Err(_) => DestroyReason::None,
        };
        Ok(Destroy { reason })
    }
}

/// The still-encrypted body of a relay or relay-early cell.
///
/// The contents are opaque at this layer: they can only be parsed
/// after the circuit has peeled its encryption and verified the
/// rolling digest.
pub struct Relay {
    /// The encrypted body.
    body: Box<RawCellBody>,
}
msg_impl! {Relay}
impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay").finish()
    }
}
impl Relay {
    /// Construct a relay cell around an already-assembled body.
    pub fn from_raw(body: RawCellBody) -> Self {
        Relay {
            body: Box::new(body),
        }
    }
    /// Consume this message and return the raw body.
    pub fn into_raw(self) -> RawCellBody {
        *self.body
    }
    /// Wrap this message so it is sent as RELAY_EARLY.
    pub fn into_early(self) -> CellMsg {
        CellMsg::RelayEarly(self)
    }
}
impl Body for Relay {
    fn into_message(self) -> CellMsg {
        CellMsg::Relay(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_all(&self.body[..]);
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let mut body = Box::new([0u8; CELL_DATA_LEN]);
        body.copy_from_slice(r.take(CELL_DATA_LEN)?);
        Ok(Relay { body })
    }
}

/// A cell whose command we have no decoder for.
///
/// Kept so that an unknown cell can be logged and dropped instead of
/// poisoning the link.
#[derive(Debug, Clone)]
pub struct Unrecognized {
    /// The command byte we couldn't place.
    cmd: u8,
    /// Its raw contents.
    content: Vec<u8>,
}
msg_impl! {Unrecognized}
impl Unrecognized {
    /// Construct an unrecognized cell.
    pub fn new<B: Into<Vec<u8>>>(cmd: u8, content: B) -> Self {
        Unrecognized {
            cmd,
            content: content.into(),
        }
    }
    /// Return the command byte.
    pub fn cmd(&self) -> u8 {
        self.cmd
    }
    /// Decode the rest of `r` as the contents of an unrecognized cell.
    fn decode_with_cmd(cmd: u8, r: &mut Reader<'_>) -> Self {
        Unrecognized {
            cmd,
            content: r.peek(r.remaining()).map(Vec::from).unwrap_or_default(),
        }
    }
}
impl Body for Unrecognized {
    fn into_message(self) -> CellMsg {
        CellMsg::Unrecognized(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_all(&self.content[..]);
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let content = r.take(r.remaining())?.into();
        Ok(Unrecognized { cmd: 0, content })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn encoded(msg: CellMsg) -> Vec<u8> {
        let mut v = Vec::new();
        msg.encode_onto(&mut v);
        v
    }

    #[test]
    fn versions_handshake_framing() {
        let v = Versions::new([3, 4]);
        let enc = v.encode_for_handshake();
        assert_eq!(enc, vec![0, 0, 7, 0, 4, 0, 3, 0, 4]);
    }

    #[test]
    fn versions_selection() {
        let v = Versions::new([1, 2, 3, 4, 5]);
        assert_eq!(v.best_shared_link_protocol(LINK_VERSIONS), Some(4));
        let v = Versions::new([3]);
        assert_eq!(v.best_shared_link_protocol(LINK_VERSIONS), Some(3));
        let v = Versions::new([1, 2, 99]);
        assert_eq!(v.best_shared_link_protocol(LINK_VERSIONS), None);
    }

    #[test]
    fn netinfo_roundtrip() {
        let addr: IpAddr = "18.244.0.188".parse().unwrap();
        let msg = Netinfo::for_client(0x5eed_5eed, addr);
        let enc = encoded(msg.into_message());
        assert_eq!(
            enc,
            vec![0x5e, 0xed, 0x5e, 0xed, 0x04, 4, 18, 244, 0, 188, 0]
        );
        let mut r = Reader::from_slice(&enc[..]);
        let dec = Netinfo::decode_from_reader(&mut r).unwrap();
        assert_eq!(dec.other_addr(), Some(addr));
    }

    #[test]
    fn netinfo_skips_unknown_addr_types() {
        // type 0x20 (unknown), length 3.
        let body = [0, 0, 0, 0, 0x20, 3, 1, 2, 3, 0];
        let mut r = Reader::from_slice(&body[..]);
        let dec = Netinfo::decode_from_reader(&mut r).unwrap();
        assert_eq!(dec.other_addr(), None);
    }

    #[test]
    fn create2_created2() {
        let c = Create2::new(HTYPE_NTOR, &b"forward"[..]);
        let enc = encoded(c.into_message());
        assert_eq!(enc, vec![0, 2, 0, 7, b'f', b'o', b'r', b'w', b'a', b'r', b'd']);
        let mut r = Reader::from_slice(&enc[..]);
        let dec = Create2::decode_from_reader(&mut r).unwrap();
        assert_eq!(dec.handshake_type(), HTYPE_NTOR);
        assert_eq!(dec.body(), b"forward");

        let c = Created2::new(&b"backward"[..]);
        let enc = encoded(c.into_message());
        // Trailing padding, as in a real fixed-length cell.
        let mut padded = enc.clone();
        padded.resize(509, 0);
        let mut r = Reader::from_slice(&padded[..]);
        let dec = Created2::decode_from_reader(&mut r).unwrap();
        assert_eq!(dec.into_body(), b"backward".to_vec());
    }

    #[test]
    fn destroy_reasons() {
        for v in 0..=255u8 {
            assert_eq!(DestroyReason::from_value(v).value(), v);
        }
        let enc = encoded(Destroy::new(DestroyReason::ConnectFailed).into_message());
        assert_eq!(enc, vec![6]);
        let mut r = Reader::from_slice(&[][..]);
        let dec = Destroy::decode_from_reader(&mut r).unwrap();
        assert_eq!(dec.reason(), DestroyReason::None);
    }

    #[test]
    fn certs_lookup() {
        let certs = Certs::new(vec![
            TorCert {
                cert_type: 1,
                cert: b"one".to_vec(),
            },
            TorCert {
                cert_type: 4,
                cert: b"four".to_vec(),
            },
        ]);
        let enc = encoded(certs.into_message());
        let mut r = Reader::from_slice(&enc[..]);
        let dec = Certs::decode_from_reader(&mut r).unwrap();
        assert_eq!(dec.cert_body(4), Some(&b"four"[..]));
        assert_eq!(dec.cert_body(7), None);
    }
}
