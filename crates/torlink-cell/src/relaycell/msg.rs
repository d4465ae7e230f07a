//! The decoded bodies of each relay message type.

use super::{RelayCmd, RELAY_DATA_LEN};
use crate::cell::msg::DestroyReason;
use crate::wire::{Reader, Writeable, Writer};
use crate::{Error, Result};

use std::net::{IpAddr, Ipv4Addr};

/// Trait implemented by every relay message body.
pub trait Body: Sized {
    /// Convert this body into a [`RelayMsg`].
    fn into_message(self) -> RelayMsg;
    /// Consume this body and encode it onto `w`.
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W);
    /// Decode a body of this type from `r`.
    ///
    /// The reader has already been truncated to the declared payload
    /// length, so "the rest of the reader" is exactly the payload.
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self>;
}

/// The decoded contents of one relay message.
#[derive(Debug)]
#[non_exhaustive]
pub enum RelayMsg {
    /// Open a stream.
    Begin(Begin),
    /// Data on a stream.
    Data(Data),
    /// Close a stream.
    End(End),
    /// Acknowledge a Begin.
    Connected(Connected),
    /// Flow-control credit.
    Sendme(Sendme),
    /// A hop was removed from the circuit.
    Truncated(Truncated),
    /// Long-range padding.
    Drop,
    /// Extend the circuit by one hop.
    Extend2(Extend2),
    /// Successful response to an Extend2.
    Extended2(Extended2),
    /// A relay message whose command we don't recognize.
    Unrecognized(Unrecognized),
}

impl RelayMsg {
    /// Return the wire command byte for this message.
    pub fn cmd(&self) -> u8 {
        use RelayMsg::*;
        match self {
            Begin(_) => RelayCmd::Begin.value(),
            Data(_) => RelayCmd::Data.value(),
            End(_) => RelayCmd::End.value(),
            Connected(_) => RelayCmd::Connected.value(),
            Sendme(_) => RelayCmd::Sendme.value(),
            Truncated(_) => RelayCmd::Truncated.value(),
            Drop => RelayCmd::Drop.value(),
            Extend2(_) => RelayCmd::Extend2.value(),
            Extended2(_) => RelayCmd::Extended2.value(),
            Unrecognized(u) => u.cmd,
        }
    }
    /// Encode this message's body onto `w`.
    pub fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        use RelayMsg::*;
        match self {
            Begin(b) => b.encode_onto(w),
            Data(b) => b.encode_onto(w),
            End(b) => b.encode_onto(w),
            Connected(b) => b.encode_onto(w),
            Sendme(b) => b.encode_onto(w),
            Truncated(b) => b.encode_onto(w),
            Drop => (),
            Extend2(b) => b.encode_onto(w),
            Extended2(b) => b.encode_onto(w),
            Unrecognized(b) => b.encode_onto(w),
        }
    }
    /// Decode the body for command `cmd` from `r`.
    pub fn decode(cmd: u8, r: &mut Reader<'_>) -> Result<Self> {
        Ok(match RelayCmd::from_value(cmd) {
            Some(RelayCmd::Begin) => Begin::decode_from_reader(r)?.into_message(),
            Some(RelayCmd::Data) => Data::decode_from_reader(r)?.into_message(),
            Some(RelayCmd::End) => End::decode_from_reader(r)?.into_message(),
            Some(RelayCmd::Connected) => Connected::decode_from_reader(r)?.into_message(),
            Some(RelayCmd::Sendme) => Sendme::decode_from_reader(r)?.into_message(),
            Some(RelayCmd::Truncated) => Truncated::decode_from_reader(r)?.into_message(),
            Some(RelayCmd::Drop) => RelayMsg::Drop,
            Some(RelayCmd::Extend2) => Extend2::decode_from_reader(r)?.into_message(),
            Some(RelayCmd::Extended2) => Extended2::decode_from_reader(r)?.into_message(),
            None => RelayMsg::Unrecognized(Unrecognized {
                cmd,
                body: r.take(r.remaining())?.into(),
            }),
        })
    }
}

/// Wire a body type into the [`RelayMsg`] enum.
macro_rules! msg_impl {
    ($body:ident) => {
        impl From<$body> for RelayMsg {
            fn from(b: $body) -> RelayMsg {
                RelayMsg::$body(b)
            }
        }
    };
}

/// A begin message: ask the exit to open a TCP connection.
#[derive(Debug, Clone)]
pub struct Begin {
    /// Hostname or textual IP address.
    addr: Vec<u8>,
    /// TCP port.
    port: u16,
    /// Connection flags; zero for ordinary streams.
    flags: u32,
}
msg_impl! {Begin}
impl Begin {
    /// Construct a begin message for `addr:port`.
    pub fn new(addr: &str, port: u16, flags: u32) -> Result<Self> {
        if !addr.is_ascii() || addr.contains('\0') {
            return Err(Error::BadMessage("begin address not printable ascii"));
        }
        Ok(Begin {
            addr: addr.to_lowercase().into_bytes(),
            port,
            flags,
        })
    }
    /// Return the target address as text.
    pub fn addr(&self) -> &[u8] {
        &self.addr[..]
    }
    /// Return the target port.
    pub fn port(&self) -> u16 {
        self.port
    }
}
impl Body for Begin {
    fn into_message(self) -> RelayMsg {
        RelayMsg::Begin(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_all(&self.addr[..]);
        w.write_u8(b':');
        w.write_all(self.port.to_string().as_bytes());
        w.write_u8(0);
        w.write_u32(self.flags);
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let addr_port = {
            let mut a = Vec::new();
            loop {
                match r.take_u8()? {
                    0 => break,
                    b => a.push(b),
                }
            }
            a
        };
        // Flags were added later; tolerate their absence.
        let flags = if r.remaining() >= 4 { r.take_u32()? } else { 0 };
        let colon = addr_port
            .iter()
            .rposition(|b| *b == b':')
            .ok_or(Error::BadMessage("begin address has no port"))?;
        let addr = addr_port[..colon].to_vec();
        let port = std::str::from_utf8(&addr_port[colon + 1..])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(Error::BadMessage("begin port not a number"))?;
        Ok(Begin { addr, port, flags })
    }
}

/// A data message: bytes on a stream.
#[derive(Debug, Clone)]
pub struct Data {
    /// The bytes carried.
    body: Vec<u8>,
}
msg_impl! {Data}
impl Data {
    /// The longest payload a single data message can carry.
    pub const MAXLEN: usize = RELAY_DATA_LEN;

    /// Construct a data message; fails if `body` doesn't fit in one
    /// relay cell.
    pub fn new(body: &[u8]) -> Result<Self> {
        if body.len() > Data::MAXLEN {
            return Err(Error::OversizedPayload);
        }
        Ok(Data { body: body.into() })
    }
}
impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        &self.body[..]
    }
}
impl From<Data> for Vec<u8> {
    fn from(d: Data) -> Vec<u8> {
        d.body
    }
}
impl Body for Data {
    fn into_message(self) -> RelayMsg {
        RelayMsg::Data(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_all(&self.body[..]);
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Data {
            body: r.take(r.remaining())?.into(),
        })
    }
}

/// Declared reason for closing a stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum EndReason {
    /// No reason in particular.
    Misc,
    /// The exit couldn't resolve the hostname.
    ResolveFailed,
    /// The destination refused the connection.
    ConnectRefused,
    /// The exit's policy forbids this destination.
    ExitPolicy,
    /// The circuit is being destroyed.
    Destroy,
    /// Anonymized TCP connection was closed normally.
    Done,
    /// Connection timed out, or the relay gave up.
    Timeout,
    /// No route to the destination.
    NoRoute,
    /// The relay is going to sleep.
    Hibernating,
    /// Internal error at the relay.
    Internal,
    /// The relay has no resources for new connections.
    ResourceLimit,
    /// Connection reset by the destination.
    ConnReset,
    /// Tor protocol violation.
    TorProtocol,
    /// Directory request sent to a non-directory relay.
    NotDirectory,
    /// A reason code we don't recognize.
    Unrecognized(u8),
}

impl EndReason {
    /// Return the wire value for this reason.
    pub fn value(self) -> u8 {
        use EndReason::*;
        match self {
            Misc => 1,
            ResolveFailed => 2,
            ConnectRefused => 3,
            ExitPolicy => 4,
            Destroy => 5,
            Done => 6,
            Timeout => 7,
            NoRoute => 8,
            Hibernating => 9,
            Internal => 10,
            ResourceLimit => 11,
            ConnReset => 12,
            TorProtocol => 13,
            NotDirectory => 14,
            Unrecognized(v) => v,
        }
    }
    /// Convert a wire value into a reason.
    pub fn from_value(v: u8) -> Self {
        use EndReason::*;
        match v {
            1 => Misc,
            2 => ResolveFailed,
            3 => ConnectRefused,
            4 => ExitPolicy,
            5 => Destroy,
            6 => Done,
            7 => Timeout,
            8 => NoRoute,
            9 => Hibernating,
            10 => Internal,
            11 => ResourceLimit,
            12 => ConnReset,
            13 => TorProtocol,
            14 => NotDirectory,
            _ => Unrecognized(v),
        }
    }
}

/// An end message: the stream is closed.
#[derive(Debug, Clone)]
pub struct End {
    /// Why the stream closed.
    reason: EndReason,
    /// For exit-policy refusals, the address the policy applied to
    /// and its TTL.
    addr: Option<(IpAddr, u32)>,
}
msg_impl! {End}
impl End {
    /// Construct an end message with the given reason and no address.
    pub fn new(reason: EndReason) -> Self {
        End { reason, addr: None }
    }
    /// Return the reason this stream ended.
    pub fn reason(&self) -> EndReason {
        self.reason
    }
}
impl Body for End {
    fn into_message(self) -> RelayMsg {
        RelayMsg::End(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_u8(self.reason.value());
        if self.reason == EndReason::ExitPolicy {
            if let Some((addr, ttl)) = self.addr {
                match addr {
                    IpAddr::V4(v4) => w.write(&v4),
                    IpAddr::V6(v6) => w.write(&v6),
                }
                w.write_u32(ttl);
            }
        }
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        if r.remaining() == 0 {
            // Historical: an empty end body means "misc".
            return Ok(End::new(EndReason::Misc));
        }
        let reason = EndReason::from_value(r.take_u8()?);
        let addr = if reason == EndReason::ExitPolicy {
            match r.remaining() {
                8 => {
                    let a: Ipv4Addr = r.extract()?;
                    Some((IpAddr::V4(a), r.take_u32()?))
                }
                20 => {
                    let a: std::net::Ipv6Addr = r.extract()?;
                    Some((IpAddr::V6(a), r.take_u32()?))
                }
                _ => None,
            }
        } else {
            None
        };
        Ok(End { reason, addr })
    }
}

/// A connected message: the exit has opened the stream.
#[derive(Debug, Clone)]
pub struct Connected {
    /// The address the exit connected to, with a TTL, when it chose
    /// to report one.
    addr: Option<(IpAddr, u32)>,
}
msg_impl! {Connected}
impl Connected {
    /// Construct a connected message with no address.
    pub fn new_empty() -> Self {
        Connected { addr: None }
    }
    /// Construct a connected message reporting an address.
    pub fn new_with_addr(addr: IpAddr, ttl: u32) -> Self {
        Connected {
            addr: Some((addr, ttl)),
        }
    }
    /// Return the reported address, if any.
    pub fn addr(&self) -> Option<IpAddr> {
        self.addr.map(|(a, _)| a)
    }
}
impl Body for Connected {
    fn into_message(self) -> RelayMsg {
        RelayMsg::Connected(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        match self.addr {
            None => (),
            Some((IpAddr::V4(v4), ttl)) => {
                w.write(&v4);
                w.write_u32(ttl);
            }
            Some((IpAddr::V6(v6), ttl)) => {
                // Four zero bytes flag the extended form.
                w.write_u32(0);
                w.write_u8(6);
                w.write(&v6);
                w.write_u32(ttl);
            }
        }
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        if r.remaining() == 0 {
            return Ok(Connected::new_empty());
        }
        let first = r.take_u32()?;
        if first != 0 {
            let addr = IpAddr::V4(first.into());
            let ttl = r.take_u32()?;
            return Ok(Connected::new_with_addr(addr, ttl));
        }
        if r.take_u8()? != 6 {
            return Err(Error::BadMessage("unknown address type in connected"));
        }
        let addr: std::net::Ipv6Addr = r.extract()?;
        let ttl = r.take_u32()?;
        Ok(Connected::new_with_addr(IpAddr::V6(addr), ttl))
    }
}

/// A sendme message: restore the recipient's send window.
///
/// A version-1 sendme carries the rolling digest of the last cell it
/// acknowledges.  We emit and parse that digest, but do not yet check
/// it against a record of the digests we sent; either version simply
/// credits the window on receipt.
#[derive(Debug, Clone)]
pub struct Sendme {
    /// Digest carried by a version-1 sendme.
    digest: Option<Vec<u8>>,
}
msg_impl! {Sendme}
impl Sendme {
    /// Construct a version-0 sendme.
    pub fn new_empty() -> Self {
        Sendme { digest: None }
    }
    /// Construct a version-1 sendme carrying `digest`.
    pub fn new_tag(digest: [u8; 20]) -> Self {
        Sendme {
            digest: Some(digest.into()),
        }
    }
    /// Return the acknowledged digest, if this was a version-1 sendme.
    pub fn digest(&self) -> Option<&[u8]> {
        self.digest.as_deref()
    }
}
impl Body for Sendme {
    fn into_message(self) -> RelayMsg {
        RelayMsg::Sendme(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        match self.digest {
            None => w.write_u8(0),
            Some(d) => {
                w.write_u8(1);
                w.write_u16(d.len() as u16);
                w.write_all(&d[..]);
            }
        }
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        if r.remaining() == 0 {
            // Pre-versioned sendme.
            return Ok(Sendme { digest: None });
        }
        match r.take_u8()? {
            0 => Ok(Sendme { digest: None }),
            1 => {
                let dlen = r.take_u16()?;
                let digest = r.take(dlen as usize)?.into();
                Ok(Sendme {
                    digest: Some(digest),
                })
            }
            _ => Err(Error::BadMessage("unknown sendme version")),
        }
    }
}

/// A truncated message: a hop was removed from the circuit.
#[derive(Debug, Clone)]
pub struct Truncated {
    /// The reason the hop was removed.
    reason: DestroyReason,
}
msg_impl! {Truncated}
impl Truncated {
    /// Construct a truncated message.
    pub fn new(reason: DestroyReason) -> Self {
        Truncated { reason }
    }
    /// Return the reason the hop was removed.
    pub fn reason(&self) -> DestroyReason {
        self.reason
    }
}
impl Body for Truncated {
    fn into_message(self) -> RelayMsg {
        RelayMsg::Truncated(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_u8(self.reason.value());
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Truncated {
            reason: DestroyReason::from_value(r.take_u8()?),
        })
    }
}

/// One way of identifying the relay an extend2 message targets.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LinkSpec {
    /// IPv4 address and OR port.
    OrPort(Ipv4Addr, u16),
    /// Legacy RSA identity fingerprint.
    RsaId([u8; 20]),
    /// A link specifier type we don't recognize, carried unmodified.
    Unrecognized {
        /// Declared specifier type.
        lstype: u8,
        /// Raw specifier body.
        body: Vec<u8>,
    },
}

/// Link specifier type for an IPv4 address and port.
const LSTYPE_ORPORT_V4: u8 = 0;
/// Link specifier type for a legacy RSA identity.
const LSTYPE_RSAID: u8 = 2;

impl Writeable for LinkSpec {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) {
        match self {
            LinkSpec::OrPort(addr, port) => {
                w.write_u8(LSTYPE_ORPORT_V4);
                w.write_u8(6);
                w.write(addr);
                w.write_u16(*port);
            }
            LinkSpec::RsaId(id) => {
                w.write_u8(LSTYPE_RSAID);
                w.write_u8(20);
                w.write_all(&id[..]);
            }
            LinkSpec::Unrecognized { lstype, body } => {
                w.write_u8(*lstype);
                w.write_u8(body.len() as u8);
                w.write_all(&body[..]);
            }
        }
    }
}
impl LinkSpec {
    /// Decode one link specifier from `r`.
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let lstype = r.take_u8()?;
        let lslen = r.take_u8()?;
        let body = r.take(lslen as usize)?;
        Ok(match (lstype, lslen) {
            (LSTYPE_ORPORT_V4, 6) => {
                let mut br = Reader::from_slice(body);
                let addr: Ipv4Addr = br.extract()?;
                LinkSpec::OrPort(addr, br.take_u16()?)
            }
            (LSTYPE_RSAID, 20) => {
                let mut id = [0u8; 20];
                id.copy_from_slice(body);
                LinkSpec::RsaId(id)
            }
            (_, _) => LinkSpec::Unrecognized {
                lstype,
                body: body.into(),
            },
        })
    }
}

/// An extend2 message: splice one more hop onto the circuit.
#[derive(Debug, Clone)]
pub struct Extend2 {
    /// How the extending relay should find the new hop.
    linkspec: Vec<LinkSpec>,
    /// Which handshake is inside.
    handshake_type: u16,
    /// The client's handshake message for the new hop.
    handshake: Vec<u8>,
}
msg_impl! {Extend2}
impl Extend2 {
    /// Construct an extend2 message.
    pub fn new<B: Into<Vec<u8>>>(
        linkspec: Vec<LinkSpec>,
        handshake_type: u16,
        handshake: B,
    ) -> Self {
        Extend2 {
            linkspec,
            handshake_type,
            handshake: handshake.into(),
        }
    }
    /// Return the link specifiers.
    pub fn linkspec(&self) -> &[LinkSpec] {
        &self.linkspec[..]
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
impl Body for Extend2 {
    fn into_message(self) -> RelayMsg {
        RelayMsg::Extend2(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_u8(self.linkspec.len() as u8);
        for ls in self.linkspec.iter() {
            w.write(ls);
        }
        w.write_u16(self.handshake_type);
        w.write_u16(self.handshake.len() as u16);
        w.write_all(&self.handshake[..]);
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let n = r.take_u8()?;
        let mut linkspec = Vec::new();
        for _ in 0..n {
            linkspec.push(LinkSpec::take_from(r)?);
        }
        let handshake_type = r.take_u16()?;
        let hlen = r.take_u16()?;
        let handshake = r.take(hlen as usize)?.into();
        Ok(Extend2 {
            linkspec,
            handshake_type,
            handshake,
        })
    }
}

/// An extended2 message: the new hop's handshake response.
#[derive(Debug, Clone)]
pub struct Extended2 {
    /// The new hop's handshake response.
    handshake: Vec<u8>,
}
msg_impl! {Extended2}
impl Extended2 {
    /// Construct an extended2 message.
    pub fn new<B: Into<Vec<u8>>>(handshake: B) -> Self {
        Extended2 {
            handshake: handshake.into(),
        }
    }
    /// Consume this message and return the handshake response.
    pub fn into_body(self) -> Vec<u8> {
        self.handshake
    }
}
impl Body for Extended2 {
    fn into_message(self) -> RelayMsg {
        RelayMsg::Extended2(self)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_u16(self.handshake.len() as u16);
        w.write_all(&self.handshake[..]);
    }
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let hlen = r.take_u16()?;
        let handshake = r.take(hlen as usize)?.into();
        Ok(Extended2 { handshake })
    }
}

/// A relay message whose command we have no decoder for.
#[derive(Debug, Clone)]
pub struct Unrecognized {
    /// The command byte we couldn't place.
    pub(crate) cmd: u8,
    /// Its raw contents.
    pub(crate) body: Vec<u8>,
}
impl From<Unrecognized> for RelayMsg {
    fn from(u: Unrecognized) -> RelayMsg {
        RelayMsg::Unrecognized(u)
    }
}
impl Unrecognized {
    /// Return the command byte.
    pub fn cmd(&self) -> u8 {
        self.cmd
    }
    /// Encode this message's raw contents.
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) {
        w.write_all(&self.body[..]);
    }
}
