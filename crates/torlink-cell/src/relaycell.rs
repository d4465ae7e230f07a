//! Encoding and decoding for the relay messages that ride inside
//! RELAY and RELAY_EARLY cells.
//!
//! A relay cell body is always exactly 509 bytes: an 11-byte header
//! (command, "recognized", stream id, digest, length) followed by up
//! to 498 bytes of message, zero-padded.  The recognized and digest
//! fields belong to the circuit's per-hop cryptography; this module
//! writes them as zero on encode and skips them on decode.

pub mod msg;

use crate::cell::{RawCellBody, CELL_DATA_LEN};
use crate::wire::{Reader, Writer};
use crate::{Error, Result};

/// The maximum length of a relay message's payload: the 509-byte cell
/// body minus the 11-byte relay header.
pub const RELAY_DATA_LEN: usize = CELL_DATA_LEN - 11;

/// Identifies a stream within a circuit.  Zero means the message
/// applies to the circuit as a whole.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u16);

impl From<u16> for StreamId {
    fn from(v: u16) -> StreamId {
        StreamId(v)
    }
}
impl From<StreamId> for u16 {
    fn from(id: StreamId) -> u16 {
        id.0
    }
}
impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
impl StreamId {
    /// Return true if this is the zero stream id, reserved for
    /// messages addressed to the circuit itself.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// A relay command, identifying what kind of message follows the
/// relay header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum RelayCmd {
    /// Open a new stream.
    Begin,
    /// Data on a stream.
    Data,
    /// Close a stream.
    End,
    /// Acknowledge a Begin: the stream is open.
    Connected,
    /// Flow-control acknowledgement.
    Sendme,
    /// A hop was removed from the circuit.
    Truncated,
    /// Long-range padding; ignored on receipt.
    Drop,
    /// Extend the circuit by one hop.
    Extend2,
    /// Successful response to an Extend2.
    Extended2,
}

impl RelayCmd {
    /// Return the numeric value of this command on the wire.
    pub fn value(self) -> u8 {
        match self {
            RelayCmd::Begin => 1,
            RelayCmd::Data => 2,
            RelayCmd::End => 3,
            RelayCmd::Connected => 4,
            RelayCmd::Sendme => 5,
            RelayCmd::Truncated => 9,
            RelayCmd::Drop => 10,
            RelayCmd::Extend2 => 14,
            RelayCmd::Extended2 => 15,
        }
    }
    /// Try to convert a wire command byte into a known command.
    pub fn from_value(v: u8) -> Option<RelayCmd> {
        match v {
            1 => Some(RelayCmd::Begin),
            2 => Some(RelayCmd::Data),
            3 => Some(RelayCmd::End),
            4 => Some(RelayCmd::Connected),
            5 => Some(RelayCmd::Sendme),
            9 => Some(RelayCmd::Truncated),
            10 => Some(RelayCmd::Drop),
            14 => Some(RelayCmd::Extend2),
            15 => Some(RelayCmd::Extended2),
            _ => None,
        }
    }
    /// Return true if this command is allowed to arrive with a zero
    /// stream id.
    ///
    /// Data is allowed there too: a data message with no stream is
    /// addressed to the circuit itself and gets dropped by dispatch,
    /// which is not a framing error.
    pub(crate) fn accepts_streamid_zero(cmd: u8) -> bool {
        match RelayCmd::from_value(cmd) {
            Some(RelayCmd::Data)
            | Some(RelayCmd::Sendme)
            | Some(RelayCmd::Truncated)
            | Some(RelayCmd::Drop)
            | Some(RelayCmd::Extend2)
            | Some(RelayCmd::Extended2) => true,
            _ => false,
        }
    }
}

/// A relay message addressed to some stream within a circuit.
#[derive(Debug)]
pub struct RelayCell {
    /// Which stream within the circuit.
    streamid: StreamId,
    /// The message itself.
    msg: msg::RelayMsg,
}

impl RelayCell {
    /// Construct a new relay cell.
    pub fn new<M: Into<msg::RelayMsg>>(streamid: StreamId, msg: M) -> Self {
        RelayCell {
            streamid,
            msg: msg.into(),
        }
    }
    /// Return the stream id this cell is addressed to.
    pub fn stream_id(&self) -> StreamId {
        self.streamid
    }
    /// Return a reference to this cell's message.
    pub fn msg(&self) -> &msg::RelayMsg {
        &self.msg
    }
    /// Consume this cell and return its components.
    pub fn into_streamid_and_msg(self) -> (StreamId, msg::RelayMsg) {
        (self.streamid, self.msg)
    }

    /// Encode this relay cell as a full 509-byte body, with the
    /// recognized and digest fields zeroed.
    ///
    /// The circuit layer fills in the digest and encrypts the result
    /// before it ever touches the wire.
    pub fn encode(self) -> Result<RawCellBody> {
        let mut d = Vec::with_capacity(CELL_DATA_LEN);
        d.write_u8(self.msg.cmd());
        d.write_u16(0); // recognized
        d.write_u16(self.streamid.0);
        d.write_u32(0); // digest
        d.write_u16(0); // length, backpatched below
        let pos = d.len();
        self.msg.encode_onto(&mut d);
        let body_len = d.len() - pos;
        if body_len > RELAY_DATA_LEN {
            return Err(Error::OversizedPayload);
        }
        d[pos - 2..pos].copy_from_slice(&(body_len as u16).to_be_bytes());
        d.resize(CELL_DATA_LEN, 0);

        let mut body = [0u8; CELL_DATA_LEN];
        body.copy_from_slice(&d[..]);
        Ok(body)
    }

    /// Decode a decrypted, digest-verified 509-byte body into a relay
    /// cell.
    pub fn decode(body: RawCellBody) -> Result<Self> {
        let mut r = Reader::from_slice(&body[..]);
        let cmd = r.take_u8()?;
        r.advance(2)?; // recognized, checked during decryption
        let streamid: StreamId = r.take_u16()?.into();
        r.advance(4)?; // digest, checked during decryption
        let len = r.take_u16()? as usize;
        if len > r.remaining() {
            return Err(Error::OversizedPayload);
        }
        if streamid.is_zero() && !RelayCmd::accepts_streamid_zero(cmd) {
            return Err(Error::BadMessage("command not valid on stream id zero"));
        }
        r.truncate(len);
        let msg = msg::RelayMsg::decode(cmd, &mut r)?;
        Ok(RelayCell { streamid, msg })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_layout() {
        let cell = RelayCell::new(0x0203.into(), msg::Data::new(b"hi").unwrap());
        let body = cell.encode().unwrap();
        assert_eq!(
            &body[..13],
            &[2, 0, 0, 2, 3, 0, 0, 0, 0, 0, 2, b'h', b'i'][..]
        );
        assert!(body[13..].iter().all(|b| *b == 0));
    }

    #[test]
    fn roundtrip_data() {
        let cell = RelayCell::new(9.into(), msg::Data::new(b"carried the weight").unwrap());
        let body = cell.encode().unwrap();
        let dec = RelayCell::decode(body).unwrap();
        assert_eq!(dec.stream_id(), StreamId::from(9));
        match dec.msg() {
            msg::RelayMsg::Data(d) => assert_eq!(d.as_ref(), b"carried the weight"),
            m => panic!("wrong message: {:?}", m),
        }
    }

    #[test]
    fn oversized_length_field() {
        let cell = RelayCell::new(9.into(), msg::Data::new(b"x").unwrap());
        let mut body = cell.encode().unwrap();
        // Claim 499 bytes of payload.
        body[9..11].copy_from_slice(&499u16.to_be_bytes());
        assert!(matches!(
            RelayCell::decode(body),
            Err(Error::OversizedPayload)
        ));
    }

    #[test]
    fn begin_on_stream_zero_rejected() {
        let cell = RelayCell::new(0.into(), msg::Begin::new("allium.example", 443, 0).unwrap());
        let body = cell.encode().unwrap();
        assert!(matches!(
            RelayCell::decode(body),
            Err(Error::BadMessage(_))
        ));
    }
}
