//! Turn complete cells into wire frames and back.
//!
//! The codec operates on a `BytesMut`: decoding consumes whole frames
//! from the front and leaves any trailing partial frame in place, so
//! the caller can keep appending reads to the same buffer until a
//! full cell is present.

use super::{check_circid, cmd_is_var, msg, Cell, CircId, CELL_DATA_LEN};
use crate::wire::{Reader, Writer};
use crate::{Error, Result};

use arrayref::array_mut_ref;
use bytes::BytesMut;

/// A codec for the negotiated link protocol version.
///
/// The version determines whether circuit ids are 16 or 32 bits wide.
pub struct CellCodec {
    /// The negotiated link version.
    link_version: u16,
}

impl CellCodec {
    /// Construct a codec for the given link version.
    pub fn new(link_version: u16) -> Self {
        CellCodec { link_version }
    }

    /// Length of the circuit id + command header under this version.
    fn hdr_len(&self) -> usize {
        if self.link_version >= 4 {
            5
        } else {
            3
        }
    }

    /// Encode `cell` onto the end of `dst`.
    pub fn write_cell(&mut self, cell: Cell, dst: &mut BytesMut) -> Result<()> {
        let (circid, msg) = cell.into_circid_and_msg();
        let cmd = msg.cmd();
        check_circid(cmd, circid)?;

        let id: u32 = circid.into();
        if self.link_version >= 4 {
            dst.write_u32(id);
        } else {
            if id > u16::MAX as u32 {
                return Err(Error::BadCircId("circuit id too wide for link version"));
            }
            dst.write_u16(id as u16);
        }
        dst.write_u8(cmd);

        if cmd_is_var(cmd) {
            // Length placeholder, backpatched after the body.
            dst.write_u16(0);
            let pos = dst.len();
            msg.encode_onto(dst);
            let body_len = dst.len() - pos;
            if body_len > u16::MAX as usize {
                return Err(Error::Internal);
            }
            *(array_mut_ref![&mut dst[pos - 2..pos], 0, 2]) = (body_len as u16).to_be_bytes();
        } else {
            let pos = dst.len();
            msg.encode_onto(dst);
            let body_len = dst.len() - pos;
            if body_len > CELL_DATA_LEN {
                return Err(Error::Internal);
            }
            dst.write_zeros(CELL_DATA_LEN - body_len);
        }
        Ok(())
    }

    /// Try to decode one complete cell from the front of `src`.
    ///
    /// Returns `Ok(None)` if `src` does not yet hold a whole frame; in
    /// that case nothing is consumed and the caller should read more
    /// bytes and try again.
    pub fn decode_cell(&mut self, src: &mut BytesMut) -> Result<Option<Cell>> {
        let hdr_len = self.hdr_len();
        // Enough for the header plus a var-cell length field?
        if src.len() < hdr_len + 2 {
            return Ok(None);
        }
        let cmd = src[hdr_len - 1];
        let frame_len = if cmd_is_var(cmd) {
            let body_len =
                u16::from_be_bytes([src[hdr_len], src[hdr_len + 1]]) as usize;
            hdr_len + 2 + body_len
        } else {
            hdr_len + CELL_DATA_LEN
        };
        if src.len() < frame_len {
            return Ok(None);
        }

        let frame = src.split_to(frame_len);
        let mut r = Reader::from_slice(&frame[..]);
        let circid: CircId = if self.link_version >= 4 {
            r.take_u32()?.into()
        } else {
            (r.take_u16()? as u32).into()
        };
        let cmd = r.take_u8()?;
        if cmd_is_var(cmd) {
            r.advance(2)?;
        }
        check_circid(cmd, circid)?;
        let msg = msg::CellMsg::decode(cmd, &mut r)?;
        Ok(Some(Cell::new(circid, msg)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cell::msg::{Body, Netinfo, Versions};
    use hex_literal::hex;

    fn roundtrip(version: u16, cell: Cell) -> (Vec<u8>, Cell) {
        let mut codec = CellCodec::new(version);
        let mut bm = BytesMut::new();
        codec.write_cell(cell, &mut bm).unwrap();
        let encoded = bm.to_vec();
        let decoded = codec.decode_cell(&mut bm).unwrap().unwrap();
        assert_eq!(bm.len(), 0);
        (encoded, decoded)
    }

    #[test]
    fn fixed_cell_padding_v4() {
        let body = msg::Create2::new(msg::HTYPE_NTOR, &b"xyz"[..]);
        let (enc, dec) = roundtrip(4, Cell::new(5.into(), body));
        assert_eq!(enc.len(), 5 + CELL_DATA_LEN);
        assert_eq!(&enc[..12], &hex!("00000005 0a 0002 0003 78797a")[..]);
        assert!(enc[12..].iter().all(|b| *b == 0));
        assert_eq!(dec.circid(), CircId::from(5));
    }

    #[test]
    fn fixed_cell_padding_v3() {
        let body = msg::Padding::new();
        let (enc, dec) = roundtrip(3, Cell::new(0.into(), body));
        assert_eq!(enc.len(), 3 + CELL_DATA_LEN);
        assert_eq!(&enc[..3], &hex!("0000 00")[..]);
        assert!(dec.circid().is_zero());
    }

    #[test]
    fn var_cell_length_prefix() {
        let body = Versions::new([3, 4]);
        let (enc, dec) = roundtrip(4, Cell::new(0.into(), body));
        assert_eq!(enc, hex!("00000000 07 0004 0003 0004").to_vec());
        match dec.msg() {
            msg::CellMsg::Versions(v) => {
                assert_eq!(v.best_shared_link_protocol(&[4, 5]), Some(4));
            }
            m => panic!("wrong message type: {:?}", m),
        }
    }

    #[test]
    fn truncated_input_consumes_nothing() {
        let mut codec = CellCodec::new(4);
        let mut bm = BytesMut::new();
        // Header of a fixed cell, but only part of the body.
        bm.extend_from_slice(&hex!("00000001 03 010203"));
        let len = bm.len();
        assert!(codec.decode_cell(&mut bm).unwrap().is_none());
        assert_eq!(bm.len(), len);
        // A var cell missing part of its declared body.
        let mut bm = BytesMut::new();
        bm.extend_from_slice(&hex!("00000000 07 0004 0003"));
        assert!(codec.decode_cell(&mut bm).unwrap().is_none());
    }

    #[test]
    fn trailing_bytes_stay_buffered() {
        let mut codec = CellCodec::new(4);
        let mut bm = BytesMut::new();
        let netinfo = Netinfo::for_client(0, "127.0.0.1".parse().unwrap());
        codec
            .write_cell(Cell::new(0.into(), netinfo.into_message()), &mut bm)
            .unwrap();
        bm.extend_from_slice(b"next frame");
        let cell = codec.decode_cell(&mut bm).unwrap().unwrap();
        assert!(matches!(cell.msg(), msg::CellMsg::Netinfo(_)));
        assert_eq!(&bm[..], b"next frame");
    }

    #[test]
    fn bad_circid_rejected() {
        let mut codec = CellCodec::new(4);
        let mut bm = BytesMut::new();
        let relay = msg::Relay::from_raw([0u8; CELL_DATA_LEN]);
        let res = codec.write_cell(Cell::new(0.into(), relay), &mut bm);
        assert!(matches!(res, Err(Error::BadCircId(_))));
    }

    #[test]
    fn unrecognized_command_is_not_fatal() {
        let mut codec = CellCodec::new(4);
        let mut bm = BytesMut::new();
        // Command 200: unknown, variable-length by rule.
        bm.extend_from_slice(&hex!("00000000 c8 0002 aabb"));
        let cell = codec.decode_cell(&mut bm).unwrap().unwrap();
        match cell.msg() {
            msg::CellMsg::Unrecognized(u) => assert_eq!(u.cmd(), 200),
            m => panic!("wrong message type: {:?}", m),
        }
    }
}
