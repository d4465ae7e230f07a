//! Low-level byte-oriented reading and writing.
//!
//! Everything in the Tor cell protocols is big-endian, with no
//! alignment or padding beyond what each message calls for, so a
//! cursor over a byte slice plus a growable output buffer is all the
//! codec machinery we need.  The [`Readable`] and [`Writeable`] traits
//! are the seam that every message body implements.

use crate::{Error, Result};
use arrayref::array_ref;

/// A cursor that consumes a borrowed byte slice from the front.
///
/// Every `take_*` operation either returns the requested bytes or
/// fails with [`Error::Truncated`] while leaving the cursor where it
/// was, so a failed parse of a partial buffer can simply be retried
/// later with more data.
pub struct Reader<'a> {
    /// The underlying slice.
    b: &'a [u8],
    /// Index of the next byte to consume.
    off: usize,
}

impl<'a> Reader<'a> {
    /// Construct a new Reader over `b`.
    pub fn from_slice(b: &'a [u8]) -> Self {
        Reader { b, off: 0 }
    }
    /// Return the number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.b.len() - self.off
    }
    /// Consume and return the rest of the slice.
    pub fn into_rest(self) -> &'a [u8] {
        &self.b[self.off..]
    }
    /// Try to consume `n` bytes, failing if fewer remain.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::Truncated);
        }
        let res = &self.b[self.off..self.off + n];
        self.off += n;
        Ok(res)
    }
    /// Return the next `n` bytes without consuming them.
    pub fn peek(&self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::Truncated);
        }
        Ok(&self.b[self.off..self.off + n])
    }
    /// Skip `n` bytes.
    pub fn advance(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }
    /// Discard everything beyond the next `n` bytes.
    pub fn truncate(&mut self, n: usize) {
        if n < self.remaining() {
            self.b = &self.b[..self.off + n];
        }
    }
    /// Fail with [`Error::ExtraneousBytes`] unless the reader is empty.
    pub fn should_be_exhausted(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::ExtraneousBytes);
        }
        Ok(())
    }
    /// Consume one byte.
    pub fn take_u8(&mut self) -> Result<u8> {
        let b = self.take(1)?;
        Ok(b[0])
    }
    /// Consume a big-endian u16.
    pub fn take_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes(*array_ref![b, 0, 2]))
    }
    /// Consume a big-endian u32.
    pub fn take_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes(*array_ref![b, 0, 4]))
    }
    /// Decode one `T` from this reader, advancing past it.
    pub fn extract<T: Readable>(&mut self) -> Result<T> {
        T::take_from(self)
    }
}

/// Trait for an output sink that accepts encoded bytes.
pub trait Writer {
    /// Append `bytes` to this writer.
    fn write_all(&mut self, bytes: &[u8]);
    /// Append one byte.
    fn write_u8(&mut self, x: u8) {
        self.write_all(&[x]);
    }
    /// Append a big-endian u16.
    fn write_u16(&mut self, x: u16) {
        self.write_all(&x.to_be_bytes());
    }
    /// Append a big-endian u32.
    fn write_u32(&mut self, x: u32) {
        self.write_all(&x.to_be_bytes());
    }
    /// Append `n` zero bytes.
    fn write_zeros(&mut self, n: usize) {
        let zeros = vec![0u8; n];
        self.write_all(&zeros);
    }
    /// Encode a Writeable onto this writer.
    fn write<E: Writeable + ?Sized>(&mut self, e: &E) {
        e.write_onto(self);
    }
}

/// Trait for an object that can be encoded onto a Writer.
pub trait Writeable {
    /// Encode this object onto `b`.
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B);
}

/// Trait for an object that can be decoded from a Reader.
pub trait Readable: Sized {
    /// Try to decode one of these from `r`, advancing past it.
    fn take_from(r: &mut Reader<'_>) -> Result<Self>;
}

impl Writer for Vec<u8> {
    fn write_all(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
    fn write_u8(&mut self, x: u8) {
        self.push(x);
    }
    fn write_zeros(&mut self, n: usize) {
        let new_len = self.len() + n;
        self.resize(new_len, 0);
    }
}

impl Writer for bytes::BytesMut {
    fn write_all(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

impl Writeable for [u8] {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
        b.write_all(self)
    }
}

impl Writeable for Vec<u8> {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
        b.write_all(&self[..])
    }
}

// Readable and Writeable for the unsigned types we use on the wire.
macro_rules! impl_u {
    ( $t:ty, $wrfn:ident, $rdfn:ident ) => {
        impl Writeable for $t {
            fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
                b.$wrfn(*self)
            }
        }
        impl Readable for $t {
            fn take_from(r: &mut Reader<'_>) -> Result<Self> {
                r.$rdfn()
            }
        }
    };
}
impl_u!(u8, write_u8, take_u8);
impl_u!(u16, write_u16, take_u16);
impl_u!(u32, write_u32, take_u32);

// Readable and Writeable for the fixed-size byte arrays we use.
macro_rules! impl_array {
    ($n:literal) => {
        impl Writeable for [u8; $n] {
            fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
                b.write_all(&self[..])
            }
        }
        impl Readable for [u8; $n] {
            fn take_from(r: &mut Reader<'_>) -> Result<Self> {
                let bytes = r.take($n)?;
                Ok(*array_ref![bytes, 0, $n])
            }
        }
    };
}
impl_array! {4}
impl_array! {16}
impl_array! {20}
impl_array! {32}

/// IP addresses are encoded as their raw octets, not as strings.
mod net_impls {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    impl Writeable for Ipv4Addr {
        fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
            b.write_all(&self.octets()[..])
        }
    }
    impl Readable for Ipv4Addr {
        fn take_from(r: &mut Reader<'_>) -> Result<Self> {
            Ok(r.take_u32()?.into())
        }
    }
    impl Writeable for Ipv6Addr {
        fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
            b.write_all(&self.octets()[..])
        }
    }
    impl Readable for Ipv6Addr {
        fn take_from(r: &mut Reader<'_>) -> Result<Self> {
            let bytes = r.take(16)?;
            Ok((*array_ref![bytes, 0, 16]).into())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reader_basics() {
        let mut r = Reader::from_slice(&b"hello world"[..]);
        assert_eq!(r.remaining(), 11);
        assert_eq!(r.take(5).unwrap(), &b"hello"[..]);
        assert_eq!(r.peek(3).unwrap(), &b" wo"[..]);
        r.advance(1).unwrap();
        assert_eq!(r.into_rest(), &b"world"[..]);
    }

    #[test]
    fn reader_ints() {
        let mut r = Reader::from_slice(&[1, 2, 3, 4, 5, 6, 7][..]);
        assert_eq!(r.take_u8().unwrap(), 1);
        assert_eq!(r.take_u16().unwrap(), 0x0203);
        assert_eq!(r.take_u32().unwrap(), 0x0405_0607);
        assert!(r.should_be_exhausted().is_ok());
        assert_eq!(r.take_u8(), Err(Error::Truncated));
    }

    #[test]
    fn reader_truncated_leaves_position() {
        let mut r = Reader::from_slice(&[9, 9][..]);
        assert_eq!(r.take_u32(), Err(Error::Truncated));
        // A failed take consumes nothing.
        assert_eq!(r.remaining(), 2);
        assert_eq!(r.take_u16().unwrap(), 0x0909);
    }

    #[test]
    fn reader_truncate() {
        let mut r = Reader::from_slice(&[1, 2, 3, 4, 5, 6][..]);
        r.advance(1).unwrap();
        r.truncate(2);
        assert_eq!(r.remaining(), 2);
        assert_eq!(r.should_be_exhausted(), Err(Error::ExtraneousBytes));
        r.advance(2).unwrap();
        assert!(r.should_be_exhausted().is_ok());
    }

    #[test]
    fn writer_basics() {
        let mut v: Vec<u8> = Vec::new();
        v.write_u8(0x57);
        v.write_u16(0x6865);
        v.write_u32(0x6e20_796f);
        v.write_all(b"u wish");
        v.write_zeros(2);
        assert_eq!(&v[..], &b"When you wish\0\0"[..]);
    }

    #[test]
    fn extract_array() {
        let mut r = Reader::from_slice(&b"upon a star"[..]);
        let a: [u8; 4] = r.extract().unwrap();
        assert_eq!(&a, b"upon");
        let b: Result<[u8; 20]> = r.extract();
        assert_eq!(b, Err(Error::Truncated));
    }

    #[test]
    fn addrs() {
        use std::net::{Ipv4Addr, Ipv6Addr};
        let mut v = Vec::new();
        v.write(&Ipv4Addr::new(127, 0, 0, 1));
        v.write(&"::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(v.len(), 20);
        let mut r = Reader::from_slice(&v[..]);
        assert_eq!(r.extract::<Ipv4Addr>().unwrap(), Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(r.extract::<Ipv6Addr>().unwrap(), "::1".parse::<Ipv6Addr>().unwrap());
    }
}
