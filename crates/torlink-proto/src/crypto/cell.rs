//! Per-hop relay cell encryption.
//!
//! Each hop of a circuit holds an AES-128-CTR cipher and a rolling
//! SHA1 digest for each direction.  The client onion-encrypts an
//! outbound relay cell once per hop, innermost layer first; inbound
//! cells are peeled one layer per hop until some hop recognizes the
//! cell as its own.

use crate::crypto::handshake::KeyGenerator;
use crate::util::ct;
use crate::Result;

use torlink_cell::cell::RawCellBody;

use arrayref::array_ref;
use cipher::{NewCipher, StreamCipher};
use generic_array::GenericArray;
use sha1::{Digest, Sha1};

/// AES-128 in counter mode with a full 128 bit big-endian counter.
pub(crate) type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Number of bytes of key material a hop needs: two 20 byte digest
/// seeds followed by two 16 byte AES keys.
pub(crate) const HOP_KEY_LEN: usize = 20 + 20 + 16 + 16;

/// A 509 byte relay cell body as seen by the crypto layer.
#[derive(Clone)]
pub(crate) struct RelayCellBody(pub(crate) RawCellBody);

impl From<RawCellBody> for RelayCellBody {
    fn from(body: RawCellBody) -> Self {
        RelayCellBody(body)
    }
}
impl From<RelayCellBody> for RawCellBody {
    fn from(cell: RelayCellBody) -> Self {
        cell.0
    }
}
impl AsRef<[u8]> for RelayCellBody {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl RelayCellBody {
    /// Return the digest field of this cell.
    fn digest(&self) -> &[u8; 4] {
        array_ref![self.0, 5, 4]
    }
    /// Overwrite the digest field of this cell.
    fn set_digest(&mut self, d: &[u8]) {
        self.0[5..9].copy_from_slice(&d[0..4]);
    }
    /// True if the recognized field is zero.
    fn recognized_field_zero(&self) -> bool {
        self.0[1] == 0 && self.0[2] == 0
    }
}

/// One direction of a hop's crypto: a stream cipher and the rolling
/// digest over every cell sent that way.
struct CryptoLayer {
    /// AES-128-CTR keystream, zero IV.
    cipher: Aes128Ctr,
    /// Rolling SHA1 over all relay cells originated in this
    /// direction, seeded from the handshake.
    digest: Sha1,
}

impl CryptoLayer {
    fn new(digest_seed: &[u8], key: &[u8]) -> Self {
        let mut digest = Sha1::new();
        digest.update(digest_seed);
        let zero_iv = GenericArray::default();
        let cipher = Aes128Ctr::new(GenericArray::from_slice(key), &zero_iv);
        CryptoLayer { cipher, digest }
    }

    /// Fill in the digest field of an originating cell and absorb the
    /// cell into the rolling digest.  The digest field must be zero
    /// on entry.
    fn originate(&mut self, cell: &mut RelayCellBody) {
        self.digest.update(&cell.0[..]);
        let d = self.digest.clone().finalize();
        cell.set_digest(&d);
    }

    /// Check whether `cell` was originated by the peer that holds the
    /// other end of this layer.
    ///
    /// The rolling digest is only advanced when the check succeeds,
    /// so a cell meant for a later hop leaves this layer untouched.
    /// On success returns the full 20 byte running digest.
    fn recognized(&mut self, cell: &mut RelayCellBody) -> Option<[u8; 20]> {
        if !cell.recognized_field_zero() {
            return None;
        }
        let received = *cell.digest();
        cell.set_digest(&[0_u8; 4]);
        let mut dtmp = self.digest.clone();
        dtmp.update(&cell.0[..]);
        let computed = dtmp.clone().finalize();
        cell.set_digest(&received);

        if ct::bytes_eq(&received[..], &computed[0..4]) {
            self.digest = dtmp;
            let mut full = [0_u8; 20];
            full.copy_from_slice(&computed[..]);
            Some(full)
        } else {
            None
        }
    }
}

/// The complete crypto state one hop contributes to a circuit.
///
/// The client keeps one of these per hop; a relay keeps one per
/// circuit.  Both are built from the same 72 bytes of handshake
/// output, so the two sides' layers mirror each other.
pub(crate) struct CryptoBox {
    /// Client-to-relay direction: Df digest seed, Kf cipher key.
    fwd: CryptoLayer,
    /// Relay-to-client direction: Db digest seed, Kb cipher key.
    back: CryptoLayer,
    /// Running digest of the most recently recognized inbound cell,
    /// kept for authenticated SENDME bodies.
    last_back_digest: [u8; 20],
}

impl CryptoBox {
    /// Build a hop's crypto state from a finished handshake.
    pub(crate) fn construct<K: KeyGenerator>(keygen: K) -> Result<Self> {
        let seed = keygen.expand(HOP_KEY_LEN)?;
        Ok(Self::from_seed(array_ref![&seed[..], 0, HOP_KEY_LEN]))
    }

    /// Build a hop's crypto state from raw key material laid out as
    /// Df || Db || Kf || Kb.
    fn from_seed(seed: &[u8; HOP_KEY_LEN]) -> Self {
        CryptoBox {
            fwd: CryptoLayer::new(&seed[0..20], &seed[40..56]),
            back: CryptoLayer::new(&seed[20..40], &seed[56..72]),
            last_back_digest: [0_u8; 20],
        }
    }

    /// Client side: fill in the digest field of a cell this hop is
    /// the destination of.
    pub(crate) fn client_originate(&mut self, cell: &mut RelayCellBody) {
        self.fwd.originate(cell);
    }

    /// Client side: add this hop's layer of encryption to an
    /// outbound cell.
    pub(crate) fn client_encrypt(&mut self, cell: &mut RelayCellBody) {
        self.fwd.cipher.apply_keystream(&mut cell.0[..]);
    }

    /// Client side: peel this hop's layer off an inbound cell.
    pub(crate) fn client_decrypt(&mut self, cell: &mut RelayCellBody) {
        self.back.cipher.apply_keystream(&mut cell.0[..]);
    }

    /// Client side: after peeling, check whether this hop originated
    /// the cell.  Advances the backward digest only on success.
    pub(crate) fn client_recognized(&mut self, cell: &mut RelayCellBody) -> bool {
        match self.back.recognized(cell) {
            Some(d) => {
                self.last_back_digest = d;
                true
            }
            None => false,
        }
    }

    /// The running digest as of the most recently recognized inbound
    /// cell, as carried by an authenticated SENDME.
    pub(crate) fn last_backward_digest(&self) -> [u8; 20] {
        self.last_back_digest
    }

    /// Relay side: peel the single layer off a forward cell.
    pub(crate) fn relay_decrypt(&mut self, cell: &mut RelayCellBody) {
        self.fwd.cipher.apply_keystream(&mut cell.0[..]);
    }

    /// Relay side: check whether a peeled forward cell is addressed
    /// to this relay.
    pub(crate) fn relay_recognized(&mut self, cell: &mut RelayCellBody) -> bool {
        self.fwd.recognized(cell).is_some()
    }

    /// Relay side: fill in the digest of a cell this relay
    /// originates toward the client.
    pub(crate) fn relay_originate(&mut self, cell: &mut RelayCellBody) {
        self.back.originate(cell);
    }

    /// Relay side: add the single backward layer of encryption.
    pub(crate) fn relay_encrypt(&mut self, cell: &mut RelayCellBody) {
        self.back.cipher.apply_keystream(&mut cell.0[..]);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn aes128ctr_testvec() {
        // NIST SP 800-38A F.5.1, AES-128 CTR.
        let key = hex!("2b7e151628aed2a6abf7158809cf4f3c");
        let iv = hex!("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff");
        let mut block = hex!("6bc1bee22e409f96e93d7e117393172a");
        let mut cipher = Aes128Ctr::new(
            GenericArray::from_slice(&key),
            GenericArray::from_slice(&iv),
        );
        cipher.apply_keystream(&mut block);
        assert_eq!(&block[..], &hex!("874d6191b620e3261bef6864990db6ce")[..]);
    }

    fn cell_with_text(text: &[u8]) -> RelayCellBody {
        // A plausible RELAY_DATA body: cmd 2, recognized and digest
        // zero, stream 1, length filled in.
        let mut body = [0_u8; 509];
        body[0] = 2;
        body[4] = 1;
        body[9] = (text.len() >> 8) as u8;
        body[10] = (text.len() & 0xff) as u8;
        body[11..11 + text.len()].copy_from_slice(text);
        RelayCellBody(body)
    }

    fn mirrored_boxes(n: usize) -> (Vec<CryptoBox>, Vec<CryptoBox>) {
        let mut client = Vec::new();
        let mut relays = Vec::new();
        for i in 0..n {
            let mut seed = [0_u8; HOP_KEY_LEN];
            for (j, b) in seed.iter_mut().enumerate() {
                *b = (i * 7 + j) as u8;
            }
            client.push(CryptoBox::from_seed(&seed));
            relays.push(CryptoBox::from_seed(&seed));
        }
        (client, relays)
    }

    #[test]
    fn three_hops_forward() {
        let (mut client, mut relays) = mirrored_boxes(3);

        let mut cell = cell_with_text(b"not for your eyes");
        let orig = cell.clone();
        // Originate at the last hop, then wrap every layer outward.
        client[2].client_originate(&mut cell);
        for hop in client.iter_mut().rev() {
            hop.client_encrypt(&mut cell);
        }

        // The first two relays peel their layer and do not recognize
        // the cell; the last one does.
        for (i, relay) in relays.iter_mut().enumerate() {
            relay.relay_decrypt(&mut cell);
            let mine = relay.relay_recognized(&mut cell);
            assert_eq!(mine, i == 2);
        }
        assert_eq!(&cell.0[11..30], &orig.0[11..30]);
    }

    #[test]
    fn three_hops_backward() {
        let (mut client, mut relays) = mirrored_boxes(3);

        let mut cell = cell_with_text(b"your eyes only");
        let orig = cell.clone();
        // The exit originates and every relay on the way back adds
        // its layer.
        relays[2].relay_originate(&mut cell);
        relays[2].relay_encrypt(&mut cell);
        relays[1].relay_encrypt(&mut cell);
        relays[0].relay_encrypt(&mut cell);

        // The client peels layer by layer until a hop recognizes it.
        let mut source = None;
        for (i, hop) in client.iter_mut().enumerate() {
            hop.client_decrypt(&mut cell);
            if hop.client_recognized(&mut cell) {
                source = Some(i);
                break;
            }
        }
        assert_eq!(source, Some(2));
        assert_eq!(&cell.0[11..30], &orig.0[11..30]);
        assert_ne!(client[2].last_backward_digest(), [0_u8; 20]);
    }

    #[test]
    fn tampering_is_not_recognized() {
        let (mut client, mut relays) = mirrored_boxes(1);

        let mut cell = cell_with_text(b"once");
        relays[0].relay_originate(&mut cell);
        relays[0].relay_encrypt(&mut cell);
        let mut tampered = cell.clone();
        tampered.0[200] ^= 1;

        // The tampered copy fails the digest check and must not
        // advance the rolling digest.
        client[0].client_decrypt(&mut tampered);
        assert!(!client[0].client_recognized(&mut tampered));

        // Digest state is unchanged, but the cipher has consumed a
        // cell's worth of keystream; a fresh mirror shows the intact
        // copy still verifies against the same digest state.
        let (mut client2, _) = mirrored_boxes(1);
        client2[0].client_decrypt(&mut cell);
        assert!(client2[0].client_recognized(&mut cell));
    }

    #[test]
    fn digest_chaining() {
        let (mut client, mut relays) = mirrored_boxes(1);

        // Two cells in a row only verify in order.
        let mut c1 = cell_with_text(b"first");
        let mut c2 = cell_with_text(b"second");
        relays[0].relay_originate(&mut c1);
        relays[0].relay_originate(&mut c2);

        assert!(client[0].client_recognized(&mut c1));
        assert!(client[0].client_recognized(&mut c2));

        let (mut client2, _) = mirrored_boxes(1);
        // Out of order: the second cell's digest depends on the
        // first having been absorbed.
        assert!(!client2[0].client_recognized(&mut c2.clone()));
        assert!(client2[0].client_recognized(&mut c1));
        assert!(client2[0].client_recognized(&mut c2));
    }
}
