//! Key derivation for the ntor handshake.
//!
//! The ntor KDF is RFC5869 HKDF-SHA256 with fixed salt and info
//! strings drawn from the protocol id.

use crate::{Error, Result, SecretBytes};
use zeroize::Zeroizing;

/// HKDF salt for extracting key material from an ntor secret input.
const NTOR1_KEY: &[u8] = b"ntor-curve25519-sha256-1:key_extract";
/// HKDF info string for expanding the extracted key.
const NTOR1_EXPAND: &[u8] = b"ntor-curve25519-sha256-1:key_expand";

/// Expand `seed` into `n_bytes` bytes of key material.
pub(crate) fn ntor1_derive(seed: &[u8], n_bytes: usize) -> Result<SecretBytes> {
    let hkdf = hkdf::Hkdf::<sha2::Sha256>::new(Some(NTOR1_KEY), seed);
    let mut result: SecretBytes = Zeroizing::new(vec![0; n_bytes]);
    hkdf.expand(NTOR1_EXPAND, &mut result[..])
        .map_err(|_| Error::Internal("requested too much key data"))?;
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expand_is_deterministic_and_prefix_stable() {
        let a = ntor1_derive(b"in a hole in the ground", 100).unwrap();
        let b = ntor1_derive(b"in a hole in the ground", 72).unwrap();
        let c = ntor1_derive(b"there lived a hobbit", 72).unwrap();
        assert_eq!(&a[..72], &b[..]);
        assert_ne!(&b[..], &c[..]);
    }

    #[test]
    fn absurd_length_fails() {
        // SHA256 HKDF tops out at 255 blocks of output.
        assert!(ntor1_derive(b"x", 255 * 32 + 1).is_err());
    }
}
