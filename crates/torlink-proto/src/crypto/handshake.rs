//! Circuit-extension handshakes.
//!
//! Only the ntor handshake is implemented; it is the handshake every
//! CREATE2 and EXTEND2 in this crate carries.

pub(crate) mod ntor;

use crate::{Result, SecretBytes};

/// An object that can expand a handshake's shared secret into the key
/// material a circuit hop needs.
pub(crate) trait KeyGenerator {
    /// Consume the key generator and expand to `keylen` bytes.
    fn expand(self, keylen: usize) -> Result<SecretBytes>;
}
