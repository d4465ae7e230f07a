//! Cryptographic building blocks with no protocol state machine in
//! them: relay-cell layer encryption and the ntor key agreement.

pub(crate) mod cell;
pub(crate) mod handshake;
pub(crate) mod kdf;
