//! Constant-time helpers.

use subtle::ConstantTimeEq;

/// Compare two byte slices in constant time.
///
/// Returns false if the lengths differ; the length comparison itself
/// is not hidden, but the lengths here are fixed by the protocol.
pub(crate) fn bytes_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).unwrap_u8() == 1
}
