//! Small utilities with no protocol knowledge.

pub(crate) mod ct;
#[cfg(test)]
pub(crate) mod testing;
