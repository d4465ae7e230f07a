//! Coding and decoding for the cell types that make up Tor's link
//! and relay protocols.
//!
//! # Overview
//!
//! Tor's link protocol frames everything into "cells": mostly
//! fixed-length, occasionally variable-length, always big-endian.
//! Inside RELAY cells there is a second framing layer of "relay
//! messages", addressed to a stream within a circuit and protected
//! end-to-end by a rolling digest.
//!
//! This crate knows how to get both layers on and off the wire.  It
//! does no cryptography and no networking: encryption of relay cell
//! bodies and the digest bookkeeping belong to the circuit layer in
//! `torlink-proto`.

#![deny(missing_docs)]

pub mod cell;
mod err;
pub mod relaycell;
pub mod wire;

pub use err::Error;

/// An error-handling type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
