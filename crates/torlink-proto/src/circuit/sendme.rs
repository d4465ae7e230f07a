//! Sliding-window flow control for circuits and streams.
//!
//! Each endpoint keeps a package window counting the DATA cells it
//! may still send and a deliver window counting those it may still
//! receive.  A SENDME from the peer refills the package window; after
//! receiving an increment's worth of cells we owe the peer a SENDME
//! of our own.

use crate::{Error, Result};

/// Initial circuit-level window, in relay DATA cells.
pub(crate) const CIRC_WINDOW_INIT: u16 = 1000;
/// Cells acknowledged by one circuit-level SENDME.
pub(crate) const CIRC_WINDOW_INC: u16 = 100;
/// Initial stream-level window.
pub(crate) const STREAM_WINDOW_INIT: u16 = 500;
/// Cells acknowledged by one stream-level SENDME.
pub(crate) const STREAM_WINDOW_INC: u16 = 50;

/// A pair of sliding windows, one per direction.
#[derive(Debug, Clone)]
pub(crate) struct FlowWindow {
    /// Window capacity and refill ceiling.
    capacity: u16,
    /// Cells covered by a single SENDME.
    increment: u16,
    /// DATA cells we may still send.
    package: u16,
    /// DATA cells we may still receive.
    deliver: u16,
}

impl FlowWindow {
    /// A circuit-level window: 1000 cells, refilled 100 at a time.
    pub(crate) fn new_circ() -> Self {
        FlowWindow::new(CIRC_WINDOW_INIT, CIRC_WINDOW_INC)
    }

    /// A stream-level window: 500 cells, refilled 50 at a time.
    pub(crate) fn new_stream() -> Self {
        FlowWindow::new(STREAM_WINDOW_INIT, STREAM_WINDOW_INC)
    }

    fn new(capacity: u16, increment: u16) -> Self {
        FlowWindow {
            capacity,
            increment,
            package: capacity,
            deliver: capacity,
        }
    }

    /// True if `authorize_send` would succeed right now.
    ///
    /// Used when a send must take a slot from two windows at once:
    /// both get checked before either is decremented, so a refusal
    /// never leaves the windows half-spent.
    pub(crate) fn can_authorize(&self) -> bool {
        self.package > 0
    }

    /// Try to take one slot from the package window before sending a
    /// DATA cell.  Returns false when the window is empty; the caller
    /// must then hold the cell until a SENDME arrives.
    ///
    /// A refusal leaves the counter at zero.  Some implementations
    /// count below zero instead; the false return is the only signal
    /// callers here act on, so the counter never needs to.
    pub(crate) fn authorize_send(&mut self) -> bool {
        match self.package.checked_sub(1) {
            Some(p) => {
                self.package = p;
                true
            }
            None => false,
        }
    }

    /// Record a SENDME from the peer, refilling the package window.
    ///
    /// Errors if the refill would lift the window past its initial
    /// capacity, which means the peer sent a SENDME we never earned.
    pub(crate) fn received_sendme(&mut self) -> Result<()> {
        let p = self.package + self.increment;
        if p > self.capacity {
            return Err(Error::CircProto("Unexpected SENDME received".into()));
        }
        self.package = p;
        Ok(())
    }

    /// Record one inbound DATA cell against the deliver window.
    ///
    /// Returns true when enough cells have accumulated that we owe
    /// the peer a SENDME.  Errors if the peer overran our window.
    pub(crate) fn received_data(&mut self) -> Result<bool> {
        match self.deliver.checked_sub(1) {
            Some(d) => {
                self.deliver = d;
                Ok(d <= self.capacity - self.increment)
            }
            None => Err(Error::CircProto("Received a cell while window was empty".into())),
        }
    }

    /// Record that we sent the peer a SENDME, reopening the deliver
    /// window.
    pub(crate) fn delivered_sendme(&mut self) {
        self.deliver += self.increment;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn package_runs_dry() {
        let mut w = FlowWindow::new(10, 2);
        for _ in 0..10 {
            assert!(w.authorize_send());
        }
        assert!(!w.authorize_send());
        w.received_sendme().unwrap();
        assert!(w.authorize_send());
        assert!(w.authorize_send());
        assert!(!w.authorize_send());
    }

    #[test]
    fn spurious_sendme() {
        let mut w = FlowWindow::new(10, 2);
        assert!(w.authorize_send());
        // One cell out, a two cell refill would overflow.
        assert!(w.received_sendme().is_err());
    }

    #[test]
    fn deliver_owes_sendme() {
        let mut w = FlowWindow::new(10, 3);
        // The first two arrivals leave the window above the
        // threshold; the third crosses it.
        assert!(!w.received_data().unwrap());
        assert!(!w.received_data().unwrap());
        assert!(w.received_data().unwrap());
        w.delivered_sendme();
        assert!(!w.received_data().unwrap());
    }

    #[test]
    fn deliver_overrun() {
        let mut w = FlowWindow::new(2, 1);
        w.received_data().unwrap();
        w.received_data().unwrap();
        assert!(w.received_data().is_err());
    }

    #[test]
    fn real_circuit_numbers() {
        let mut w = FlowWindow::new_circ();
        for i in 0..900 {
            let owed = w.received_data().unwrap();
            // A SENDME is owed every hundredth cell.
            assert_eq!(owed, (i + 1) % 100 == 0);
            if owed {
                w.delivered_sendme();
            }
        }
    }
}
