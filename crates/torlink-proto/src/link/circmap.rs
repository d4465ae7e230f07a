//! The per-link table of live circuits.

use crate::{Error, Result};
use torlink_cell::cell::{msg::CellMsg, CircId};

use futures::channel::mpsc;
use rand::distributions::Distribution;
use rand::Rng;

use std::collections::HashMap;

/// How many inbound cells may queue for one circuit before the
/// reactor has to wait.
const CIRC_QUEUE_LEN: usize = 128;

/// The circuit id space a client may allocate from.
///
/// The side that initiated the link picks ids with the high bit set;
/// the responder owns the rest.  We only ever initiate.
pub(super) struct ClientIdRange;

impl Distribution<CircId> for ClientIdRange {
    /// Return a random nonzero circuit id with the high bit set.
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> CircId {
        let v = loop {
            match rng.gen::<u32>() {
                0 => (),
                x => break x,
            }
        };
        (v | 0x8000_0000).into()
    }
}

/// A map from circuit id to the sender that delivers cells to that
/// circuit.  Each link has one.
pub(super) struct CircMap {
    /// The live circuits.
    m: HashMap<CircId, mpsc::Sender<CellMsg>>,
}

impl CircMap {
    /// Make a new empty CircMap.
    pub(super) fn new() -> Self {
        CircMap { m: HashMap::new() }
    }

    /// Allocate an unused circuit id and register a queue for it.
    ///
    /// Returns the id and the receiving end of the circuit's queue.
    pub(super) fn add_ent<R: Rng>(
        &mut self,
        rng: &mut R,
    ) -> Result<(CircId, mpsc::Receiver<CellMsg>)> {
        // The id space is far larger than any link's circuit count,
        // so a handful of tries always suffices.
        for _ in 0..16 {
            let id = ClientIdRange.sample(rng);
            if !self.m.contains_key(&id) {
                let (sender, receiver) = mpsc::channel(CIRC_QUEUE_LEN);
                self.m.insert(id, sender);
                return Ok((id, receiver));
            }
        }
        Err(Error::Internal("couldn't allocate a circuit id"))
    }

    /// Return the sender for `id`, if that circuit is live.
    pub(super) fn get_mut(&mut self, id: CircId) -> Option<&mut mpsc::Sender<CellMsg>> {
        self.m.get_mut(&id)
    }

    /// Remove the entry for `id`, if any.
    pub(super) fn remove(&mut self, id: CircId) -> Option<mpsc::Sender<CellMsg>> {
        self.m.remove(&id)
    }

    /// Drop every entry, closing each circuit's queue.
    pub(super) fn clear(&mut self) {
        self.m.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ids_are_high_and_nonzero() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let id = ClientIdRange.sample(&mut rng);
            let v: u32 = id.into();
            assert!(v & 0x8000_0000 != 0);
            assert!(!id.is_zero());
        }
    }

    #[test]
    fn add_get_remove() {
        let mut rng = rand::thread_rng();
        let mut map = CircMap::new();
        let (id, _recv) = map.add_ent(&mut rng).unwrap();
        assert!(map.get_mut(id).is_some());
        assert!(map.remove(id).is_some());
        assert!(map.get_mut(id).is_none());
    }
}
