use tracing::debug;

use crate::core::{Error, EvictionPolicy, Eui, Result};
use super::PeerPayload;

/// Outcome of a successful [`PeerTable::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// Peer was already known, payload replaced in place
    Updated,
    /// Peer was appended to the table
    Inserted,
    /// Peer was appended after evicting the given peer
    Evicted(Eui),
}

/// Capacity-bounded, identity-keyed peer store.
///
/// Entries keep their insertion order. Entries are never removed except to
/// make room under an evicting policy, so the size never shrinks.
#[derive(Debug, Clone)]
pub struct PeerTable<T> {
    entries: Vec<(Eui, T)>,
    capacity: usize,
    eviction: EvictionPolicy,
}

impl<T: PeerPayload> PeerTable<T> {
    /// Creates an empty table
    pub fn new(capacity: usize, eviction: EvictionPolicy) -> Self {
        PeerTable {
            entries: Vec::with_capacity(capacity),
            capacity,
            eviction,
        }
    }

    /// Inserts or replaces the payload for `eui`
    pub fn upsert(&mut self, eui: Eui, payload: T) -> Result<Upsert> {
        if let Some(existing) = self.get_mut(&eui) {
            *existing = payload;
            return Ok(Upsert::Updated);
        }

        if self.entries.len() < self.capacity {
            self.entries.push((eui, payload));
            return Ok(Upsert::Inserted);
        }

        let victim = match self.eviction {
            EvictionPolicy::Reject => None,
            EvictionPolicy::Oldest => (!self.entries.is_empty()).then_some(0),
            EvictionPolicy::Weakest => self.weakest(),
        };

        match victim {
            Some(index) => {
                let (evicted, _) = self.entries.remove(index);
                debug!(evicted = %evicted, inserted = %eui, "Evicted peer to make room");
                self.entries.push((eui, payload));
                Ok(Upsert::Evicted(evicted))
            }
            None => Err(Error::CapacityExceeded),
        }
    }

    fn weakest(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .min_by_key(|(index, (_, payload))| (payload.confidence(), *index))
            .map(|(index, _)| index)
    }
}

impl<T> PeerTable<T> {
    /// Payload for `eui`, if known
    pub fn get(&self, eui: &Eui) -> Option<&T> {
        self.entries
            .iter()
            .find(|(id, _)| id == eui)
            .map(|(_, payload)| payload)
    }

    /// Mutable payload for `eui`, if known
    pub fn get_mut(&mut self, eui: &Eui) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|(id, _)| id == eui)
            .map(|(_, payload)| payload)
    }

    pub fn contains(&self, eui: &Eui) -> bool {
        self.get(eui).is_some()
    }

    /// Entry at `index` in insertion order
    pub fn entry(&self, index: usize) -> Option<(&Eui, &T)> {
        self.entries.get(index).map(|(eui, payload)| (eui, payload))
    }

    /// Iterates entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&Eui, &T)> + '_ {
        self.entries.iter().map(|(eui, payload)| (eui, payload))
    }

    /// Identities in insertion order
    pub fn identities(&self) -> Vec<Eui> {
        self.entries.iter().map(|(eui, _)| *eui).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> PeerTable<T> {
    /// Owned copy of every entry, for read-only consumers
    pub fn snapshot(&self) -> Vec<(Eui, T)> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::{AnchorLink, Reliability, TagDistance};
    use std::collections::HashSet;

    fn eui(n: u8) -> Eui {
        Eui::new([n, 0, 0, 0, 0, 0, 0xEF, 0xBE])
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut table = PeerTable::new(8, EvictionPolicy::Reject);
        assert_eq!(table.upsert(eui(1), TagDistance::measured(1.0)).unwrap(), Upsert::Inserted);
        assert_eq!(table.upsert(eui(2), TagDistance::measured(2.0)).unwrap(), Upsert::Inserted);
        assert_eq!(table.upsert(eui(1), TagDistance::measured(3.0)).unwrap(), Upsert::Updated);

        assert_eq!(table.len(), 2);
        assert_eq!(table.identities(), vec![eui(1), eui(2)]);
        assert_eq!(table.get(&eui(1)).unwrap().distance, 3.0);
        assert!(table.get(&eui(9)).is_none());
    }

    #[test]
    fn test_reject_when_full() {
        let mut table = PeerTable::new(8, EvictionPolicy::Reject);
        for n in 0..8 {
            table.upsert(eui(n), AnchorLink::discovered()).unwrap();
        }

        let result = table.upsert(eui(8), AnchorLink::discovered());
        assert!(matches!(result, Err(Error::CapacityExceeded)));
        assert_eq!(table.len(), 8);
        assert!(!table.contains(&eui(8)));

        // Known peers can still be updated at capacity
        let link = AnchorLink {
            reliability: Reliability::new(10),
            reported_distance: None,
        };
        assert_eq!(table.upsert(eui(3), link).unwrap(), Upsert::Updated);
        assert_eq!(table.get(&eui(3)).unwrap().reliability.value(), 10);
    }

    #[test]
    fn test_capacity_and_uniqueness_hold() {
        for policy in [EvictionPolicy::Reject, EvictionPolicy::Oldest, EvictionPolicy::Weakest] {
            let mut table = PeerTable::new(8, policy);
            for round in 0..40u32 {
                let n = ((round * 7) % 13) as u8;
                let _ = table.upsert(eui(n), TagDistance::measured(f64::from(round)));
                assert!(table.len() <= 8);

                let unique: HashSet<_> = table.identities().into_iter().collect();
                assert_eq!(unique.len(), table.len());
            }
            assert_eq!(table.len(), 8);
        }
    }

    #[test]
    fn test_evict_oldest() {
        let mut table = PeerTable::new(2, EvictionPolicy::Oldest);
        table.upsert(eui(1), TagDistance::measured(1.0)).unwrap();
        table.upsert(eui(2), TagDistance::measured(2.0)).unwrap();

        assert_eq!(table.upsert(eui(3), TagDistance::measured(3.0)).unwrap(), Upsert::Evicted(eui(1)));
        assert_eq!(table.identities(), vec![eui(2), eui(3)]);
    }

    #[test]
    fn test_evict_weakest() {
        let mut table = PeerTable::new(3, EvictionPolicy::Weakest);
        for (n, score) in [(1, 80), (2, 12), (3, 12)] {
            let link = AnchorLink {
                reliability: Reliability::new(score),
                reported_distance: None,
            };
            table.upsert(eui(n), link).unwrap();
        }

        // Ties go to the earliest entry
        assert_eq!(table.upsert(eui(4), AnchorLink::discovered()).unwrap(), Upsert::Evicted(eui(2)));
        assert_eq!(table.identities(), vec![eui(1), eui(3), eui(4)]);
    }

    #[test]
    fn test_iteration_is_restartable() {
        let mut table = PeerTable::new(8, EvictionPolicy::Reject);
        for n in 0..3 {
            table.upsert(eui(n), AnchorLink::discovered()).unwrap();
        }

        let first: Vec<_> = table.iter().map(|(id, _)| *id).collect();
        let second: Vec<_> = table.iter().map(|(id, _)| *id).collect();
        assert_eq!(first, second);
        assert_eq!(table.entry(1).map(|(id, _)| *id), Some(eui(1)));
        assert!(table.entry(3).is_none());
    }
}
