//! The ordered collection of peers participating in one protlet.
//!
//! Every entry pairs an identity with the peer's own id for the protlet
//! (learned from its announce) and a completion flag. Identities are kept
//! sorted and unique so that all peers derive the same ordering. Copying a
//! peer set keeps the identities only: id slots and completion flags reset
//! to their defaults, which is exactly what a child invocation needs.

use crate::protlet::{ProtletId, ID_INVALID};
use keel::Identity;

#[derive(Debug)]
struct Entry<I> {
    identity: I,
    id: ProtletId,
    completed: bool,
}

impl<I: Identity> Entry<I> {
    fn new(identity: I) -> Entry<I> {
        Entry {
            identity,
            id: ID_INVALID,
            completed: false,
        }
    }
}

#[derive(Debug)]
pub struct VectorPeerSet<I: Identity> {
    entries: Vec<Entry<I>>,
}

impl<I: Identity> VectorPeerSet<I> {
    pub fn new() -> VectorPeerSet<I> {
        VectorPeerSet {
            entries: Vec::new(),
        }
    }

    /// Insert a peer, keeping the set sorted. Re-adding an existing peer is
    /// a no-op.
    pub fn add(&mut self, identity: I) {
        match self.position(&identity) {
            Ok(_) => (),
            Err(at) => self.entries.insert(at, Entry::new(identity)),
        }
    }

    pub fn remove(&mut self, identity: &I) {
        if let Ok(at) = self.position(identity) {
            self.entries.remove(at);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_peer(&self, identity: &I) -> bool {
        self.position(identity).is_ok()
    }

    /// Assign the peer's id if it is still unassigned. Returns true when the
    /// assignment happened.
    pub fn check_and_set_id(&mut self, identity: &I, id: ProtletId) -> bool {
        match self.entry_mut(identity) {
            Some(entry) if entry.id == ID_INVALID => {
                entry.id = id;
                true
            }
            _ => false,
        }
    }

    /// Assign the peer's id unconditionally.
    pub fn set_id(&mut self, identity: &I, id: ProtletId) {
        if let Some(entry) = self.entry_mut(identity) {
            entry.id = id;
        }
    }

    /// True once every entry has a valid id.
    pub fn has_all_peer_ids(&self) -> bool {
        self.entries.iter().all(|e| e.id != ID_INVALID)
    }

    pub fn set_completed(&mut self, identity: &I) {
        if let Some(entry) = self.entry_mut(identity) {
            entry.completed = true;
        }
    }

    /// True once every entry has reported completion.
    pub fn check_all_complete(&self) -> bool {
        self.entries.iter().all(|e| e.completed)
    }

    pub fn find_peer_id(&self, identity: &I) -> ProtletId {
        match self.position(identity) {
            Ok(at) => self.entries[at].id,
            Err(_) => ID_INVALID,
        }
    }

    pub fn find_completion_status(&self, identity: &I) -> bool {
        match self.position(identity) {
            Ok(at) => self.entries[at].completed,
            Err(_) => false,
        }
    }

    pub fn for_each<F: FnMut(&I)>(&self, mut f: F) {
        for entry in &self.entries {
            f(&entry.identity);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &I> + '_ {
        self.entries.iter().map(|e| &e.identity)
    }

    /// True when every peer of `self` also appears in `other`.
    pub fn is_subset_of(&self, other: &VectorPeerSet<I>) -> bool {
        self.entries.iter().all(|e| other.has_peer(&e.identity))
    }

    fn position(&self, identity: &I) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.identity.cmp(identity))
    }

    fn entry_mut(&mut self, identity: &I) -> Option<&mut Entry<I>> {
        match self.position(identity) {
            Ok(at) => Some(&mut self.entries[at]),
            Err(_) => None,
        }
    }
}

/// Copies carry identities only; ids and completion flags reset.
impl<I: Identity> Clone for VectorPeerSet<I> {
    fn clone(&self) -> VectorPeerSet<I> {
        VectorPeerSet {
            entries: self
                .entries
                .iter()
                .map(|e| Entry::new(e.identity.clone()))
                .collect(),
        }
    }
}

/// Equality looks at identities only, never at ids or flags.
impl<I: Identity> PartialEq for VectorPeerSet<I> {
    fn eq(&self, other: &VectorPeerSet<I>) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|(a, b)| a.identity == b.identity)
    }
}

impl<I: Identity> Eq for VectorPeerSet<I> {}

impl<I: Identity> std::iter::FromIterator<I> for VectorPeerSet<I> {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> VectorPeerSet<I> {
        let mut set = VectorPeerSet::new();
        for identity in iter {
            set.add(identity);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_and_completion_lifecycle() {
        let mut ps: VectorPeerSet<u64> = [0u64, 1, 2].iter().copied().collect();

        assert!(!ps.has_all_peer_ids());

        assert!(ps.check_and_set_id(&0, 123));
        assert!(!ps.check_and_set_id(&0, 456));
        assert_eq!(ps.find_peer_id(&0), 123);
        assert!(!ps.has_all_peer_ids());

        ps.set_id(&1, 7);
        ps.set_id(&2, 8);
        assert!(ps.has_all_peer_ids());

        assert!(!ps.check_all_complete());
        ps.set_completed(&0);
        ps.set_completed(&1);
        assert!(!ps.check_all_complete());
        ps.set_completed(&2);
        assert!(ps.check_all_complete());
    }

    #[test]
    fn copies_reset_state_and_compare_equal() {
        let mut ps: VectorPeerSet<String> =
            ["bob".to_owned(), "alice".to_owned()].iter().cloned().collect();
        ps.set_id(&"alice".to_owned(), 99);
        ps.set_completed(&"bob".to_owned());

        let copy = ps.clone();
        assert_eq!(copy, ps);
        assert_eq!(copy.find_peer_id(&"alice".to_owned()), ID_INVALID);
        assert!(!copy.find_completion_status(&"bob".to_owned()));
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let a: VectorPeerSet<u64> = [3u64, 1, 2].iter().copied().collect();
        let b: VectorPeerSet<u64> = [2u64, 3, 1].iter().copied().collect();
        assert_eq!(a, b);
        assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn duplicates_collapse() {
        let mut ps: VectorPeerSet<u64> = VectorPeerSet::new();
        ps.add(5);
        ps.add(5);
        assert_eq!(ps.len(), 1);
    }

    #[test]
    fn remove_and_membership() {
        let mut ps: VectorPeerSet<u64> = [1u64, 2].iter().copied().collect();
        assert!(ps.has_peer(&1));
        ps.remove(&1);
        assert!(!ps.has_peer(&1));
        assert_eq!(ps.find_peer_id(&1), ID_INVALID);
    }

    #[test]
    fn subset_check() {
        let big: VectorPeerSet<u64> = [1u64, 2, 3].iter().copied().collect();
        let small: VectorPeerSet<u64> = [1u64, 3].iter().copied().collect();
        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
    }
}
