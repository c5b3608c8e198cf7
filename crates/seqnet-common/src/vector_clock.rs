use crate::types::Peer;
use std::collections::HashMap;

/// Per-peer logical counters. Packets do not carry a clock yet; delivery is
/// in arrival order and ordering across nodes comes from the block chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorClock {
    vector: HashMap<Peer, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for `peer`, zero if never incremented.
    pub fn get(&self, peer: &Peer) -> u64 {
        self.vector.get(peer).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, peer: Peer) {
        *self.vector.entry(peer).or_insert(0) += 1;
    }

    /// Pointwise maximum of both clocks.
    pub fn merge(&mut self, other: &VectorClock) {
        for (peer, &time) in &other.vector {
            let entry = self.vector.entry(*peer).or_insert(0);
            *entry = (*entry).max(time);
        }
    }

    /// True when every counter in `self` is at most the matching counter in
    /// `other`.
    pub fn happened_before_or_equal(&self, other: &VectorClock) -> bool {
        self.vector
            .iter()
            .all(|(peer, &time)| time <= other.get(peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(i: u8) -> Peer {
        Peer::new(format!("192.168.0.{i}:7000").parse().unwrap())
    }

    #[test]
    fn unknown_peers_read_zero() {
        assert_eq!(VectorClock::new().get(&peer(1)), 0);
    }

    #[test]
    fn increment_touches_only_its_target() {
        let mut clock = VectorClock::new();
        clock.increment(peer(1));
        assert_eq!(clock.get(&peer(1)), 1);
        assert_eq!(clock.get(&peer(2)), 0);
    }

    #[test]
    fn merge_takes_the_pointwise_maximum() {
        let mut left = VectorClock::new();
        let mut right = VectorClock::new();
        for i in 1..10 {
            if i % 2 == 0 {
                left.increment(peer(i));
                left.increment(peer(i));
            } else {
                right.increment(peer(i));
            }
        }
        right.increment(peer(2));
        left.merge(&right);
        for i in 1..10 {
            let expected = if i % 2 == 0 { 2 } else { 1 };
            assert_eq!(left.get(&peer(i)), expected, "peer {i}");
        }
    }

    #[test]
    fn ordering_follows_the_counters() {
        let mut earlier = VectorClock::new();
        earlier.increment(peer(1));
        let mut later = earlier.clone();
        later.increment(peer(2));
        assert!(earlier.happened_before_or_equal(&later));
        assert!(!later.happened_before_or_equal(&earlier));
    }
}
