use seqnet_common::Peer;

/// How many of the most recently learned peers a node dials after a merge.
pub const STRENGTHEN_FANOUT: usize = 10;

/// The node's view of network membership. Grows only; stale peers are kept.
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    peers: Vec<Peer>,
}

impl PeerDirectory {
    /// A directory holding just the node itself.
    pub fn bootstrap(own: Peer) -> Self {
        PeerDirectory { peers: vec![own] }
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Appends every received peer not already known, in received order.
    /// Returns how many were added.
    pub fn merge(&mut self, received: &[Peer]) -> usize {
        let before = self.peers.len();
        for peer in received {
            if !self.peers.contains(peer) {
                self.peers.push(*peer);
            }
        }
        self.peers.len() - before
    }

    /// Unconditional append; announcements are deduplicated upstream by the
    /// replay history.
    pub fn append(&mut self, peer: Peer) {
        self.peers.push(peer);
    }

    /// Peers to dial after a merge: the last [`STRENGTHEN_FANOUT`] entries,
    /// minus the final one of that window.
    pub fn strengthen_candidates(&self) -> Vec<Peer> {
        let start = self.peers.len().saturating_sub(STRENGTHEN_FANOUT);
        let window = &self.peers[start..];
        match window.split_last() {
            Some((_, rest)) => rest.to_vec(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> Peer {
        Peer::new(format!("127.0.0.1:{port}").parse().unwrap())
    }

    #[test]
    fn bootstrap_holds_only_self() {
        let directory = PeerDirectory::bootstrap(peer(1));
        assert_eq!(directory.peers(), &[peer(1)]);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn merge_appends_unknown_peers_in_received_order() {
        let mut directory = PeerDirectory::bootstrap(peer(1));
        let added = directory.merge(&[peer(3), peer(1), peer(2)]);
        assert_eq!(added, 2);
        assert_eq!(directory.peers(), &[peer(1), peer(3), peer(2)]);
    }

    #[test]
    fn merge_is_idempotent() {
        let received = vec![peer(2), peer(3), peer(4)];
        let mut once = PeerDirectory::bootstrap(peer(1));
        once.merge(&received);
        let mut twice = once.clone();
        assert_eq!(twice.merge(&received), 0);
        assert_eq!(once.peers(), twice.peers());
    }

    #[test]
    fn append_does_not_deduplicate() {
        let mut directory = PeerDirectory::bootstrap(peer(1));
        directory.append(peer(2));
        directory.append(peer(2));
        assert_eq!(directory.len(), 3);
    }

    #[test]
    fn strengthen_skips_the_most_recent_peer() {
        let mut directory = PeerDirectory::bootstrap(peer(1));
        directory.merge(&[peer(2), peer(3)]);
        assert_eq!(directory.strengthen_candidates(), vec![peer(1), peer(2)]);
    }

    #[test]
    fn strengthen_never_exceeds_the_fanout() {
        let mut directory = PeerDirectory::bootstrap(peer(1));
        let many: Vec<Peer> = (2..40).map(peer).collect();
        directory.merge(&many);
        let candidates = directory.strengthen_candidates();
        assert!(candidates.len() <= STRENGTHEN_FANOUT);
        assert_eq!(candidates.len(), STRENGTHEN_FANOUT - 1);
        assert_eq!(candidates.first(), Some(&peer(30)));
        assert_eq!(candidates.last(), Some(&peer(38)));
    }

    #[test]
    fn strengthen_on_a_lone_directory_is_empty() {
        let directory = PeerDirectory::bootstrap(peer(1));
        assert!(directory.strengthen_candidates().is_empty());
    }
}
