use seqnet_common::{Packet, PacketDigest, SeqnetError};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    /// Identical packet already handled.
    Replay,
    /// Block at or below the latest applied sequence number.
    Stale,
}

/// Replay suppression. Non-block packets are remembered by content digest;
/// blocks carry their own ordering key and are judged by sequence number.
#[derive(Debug, Default)]
pub struct History {
    seen: HashSet<PacketDigest>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Decides whether `packet` gets handled, recording it when it does.
    pub fn admit(&mut self, packet: &Packet, latest_block: u64) -> Result<Admission, SeqnetError> {
        if let Packet::BlockAnnouncement(block) = packet {
            if block.sequence_number() <= latest_block {
                return Ok(Admission::Stale);
            }
            return Ok(Admission::Accept);
        }
        if self.seen.insert(packet.digest()?) {
            Ok(Admission::Accept)
        } else {
            Ok(Admission::Replay)
        }
    }

    /// Marks a packet this node is about to send so its echoes are dropped.
    pub fn record(&mut self, packet: &Packet) -> Result<(), SeqnetError> {
        self.seen.insert(packet.digest()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqnet_common::{Block, Crypto, Peer};

    fn announcement(port: u16) -> Packet {
        Packet::ConnectionAnnouncement(Peer::new(format!("127.0.0.1:{port}").parse().unwrap()))
    }

    fn block(sequence_number: u64) -> Packet {
        let keys = Crypto::generate();
        Packet::BlockAnnouncement(
            Block {
                sequence_number,
                transaction_ids: vec![],
            }
            .sign(&keys)
            .unwrap(),
        )
    }

    #[test]
    fn identical_packet_is_admitted_once() {
        let mut history = History::new();
        assert_eq!(history.admit(&announcement(1), 0).unwrap(), Admission::Accept);
        assert_eq!(history.admit(&announcement(1), 0).unwrap(), Admission::Replay);
        assert_eq!(history.admit(&announcement(2), 0).unwrap(), Admission::Accept);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn recorded_packets_count_as_seen() {
        let mut history = History::new();
        history.record(&announcement(7)).unwrap();
        assert_eq!(history.admit(&announcement(7), 0).unwrap(), Admission::Replay);
    }

    #[test]
    fn blocks_are_gated_by_sequence_number_only() {
        let mut history = History::new();
        assert_eq!(history.admit(&block(3), 3).unwrap(), Admission::Stale);
        assert_eq!(history.admit(&block(1), 3).unwrap(), Admission::Stale);
        assert_eq!(history.admit(&block(4), 3).unwrap(), Admission::Accept);
        // The same block stays deliverable until it is applied.
        assert_eq!(history.admit(&block(4), 3).unwrap(), Admission::Accept);
        assert!(history.is_empty());
    }
}
