use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Once;
use tracing::warn;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
    pub static ref KNOWN_PEERS: IntGauge =
        IntGauge::new("seqnet_known_peers", "Peers in the directory").unwrap();
    pub static ref POOL_SIZE: IntGauge =
        IntGauge::new("seqnet_pool_size", "Transactions in the pool").unwrap();
    pub static ref LATEST_BLOCK: IntGauge =
        IntGauge::new("seqnet_latest_block", "Sequence number of the latest applied block")
            .unwrap();
    pub static ref PACKETS_DROPPED: IntCounter =
        IntCounter::new("seqnet_packets_dropped_total", "Packets dropped before handling")
            .unwrap();
    pub static ref BLOCKS_APPLIED: IntCounter =
        IntCounter::new("seqnet_blocks_applied_total", "Blocks applied to the ledger").unwrap();
}

static INIT: Once = Once::new();

/// Registers the collectors. Safe to call from every node in the process.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(KNOWN_PEERS.clone()),
            Box::new(POOL_SIZE.clone()),
            Box::new(LATEST_BLOCK.clone()),
            Box::new(PACKETS_DROPPED.clone()),
            Box::new(BLOCKS_APPLIED.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                warn!("Failed to register metric: {}", e);
            }
        }
    });
}

/// Adds a collector owned by another component to the same registry.
pub fn register(collector: Box<dyn prometheus::core::Collector>) {
    if let Err(e) = REGISTRY.register(collector) {
        warn!("Failed to register metric: {}", e);
    }
}

/// Text exposition of every registered metric.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
