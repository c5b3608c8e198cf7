use futures_util::{SinkExt, StreamExt};
use seqnet_common::{
    send_handshake, send_message_to_peer, Crypto, LedgerTrait, Packet, Peer, Transaction,
};
use seqnet_node::config::{AccountEntry, NodeConfig, SequencerConfig};
use seqnet_node::{launch, Launched, NodeEvent};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{client_async, tungstenite::Message};

async fn start(config: NodeConfig) -> Launched {
    launch(&config).await.unwrap()
}

fn funded(account: &str, balance: f64) -> NodeConfig {
    NodeConfig {
        accounts: vec![AccountEntry {
            account: account.to_string(),
            balance,
        }],
        ..NodeConfig::default()
    }
}

async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn announcements_spread_the_directory() {
    let a = start(NodeConfig::default()).await;
    let b = start(NodeConfig::default()).await;

    b.node.connect(a.node.own().addr).await.unwrap();
    wait_for("a and b to know each other", || async {
        a.node.peers().await.len() == 2 && b.node.peers().await.len() == 2
    })
    .await;

    let c = start(NodeConfig::default()).await;
    c.node.connect(a.node.own().addr).await.unwrap();
    wait_for("b to learn about c", || async { b.node.peers().await.len() == 3 }).await;

    assert!(b.node.peers().await.contains(&c.node.own()));
    wait_for("c to merge a's reply", || async { c.node.peers().await.len() == 3 }).await;

    for launched in [a, b, c] {
        launched.node.close().await;
    }
}

#[tokio::test]
async fn a_transfer_is_sequenced_and_applied_everywhere() {
    let sender = Crypto::generate();
    let sequencer = Crypto::generate();

    let mut config = funded(&sender.account(), 100.0);
    config.sequencer = Some(SequencerConfig {
        secret_key: sequencer.secret_hex(),
        block_size: 1,
    });
    let a = start(config).await;
    let mut a_events = a.node.subscribe();

    let mut config = funded(&sender.account(), 100.0);
    config.bootstrap = vec![a.node.own().addr.to_string()];
    let b = start(config).await;
    wait_for("b to adopt the sequencer key", || async {
        b.node.sequencer_key().await == Some(sequencer.public_key())
    })
    .await;

    let tx = Transaction::new("t1", sender.account(), "recipient", 10.0)
        .sign(&sender)
        .unwrap();
    b.node.submit_transaction(tx).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(10), a_events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        NodeEvent::BlockApplied {
            sequence_number: 1,
            transaction_ids: vec!["t1".to_string()],
        }
    );
    wait_for("b to apply the block", || async { b.node.latest_block().await == 1 }).await;

    for launched in [&a, &b] {
        assert_eq!(launched.ledger.balance(&sender.account()).await, 90.0);
        assert_eq!(launched.ledger.balance("recipient").await, 10.0);
    }
    assert_eq!(a.node.sequencer_counter().await, Some(0));

    a.node.close().await;
    b.node.close().await;
}

#[tokio::test]
async fn garbage_frames_are_dropped_and_the_link_keeps_working() {
    let a = start(NodeConfig::default()).await;
    let target = a.node.own().addr;
    let stream = TcpStream::connect(target).await.unwrap();
    let (ws, _) = client_async(format!("ws://{target}/"), stream).await.unwrap();
    let (mut sink, _read) = ws.split();

    let fake: SocketAddr = "127.0.0.1:1".parse().unwrap();
    send_handshake(&mut sink, fake).await.unwrap();

    let mut huge = vec![1u8, 0xFD];
    huge.extend_from_slice(&(1u64 << 40).to_le_bytes());
    let mut wrong_shape = Packet::PeerRequest(Peer::new(fake)).encode().unwrap();
    wrong_shape[0] = 4;
    for frame in [vec![0xFF, 0x00, 0x13], huge, wrong_shape, Vec::new()] {
        sink.send(Message::Binary(frame.into())).await.unwrap();
    }
    sink.send(Message::Text("hello".into())).await.unwrap();

    send_message_to_peer(&mut sink, &Packet::ConnectionAnnouncement(Peer::new(fake)))
        .await
        .unwrap();
    wait_for("the valid announcement after the garbage", || async {
        a.node.peers().await.contains(&Peer::new(fake))
    })
    .await;
    assert!(!a.handle.is_finished());

    a.node.close().await;
}
