//! End-to-end replication through the in-memory relay.

mod common;

use common::{settle, Network, Replica, SCOPE};
use listed_core::{LwwEngine, MergeEngine};
use listed_sync::{FlushPolicy, LocalStore, MessageKind, RemoteMessage, SyncState};

#[tokio::test]
async fn fresh_replica_starts_empty() {
    let network = Network::new();
    let mut a = Replica::new(1, 100.0, &network);

    a.provider.bootstrap().await.unwrap();

    assert_eq!(a.provider.state(), SyncState::Online);
    assert!(a.provider.document().entries().is_empty());
    assert!(!a.full().is_empty());
    assert!(a.provider.is_janitor());
    assert!(a.provider.pending_updates().is_empty());
}

#[tokio::test]
async fn live_edit_reaches_janitor() {
    let network = Network::new();
    let mut a = Replica::new(1, 200.0, &network);
    let mut b = Replica::new(2, 10.0, &network);
    a.provider.bootstrap().await.unwrap();
    b.provider.bootstrap().await.unwrap();
    settle(&mut [&mut a, &mut b]).await;
    assert!(a.provider.is_janitor());

    b.provider.edit(|doc| doc.set("text", "hello")).unwrap();
    settle(&mut [&mut a, &mut b]).await;

    assert_eq!(a.text("text").as_deref(), Some("hello"));
    assert_eq!(a.full(), b.full());
    assert_eq!(b.provider.stats().updates_sent, 1);
    assert_eq!(a.provider.stats().updates_applied, 1);
}

#[tokio::test]
async fn offline_edit_converges_after_reconnect() {
    let network = Network::new();
    let mut a = Replica::new(1, 200.0, &network);
    let mut b = Replica::new(2, 10.0, &network);
    a.provider.bootstrap().await.unwrap();
    b.provider.bootstrap().await.unwrap();
    settle(&mut [&mut a, &mut b]).await;

    b.go_offline();
    settle(&mut [&mut a, &mut b]).await;
    assert_eq!(b.provider.state(), SyncState::Offline);

    b.provider.edit(|doc| doc.set("text", "hello world")).unwrap();
    a.provider.edit(|doc| doc.set("title", "weekend")).unwrap();
    settle(&mut [&mut a, &mut b]).await;

    assert_eq!(b.provider.pending_updates().len(), 1);
    assert_eq!(a.text("text"), None);
    assert_eq!(b.text("title"), None);

    b.go_online();
    settle(&mut [&mut a, &mut b]).await;

    assert_eq!(b.provider.state(), SyncState::Online);
    assert!(b.provider.pending_updates().is_empty());
    assert_eq!(a.text("text").as_deref(), Some("hello world"));
    assert_eq!(b.text("title").as_deref(), Some("weekend"));
    assert_eq!(a.full(), b.full());
    assert_eq!(a.provider.stats().requests_answered, 2);
}

#[tokio::test]
async fn offline_updates_flush_in_generation_order() {
    let network = Network::new();
    let mut a = Replica::new(1, 200.0, &network);
    let mut b = Replica::new(2, 10.0, &network);
    a.provider.bootstrap().await.unwrap();
    b.provider.bootstrap().await.unwrap();
    settle(&mut [&mut a, &mut b]).await;

    b.go_offline();
    let produced: Vec<_> = ["milk", "eggs", "bread"]
        .iter()
        .map(|item| b.provider.edit(|doc| doc.set("item", *item)).unwrap())
        .collect();
    settle(&mut [&mut a, &mut b]).await;
    assert_eq!(b.provider.pending_updates(), produced);

    let sent_before = b.endpoint.sent().len();
    b.go_online();
    settle(&mut [&mut a, &mut b]).await;

    let sent: Vec<_> = b.endpoint.sent().into_iter().skip(sent_before).collect();
    assert_eq!(sent[0].kind, MessageKind::StateVectorRequest);
    let flushed: Vec<_> = sent[1..].iter().map(|m| m.payload.clone()).collect();
    assert_eq!(flushed, produced);
    assert_eq!(b.provider.stats().updates_flushed, 3);
    assert_eq!(a.text("item").as_deref(), Some("bread"));
}

#[tokio::test]
async fn edit_queued_behind_offline_event_is_buffered() {
    let network = Network::new();
    let mut a = Replica::new(1, 200.0, &network);
    let mut b = Replica::new(2, 10.0, &network);
    a.provider.bootstrap().await.unwrap();
    b.provider.bootstrap().await.unwrap();
    settle(&mut [&mut a, &mut b]).await;

    // The link is back before any of these events are handled.
    let sent_before = b.endpoint.sent().len();
    b.go_offline();
    let update = b.provider.edit(|doc| doc.set("text", "offline edit")).unwrap();
    b.go_online();
    settle(&mut [&mut a, &mut b]).await;

    let stats = b.provider.stats();
    assert_eq!(stats.updates_sent, 0);
    assert_eq!(stats.updates_buffered, 1);
    assert_eq!(stats.updates_flushed, 1);

    let sent: Vec<_> = b.endpoint.sent().into_iter().skip(sent_before).collect();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].kind, MessageKind::StateVectorRequest);
    assert_eq!(sent[1].payload, update);
    assert_eq!(a.text("text").as_deref(), Some("offline edit"));
    assert_eq!(a.full(), b.full());
}

#[tokio::test]
async fn manual_policy_keeps_buffer_until_flushed() {
    let network = Network::new();
    let mut a = Replica::new(1, 200.0, &network);
    let mut b = Replica::with_policy(2, 10.0, &network, FlushPolicy::Manual);
    a.provider.bootstrap().await.unwrap();
    b.provider.bootstrap().await.unwrap();

    b.go_offline();
    settle(&mut [&mut a, &mut b]).await;
    b.provider.edit(|doc| doc.set("text", "draft")).unwrap();
    settle(&mut [&mut a, &mut b]).await;
    b.go_online();
    settle(&mut [&mut a, &mut b]).await;

    assert_eq!(b.provider.pending_updates().len(), 1);
    assert_eq!(a.text("text"), None);

    assert_eq!(b.provider.flush_pending().await.unwrap(), 1);
    settle(&mut [&mut a, &mut b]).await;
    assert_eq!(a.text("text").as_deref(), Some("draft"));
    assert_eq!(a.full(), b.full());
}

#[tokio::test]
async fn failed_flush_keeps_remaining_updates_in_order() {
    let network = Network::new();
    let mut a = Replica::new(1, 200.0, &network);
    let mut b = Replica::with_policy(2, 10.0, &network, FlushPolicy::Manual);
    a.provider.bootstrap().await.unwrap();
    b.provider.bootstrap().await.unwrap();

    b.go_offline();
    let first = b.provider.edit(|doc| doc.set("a", "1")).unwrap();
    let second = b.provider.edit(|doc| doc.set("b", "2")).unwrap();
    settle(&mut [&mut a, &mut b]).await;
    b.go_online();
    settle(&mut [&mut a, &mut b]).await;

    b.endpoint.set_rejecting(true);
    let err = b.provider.flush_pending().await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(b.provider.pending_updates(), vec![first, second]);

    b.endpoint.set_rejecting(false);
    assert_eq!(b.provider.flush_pending().await.unwrap(), 2);
    assert!(b.provider.pending_updates().is_empty());
}

#[tokio::test]
async fn duplicate_and_reordered_delivery_is_harmless() {
    let network = Network::new();
    let mut a = Replica::new(1, 200.0, &network);
    a.provider.bootstrap().await.unwrap();

    let mut source = LwwEngine::new(9).create();
    let first = source.set("text", "one").unwrap();
    let second = source.set("text", "two").unwrap();

    for update in [&second, &first, &second, &first] {
        a.provider
            .handle_remote_message(RemoteMessage::doc(update.clone()))
            .await
            .unwrap();
    }
    settle(&mut [&mut a]).await;

    assert_eq!(a.text("text").as_deref(), Some("two"));
    assert_eq!(a.full(), source.encode_full().unwrap());
}

#[tokio::test]
async fn baseline_is_full_document_and_survives_restart() {
    let network = Network::new();
    let mut a = Replica::new(1, 200.0, &network);
    a.provider.bootstrap().await.unwrap();

    a.provider.edit(|doc| doc.set("a", "1")).unwrap();
    a.provider.edit(|doc| doc.set("b", "2")).unwrap();
    settle(&mut [&mut a]).await;

    let stored = a.store.get(SCOPE, "doc").await.unwrap().unwrap();
    assert_eq!(stored, a.full());

    let store = a.store.clone();
    a.provider.shutdown();
    drop(a);

    let offline = Network::new();
    let mut restarted =
        Replica::with_store(1, 200.0, &offline, FlushPolicy::OnReconnect, store);
    restarted.go_offline();
    restarted.provider.bootstrap().await.unwrap();

    assert_eq!(restarted.provider.state(), SyncState::Offline);
    assert_eq!(restarted.text("a").as_deref(), Some("1"));
    assert_eq!(restarted.text("b").as_deref(), Some("2"));
}

#[tokio::test]
async fn bootstrap_applies_relay_snapshot() {
    let network = Network::new();
    let mut source = LwwEngine::new(7).create();
    source.set("text", "from relay").unwrap();
    network
        .relay
        .retain(SCOPE, "doc", source.encode_full().unwrap());

    let mut a = Replica::new(1, 100.0, &network);
    a.provider.bootstrap().await.unwrap();

    assert_eq!(a.text("text").as_deref(), Some("from relay"));
    assert_eq!(a.store.peek(SCOPE, "doc"), Some(a.full()));
}

#[tokio::test]
async fn remote_updates_are_not_echoed() {
    let network = Network::new();
    let mut a = Replica::new(1, 200.0, &network);
    let mut b = Replica::new(2, 10.0, &network);
    a.provider.bootstrap().await.unwrap();
    b.provider.bootstrap().await.unwrap();
    settle(&mut [&mut a, &mut b]).await;

    let sent_before = a.endpoint.sent().len();
    b.provider.edit(|doc| doc.set("text", "hello")).unwrap();
    settle(&mut [&mut a, &mut b]).await;

    assert_eq!(a.text("text").as_deref(), Some("hello"));
    assert_eq!(a.endpoint.sent().len(), sent_before);
    assert_eq!(a.store.peek(SCOPE, "doc"), Some(a.full()));
}
