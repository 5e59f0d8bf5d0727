//! Relay collaborator.
//!
//! The relay is a broadcast channel per scope: every message sent by one
//! peer reaches every other peer watching that scope.

use crate::error::{SyncError, SyncResult};
use crate::message::RemoteMessage;
use async_trait::async_trait;
use listed_core::{Listeners, Subscription};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked for every inbound message.
pub type MessageHandler = Box<dyn Fn(&RemoteMessage) + Send + Sync>;

/// A broadcast relay shared by the peers of a scope.
#[async_trait]
pub trait RemoteChannel: Send + Sync + 'static {
    /// Starts delivering inbound messages for `scope` to `handler`.
    async fn watch(&self, scope: &str, handler: MessageHandler) -> SyncResult<Subscription>;

    /// Broadcasts a message to the other peers of `scope`.
    async fn send(&self, scope: &str, message: RemoteMessage) -> SyncResult<()>;

    /// Returns the relay's retained state for `scope`, keyed by message kind.
    async fn get_snapshot(&self, scope: &str) -> SyncResult<BTreeMap<String, Vec<u8>>>;
}

#[derive(Debug, Clone)]
struct Delivery {
    from: u64,
    message: RemoteMessage,
}

#[derive(Debug, Default)]
struct RelayScope {
    retained: BTreeMap<String, Vec<u8>>,
    listeners: Listeners<Delivery>,
}

#[derive(Debug, Default)]
struct RelayInner {
    scopes: Mutex<HashMap<String, RelayScope>>,
    next_endpoint: AtomicU64,
}

/// In-process relay hub.
///
/// Cloning yields another handle to the same hub. Each peer talks to the hub
/// through its own [`RelayEndpoint`].
#[derive(Debug, Clone, Default)]
pub struct MemoryRelay {
    inner: Arc<RelayInner>,
}

impl MemoryRelay {
    /// Creates an empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connected endpoint.
    pub fn endpoint(&self) -> RelayEndpoint {
        RelayEndpoint {
            id: self.inner.next_endpoint.fetch_add(1, Ordering::SeqCst),
            relay: self.clone(),
            connected: Arc::new(AtomicBool::new(true)),
            rejecting: Arc::new(AtomicBool::new(false)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sets a retained payload for `scope` as if it had been sent.
    pub fn retain(&self, scope: &str, kind: impl Into<String>, payload: Vec<u8>) {
        self.inner
            .scopes
            .lock()
            .entry(scope.to_string())
            .or_default()
            .retained
            .insert(kind.into(), payload);
    }

    /// Returns the retained payloads of `scope`.
    pub fn retained(&self, scope: &str) -> BTreeMap<String, Vec<u8>> {
        self.inner
            .scopes
            .lock()
            .get(scope)
            .map(|s| s.retained.clone())
            .unwrap_or_default()
    }

    fn listeners(&self, scope: &str) -> Listeners<Delivery> {
        self.inner
            .scopes
            .lock()
            .entry(scope.to_string())
            .or_default()
            .listeners
            .clone()
    }

    fn broadcast(&self, scope: &str, from: u64, message: RemoteMessage) {
        let listeners = {
            let mut scopes = self.inner.scopes.lock();
            let state = scopes.entry(scope.to_string()).or_default();
            state
                .retained
                .insert(message.kind.as_wire(), message.payload.clone());
            state.listeners.clone()
        };
        listeners.emit(&Delivery { from, message });
    }
}

/// One peer's connection to a [`MemoryRelay`].
///
/// The endpoint never receives its own messages. While disconnected it
/// neither sends nor receives; messages broadcast in the meantime are not
/// redelivered.
///
/// Cloning yields another handle to the same endpoint.
#[derive(Debug, Clone)]
pub struct RelayEndpoint {
    id: u64,
    relay: MemoryRelay,
    connected: Arc<AtomicBool>,
    rejecting: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<RemoteMessage>>>,
}

impl RelayEndpoint {
    /// Returns the endpoint id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connects or partitions the endpoint.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns true if the endpoint is connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Makes the relay refuse every send with a non-retryable error.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Returns every message successfully sent through this endpoint.
    pub fn sent(&self) -> Vec<RemoteMessage> {
        self.sent.lock().clone()
    }

    fn ensure_connected(&self) -> SyncResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }
}

#[async_trait]
impl RemoteChannel for RelayEndpoint {
    async fn watch(&self, scope: &str, handler: MessageHandler) -> SyncResult<Subscription> {
        let own_id = self.id;
        let connected = Arc::clone(&self.connected);
        Ok(self.relay.listeners(scope).subscribe(move |delivery| {
            if delivery.from != own_id && connected.load(Ordering::SeqCst) {
                handler(&delivery.message);
            }
        }))
    }

    async fn send(&self, scope: &str, message: RemoteMessage) -> SyncResult<()> {
        self.ensure_connected()?;
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(SyncError::transport_fatal("relay rejected message"));
        }
        self.sent.lock().push(message.clone());
        self.relay.broadcast(scope, self.id, message);
        Ok(())
    }

    async fn get_snapshot(&self, scope: &str) -> SyncResult<BTreeMap<String, Vec<u8>>> {
        self.ensure_connected()?;
        Ok(self.relay.retained(scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    fn collect() -> (Arc<Mutex<Vec<RemoteMessage>>>, MessageHandler) {
        let inbox = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&inbox);
        (inbox, Box::new(move |m: &RemoteMessage| sink.lock().push(m.clone())))
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let relay = MemoryRelay::new();
        let a = relay.endpoint();
        let b = relay.endpoint();
        let (inbox_a, handler_a) = collect();
        let (inbox_b, handler_b) = collect();
        let _wa = a.watch("list", handler_a).await.unwrap();
        let _wb = b.watch("list", handler_b).await.unwrap();

        a.send("list", RemoteMessage::doc(vec![1])).await.unwrap();

        assert!(inbox_a.lock().is_empty());
        assert_eq!(inbox_b.lock().len(), 1);
        assert_eq!(a.sent().len(), 1);
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let relay = MemoryRelay::new();
        let a = relay.endpoint();
        let b = relay.endpoint();
        let (inbox, handler) = collect();
        let _watch = b.watch("other", handler).await.unwrap();

        a.send("list", RemoteMessage::doc(vec![1])).await.unwrap();
        assert!(inbox.lock().is_empty());
    }

    #[tokio::test]
    async fn partitioned_endpoint() {
        let relay = MemoryRelay::new();
        let a = relay.endpoint();
        let b = relay.endpoint();
        let (inbox, handler) = collect();
        let _watch = b.watch("list", handler).await.unwrap();

        b.set_connected(false);
        a.send("list", RemoteMessage::doc(vec![1])).await.unwrap();
        assert!(inbox.lock().is_empty());
        assert_eq!(
            b.send("list", RemoteMessage::doc(vec![2])).await,
            Err(SyncError::NotConnected)
        );
        assert_eq!(b.get_snapshot("list").await, Err(SyncError::NotConnected));

        b.set_connected(true);
        a.send("list", RemoteMessage::doc(vec![3])).await.unwrap();
        assert_eq!(inbox.lock().len(), 1);
    }

    #[tokio::test]
    async fn snapshot_keeps_last_payload_per_kind() {
        let relay = MemoryRelay::new();
        let a = relay.endpoint();
        a.send("list", RemoteMessage::doc(vec![1])).await.unwrap();
        a.send("list", RemoteMessage::doc(vec![2])).await.unwrap();
        a.send("list", RemoteMessage::state_vector_response(4, vec![9]))
            .await
            .unwrap();

        let snapshot = relay.endpoint().get_snapshot("list").await.unwrap();
        assert_eq!(snapshot.get("doc"), Some(&vec![2]));
        assert_eq!(
            snapshot.get(&MessageKind::StateVectorResponse(4).as_wire()),
            Some(&vec![9])
        );
    }

    #[tokio::test]
    async fn rejecting_endpoint() {
        let relay = MemoryRelay::new();
        let a = relay.endpoint();
        a.set_rejecting(true);
        let err = a.send("list", RemoteMessage::doc(vec![1])).await.unwrap_err();
        assert!(err.is_transport());
        assert!(!err.is_retryable());
        assert!(a.sent().is_empty());
    }
}
