//! The replication orchestrator.
//!
//! A [`SyncProvider`] owns one document and everything needed to keep it in
//! sync: the local store, the relay, the presence view and the connectivity
//! monitor. Collaborator callbacks never touch the document; they queue a
//! [`ProviderEvent`] that the owner handles later, either on its own task
//! (see [`SyncProvider::spawn`]) or by calling
//! [`SyncProvider::process_pending`].

use crate::compactor::ReplicaCompactor;
use crate::config::{FlushPolicy, SyncConfig};
use crate::election::LeaderElector;
use crate::error::{SyncError, SyncResult};
use crate::handle::{Command, SyncHandle};
use crate::message::{MessageKind, RemoteMessage, DOC_KEY};
use crate::network::NetworkLinkMonitor;
use crate::presence::{PeerId, Presence};
use crate::queue::PendingUpdateQueue;
use crate::store::LocalStore;
use crate::transport::RemoteChannel;
use listed_core::{DocUpdate, MergeEngine, StateVector, Subscription, Update, UpdateOrigin};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lifecycle state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Created, not bootstrapped.
    Idle,
    /// Bootstrap in progress.
    Bootstrapping,
    /// Connected; local updates are sent.
    Online,
    /// Disconnected; local updates are buffered.
    Offline,
    /// Shut down.
    Stopped,
}

impl SyncState {
    /// Returns true once bootstrap has finished and before shutdown.
    pub fn is_running(&self) -> bool {
        matches!(self, SyncState::Online | SyncState::Offline)
    }
}

/// Counters describing what a provider has done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Local updates sent as they happened.
    pub updates_sent: u64,
    /// Local updates buffered while offline.
    pub updates_buffered: u64,
    /// Buffered updates sent later.
    pub updates_flushed: u64,
    /// Remote updates and catch-up diffs applied.
    pub updates_applied: u64,
    /// Catch-up requests broadcast.
    pub handshakes: u64,
    /// Catch-up requests answered as janitor.
    pub requests_answered: u64,
    /// Catch-up requests ignored as non-janitor.
    pub requests_ignored: u64,
    /// Catch-up responses addressed to another peer.
    pub responses_ignored: u64,
    /// Catch-up requests broadcast while no janitor was elected.
    pub election_gaps: u64,
    /// Messages of unknown kind.
    pub messages_ignored: u64,
    /// Last handler failure seen by the event loop.
    pub last_error: Option<String>,
}

/// A point-in-time report on a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// This replica's peer id.
    pub peer_id: PeerId,
    /// Lifecycle state.
    pub state: SyncState,
    /// Current connectivity.
    pub online: bool,
    /// Janitor in this replica's view.
    pub janitor: Option<PeerId>,
    /// Whether this replica is the janitor.
    pub is_janitor: bool,
    /// Number of buffered updates.
    pub pending: usize,
    /// Counters.
    pub stats: SyncStats,
}

/// Something a collaborator reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The document changed.
    Mutation(DocUpdate),
    /// A message arrived from the relay.
    Message(RemoteMessage),
    /// Connectivity came back.
    Online,
    /// Connectivity was lost.
    Offline,
}

enum Next<D> {
    Event(ProviderEvent),
    Command(Command<D>),
    Stop,
}

/// Orchestrates replication of one document.
pub struct SyncProvider<E, S, R, P>
where
    E: MergeEngine,
    S: LocalStore,
    R: RemoteChannel,
    P: Presence,
{
    config: SyncConfig,
    engine: Arc<E>,
    doc: E::Document,
    store: S,
    remote: R,
    monitor: Arc<NetworkLinkMonitor>,
    elector: LeaderElector<P>,
    compactor: ReplicaCompactor<E>,
    pending: PendingUpdateQueue,
    events_tx: mpsc::UnboundedSender<ProviderEvent>,
    events_rx: mpsc::UnboundedReceiver<ProviderEvent>,
    subscriptions: Vec<Subscription>,
    state: SyncState,
    stats: SyncStats,
}

impl<E, S, R, P> SyncProvider<E, S, R, P>
where
    E: MergeEngine,
    S: LocalStore,
    R: RemoteChannel,
    P: Presence,
{
    /// Creates a provider with an empty document.
    ///
    /// Nothing is loaded or subscribed until [`bootstrap`](Self::bootstrap).
    pub fn new(
        config: SyncConfig,
        engine: E,
        store: S,
        remote: R,
        presence: P,
        monitor: Arc<NetworkLinkMonitor>,
    ) -> Self {
        let engine = Arc::new(engine);
        let doc = engine.create();
        let elector = LeaderElector::new(Arc::new(presence), config.tie_break);
        let compactor = ReplicaCompactor::new(Arc::clone(&engine));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            engine,
            doc,
            store,
            remote,
            monitor,
            elector,
            compactor,
            pending: PendingUpdateQueue::new(),
            events_tx,
            events_rx,
            subscriptions: Vec::new(),
            state: SyncState::Idle,
            stats: SyncStats::default(),
        }
    }

    /// Loads the document and connects it to its collaborators.
    ///
    /// In order: publishes metrics and elects, applies the persisted
    /// baseline, catches up with the relay if online, then subscribes to
    /// connectivity, document mutations and inbound messages.
    ///
    /// A failed bootstrap releases whatever it subscribed and leaves the
    /// provider idle, so it can be retried.
    pub async fn bootstrap(&mut self) -> SyncResult<()> {
        if self.state != SyncState::Idle {
            return Err(self.invalid_transition(SyncState::Bootstrapping));
        }
        self.state = SyncState::Bootstrapping;

        match self.connect().await {
            Ok(online) => {
                self.state = if online {
                    SyncState::Online
                } else {
                    SyncState::Offline
                };
                info!(scope = %self.config.scope, state = ?self.state, "bootstrap complete");
                Ok(())
            }
            Err(err) => {
                warn!(scope = %self.config.scope, error = %err, "bootstrap failed");
                self.subscriptions.clear();
                self.state = SyncState::Idle;
                Err(err)
            }
        }
    }

    async fn connect(&mut self) -> SyncResult<bool> {
        let scope = self.config.scope.clone();

        let janitor = self.elector.publish(self.config.metrics);
        info!(scope = %scope, peer = self.peer_id(), ?janitor, "bootstrapping");

        if let Some(baseline) = self.store.get(&scope, &self.config.doc_key).await? {
            self.engine.apply(&mut self.doc, &baseline)?;
            debug!(scope = %scope, bytes = baseline.len(), "applied persisted baseline");
        }

        let online = self.monitor.is_online();
        if online {
            let snapshot = self.remote.get_snapshot(&scope).await?;
            if let Some(remote_doc) = snapshot.get(DOC_KEY) {
                self.engine.apply(&mut self.doc, remote_doc)?;
                self.persist_baseline().await?;
            }
            self.request_state_vector().await?;
        }

        let tx = self.events_tx.clone();
        self.subscriptions.push(self.monitor.on_online(move || {
            let _ = tx.send(ProviderEvent::Online);
        }));
        let tx = self.events_tx.clone();
        self.subscriptions.push(self.monitor.on_offline(move || {
            let _ = tx.send(ProviderEvent::Offline);
        }));

        let tx = self.events_tx.clone();
        self.subscriptions.push(self.engine.observe(
            &self.doc,
            Box::new(move |update: &DocUpdate| {
                let _ = tx.send(ProviderEvent::Mutation(update.clone()));
            }),
        ));

        let tx = self.events_tx.clone();
        let watch = self
            .remote
            .watch(
                &scope,
                Box::new(move |message: &RemoteMessage| {
                    let _ = tx.send(ProviderEvent::Message(message.clone()));
                }),
            )
            .await?;
        self.subscriptions.push(watch);
        Ok(online)
    }

    /// Handles one queued event.
    pub async fn handle_event(&mut self, event: ProviderEvent) -> SyncResult<()> {
        match event {
            ProviderEvent::Mutation(update) => self.handle_mutation(update).await,
            ProviderEvent::Message(message) => self.handle_remote_message(message).await,
            ProviderEvent::Online => self.handle_online().await,
            ProviderEvent::Offline => {
                self.handle_offline();
                Ok(())
            }
        }
    }

    /// Handles a document mutation.
    ///
    /// Local edits are persisted and routed. Applied remote updates are only
    /// persisted, so they are never echoed back to the relay.
    pub async fn handle_mutation(&mut self, event: DocUpdate) -> SyncResult<()> {
        match event.origin {
            UpdateOrigin::Local => self.handle_local_update(event.update).await,
            UpdateOrigin::Remote => self.persist_baseline().await,
        }
    }

    /// Persists the document, then sends `update` or buffers it when offline.
    ///
    /// Routing follows the connectivity events handled so far, not the live
    /// monitor, so an edit queued behind an `Offline` event is buffered even
    /// if the link is back by the time it is handled.
    ///
    /// A failed send drops the update; the baseline already contains it.
    pub async fn handle_local_update(&mut self, update: Update) -> SyncResult<()> {
        self.persist_baseline().await?;

        if self.state == SyncState::Online {
            self.remote
                .send(&self.config.scope, RemoteMessage::doc(update))
                .await?;
            self.stats.updates_sent += 1;
        } else {
            self.pending.enqueue(update);
            self.stats.updates_buffered += 1;
            debug!(pending = self.pending.len(), "buffered local update");
        }
        Ok(())
    }

    /// Handles a message from the relay.
    pub async fn handle_remote_message(&mut self, message: RemoteMessage) -> SyncResult<()> {
        let local = self.peer_id();
        match message.kind {
            MessageKind::Doc => {
                self.engine.apply(&mut self.doc, &message.payload)?;
                self.stats.updates_applied += 1;
            }
            MessageKind::StateVectorRequest => {
                let origin = match message.origin {
                    Some(origin) if origin != local => origin,
                    _ => {
                        debug!(origin = ?message.origin, "ignoring unaddressable catch-up request");
                        self.stats.requests_ignored += 1;
                        return Ok(());
                    }
                };
                if !self.elector.is_janitor() {
                    debug!(origin, janitor = ?self.elector.janitor(), "not janitor; ignoring catch-up request");
                    self.stats.requests_ignored += 1;
                    return Ok(());
                }
                let diff = self.engine.encode_diff(&self.doc, &message.payload)?;
                self.remote
                    .send(
                        &self.config.scope,
                        RemoteMessage::state_vector_response(origin, diff),
                    )
                    .await?;
                self.stats.requests_answered += 1;
                info!(origin, "answered catch-up request");
            }
            MessageKind::StateVectorResponse(target) if target == local => {
                self.engine.apply(&mut self.doc, &message.payload)?;
                self.stats.updates_applied += 1;
                info!("applied catch-up response");
            }
            MessageKind::StateVectorResponse(target) => {
                debug!(target, "catch-up response addressed to another peer");
                self.stats.responses_ignored += 1;
            }
            MessageKind::Other(kind) => {
                debug!(kind = %kind, "ignoring message of unknown kind");
                self.stats.messages_ignored += 1;
            }
        }
        Ok(())
    }

    /// Handles connectivity returning: catch up, then flush per policy.
    pub async fn handle_online(&mut self) -> SyncResult<()> {
        if self.state == SyncState::Stopped {
            return Err(SyncError::Closed);
        }
        self.state = SyncState::Online;
        info!(scope = %self.config.scope, pending = self.pending.len(), "online");

        self.request_state_vector().await?;
        if self.config.flush_policy == FlushPolicy::OnReconnect {
            self.flush_pending().await?;
        }
        Ok(())
    }

    /// Handles connectivity loss.
    pub fn handle_offline(&mut self) {
        if self.state.is_running() || self.state == SyncState::Bootstrapping {
            self.state = SyncState::Offline;
        }
        info!(scope = %self.config.scope, "offline");
    }

    /// Broadcasts this replica's state vector so the janitor can answer
    /// with what is missing.
    pub async fn request_state_vector(&mut self) -> SyncResult<()> {
        if self.elector.janitor().is_none() {
            debug!("no janitor elected; catch-up request will go unanswered");
            self.stats.election_gaps += 1;
        }
        let vector = self.engine.encode_state_vector(&self.doc)?;
        let request = RemoteMessage::state_vector_request(vector, self.peer_id());
        self.remote.send(&self.config.scope, request).await?;
        self.stats.handshakes += 1;
        Ok(())
    }

    /// Sends buffered updates, oldest first.
    ///
    /// Stops at the first failed send; that update and everything after it
    /// stay buffered in order.
    pub async fn flush_pending(&mut self) -> SyncResult<usize> {
        let mut flushed = 0;
        while let Some(update) = self.pending.dequeue() {
            let message = RemoteMessage::doc(update.clone());
            if let Err(err) = self.remote.send(&self.config.scope, message).await {
                self.pending.push_front(update);
                return Err(err);
            }
            flushed += 1;
            self.stats.updates_flushed += 1;
        }
        if flushed > 0 {
            info!(flushed, "flushed buffered updates");
        }
        Ok(flushed)
    }

    /// Returns a full snapshot if this replica is the janitor.
    pub fn create_snapshot(&self) -> SyncResult<Option<Update>> {
        if !self.elector.is_janitor() {
            return Ok(None);
        }
        Ok(Some(self.compactor.create_snapshot(&self.doc)?))
    }

    /// Returns the state vector if this replica is the janitor.
    pub fn create_state_vector(&self) -> SyncResult<Option<StateVector>> {
        if !self.elector.is_janitor() {
            return Ok(None);
        }
        Ok(Some(self.compactor.create_state_vector(&self.doc)?))
    }

    /// Returns the full document encoding.
    pub fn encode_full(&self) -> SyncResult<Update> {
        Ok(self.engine.encode_full(&self.doc)?)
    }

    /// Handles every queued event, including events queued while doing so.
    ///
    /// Failing handlers are logged and recorded in
    /// [`SyncStats::last_error`]. Returns the number of events handled.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.dispatch(event).await;
            handled += 1;
        }
        handled
    }

    /// Runs `f` against the document.
    pub fn edit<T>(&mut self, f: impl FnOnce(&mut E::Document) -> T) -> T {
        f(&mut self.doc)
    }

    /// Returns the document.
    pub fn document(&self) -> &E::Document {
        &self.doc
    }

    /// Returns the merge engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns this replica's peer id.
    pub fn peer_id(&self) -> PeerId {
        self.elector.local_peer_id()
    }

    /// Returns true if this replica is the janitor.
    pub fn is_janitor(&self) -> bool {
        self.elector.is_janitor()
    }

    /// Returns the election state.
    pub fn elector(&self) -> &LeaderElector<P> {
        &self.elector
    }

    /// Returns the connectivity monitor.
    pub fn monitor(&self) -> &Arc<NetworkLinkMonitor> {
        &self.monitor
    }

    /// Returns the buffered updates, oldest first.
    pub fn pending_updates(&self) -> Vec<Update> {
        self.pending.snapshot()
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Returns the counters.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Returns a status report.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            peer_id: self.peer_id(),
            state: self.state,
            online: self.monitor.is_online(),
            janitor: self.elector.janitor(),
            is_janitor: self.elector.is_janitor(),
            pending: self.pending.len(),
            stats: self.stats.clone(),
        }
    }

    /// Releases every subscription and leaves the membership.
    pub fn shutdown(&mut self) {
        if self.state == SyncState::Stopped {
            return;
        }
        self.subscriptions.clear();
        self.elector.leave();
        self.state = SyncState::Stopped;
        info!(scope = %self.config.scope, "provider stopped");
    }

    /// Bootstraps the provider and moves it onto its own task.
    pub async fn start(mut self) -> SyncResult<SyncHandle<E::Document>> {
        self.bootstrap().await?;
        Ok(self.spawn())
    }

    /// Moves the provider onto its own task.
    ///
    /// The task stops when [`SyncHandle::shutdown`] is called or every
    /// handle is dropped.
    pub fn spawn(self) -> SyncHandle<E::Document> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        SyncHandle::new(tx)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command<E::Document>>) {
        loop {
            let next = tokio::select! {
                biased;
                Some(event) = self.events_rx.recv() => Next::Event(event),
                command = commands.recv() => match command {
                    Some(command) => Next::Command(command),
                    None => Next::Stop,
                },
            };

            match next {
                Next::Event(event) => self.dispatch(event).await,
                Next::Command(Command::Shutdown(reply)) => {
                    self.shutdown();
                    let _ = reply.send(());
                    break;
                }
                Next::Command(command) => self.execute(command).await,
                Next::Stop => {
                    self.shutdown();
                    break;
                }
            }
        }
    }

    async fn execute(&mut self, command: Command<E::Document>) {
        match command {
            Command::Edit(apply) => apply(&mut self.doc),
            Command::Read(inspect) => inspect(&self.doc),
            Command::CreateSnapshot(reply) => {
                let _ = reply.send(self.create_snapshot());
            }
            Command::CreateStateVector(reply) => {
                let _ = reply.send(self.create_state_vector());
            }
            Command::EncodeFull(reply) => {
                let _ = reply.send(self.encode_full());
            }
            Command::FlushPending(reply) => {
                let result = self.flush_pending().await;
                let _ = reply.send(result);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown(reply) => {
                self.shutdown();
                let _ = reply.send(());
            }
        }
    }

    async fn dispatch(&mut self, event: ProviderEvent) {
        if let Err(err) = self.handle_event(event).await {
            warn!(error = %err, retryable = err.is_retryable(), "sync handler failed");
            self.stats.last_error = Some(err.to_string());
        }
    }

    async fn persist_baseline(&mut self) -> SyncResult<()> {
        let full = self.engine.encode_full(&self.doc)?;
        self.store
            .put(&self.config.scope, &self.config.doc_key, full)
            .await
    }

    fn invalid_transition(&self, to: SyncState) -> SyncError {
        SyncError::InvalidStateTransition {
            from: format!("{:?}", self.state),
            to: format!("{:?}", to),
        }
    }
}
