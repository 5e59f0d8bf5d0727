//! Handle to a running sync provider.

use crate::error::{SyncError, SyncResult};
use crate::provider::SyncStatus;
use listed_core::{StateVector, Update};
use std::fmt;
use tokio::sync::{mpsc, oneshot};

type Reply<T> = oneshot::Sender<T>;

/// A request to the provider task.
pub(crate) enum Command<D> {
    Edit(Box<dyn FnOnce(&mut D) + Send>),
    Read(Box<dyn FnOnce(&D) + Send>),
    CreateSnapshot(Reply<SyncResult<Option<Update>>>),
    CreateStateVector(Reply<SyncResult<Option<StateVector>>>),
    EncodeFull(Reply<SyncResult<Update>>),
    FlushPending(Reply<SyncResult<usize>>),
    Status(Reply<SyncStatus>),
    Shutdown(Reply<()>),
}

/// Cloneable handle to a provider running on its own task.
///
/// Every call is a message to the task; the task owns the document and runs
/// one request at a time. Mutation and relay events queued before a request
/// are handled before it.
pub struct SyncHandle<D> {
    commands: mpsc::UnboundedSender<Command<D>>,
}

impl<D: Send + 'static> SyncHandle<D> {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command<D>>) -> Self {
        Self { commands }
    }

    /// Runs `f` against the document and returns its result.
    ///
    /// Edits made by `f` are persisted and routed like any local update.
    pub async fn edit<F, T>(&self, f: F) -> SyncResult<T>
    where
        F: FnOnce(&mut D) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Edit(Box::new(move |doc| {
            let _ = tx.send(f(doc));
        })))?;
        rx.await.map_err(|_| SyncError::Closed)
    }

    /// Runs `f` against a shared borrow of the document.
    pub async fn read<F, T>(&self, f: F) -> SyncResult<T>
    where
        F: FnOnce(&D) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Read(Box::new(move |doc| {
            let _ = tx.send(f(doc));
        })))?;
        rx.await.map_err(|_| SyncError::Closed)
    }

    /// Returns a full snapshot if this replica is the janitor.
    pub async fn create_snapshot(&self) -> SyncResult<Option<Update>> {
        self.request(Command::CreateSnapshot).await?
    }

    /// Returns the state vector if this replica is the janitor.
    pub async fn create_state_vector(&self) -> SyncResult<Option<StateVector>> {
        self.request(Command::CreateStateVector).await?
    }

    /// Returns the full document encoding regardless of janitor status.
    pub async fn encode_full(&self) -> SyncResult<Update> {
        self.request(Command::EncodeFull).await?
    }

    /// Sends every buffered update.
    pub async fn flush_pending(&self) -> SyncResult<usize> {
        self.request(Command::FlushPending).await?
    }

    /// Returns a status report.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        self.request(Command::Status).await
    }

    /// Stops the provider and waits for it to release its subscriptions.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.request(Command::Shutdown).await
    }

    /// Returns true once the provider task has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command<D>) -> SyncResult<()> {
        self.commands.send(command).map_err(|_| SyncError::Closed)
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command<D>) -> SyncResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        rx.await.map_err(|_| SyncError::Closed)
    }
}

impl<D> Clone for SyncHandle<D> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

impl<D> fmt::Debug for SyncHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}
