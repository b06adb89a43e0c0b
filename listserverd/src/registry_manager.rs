use std::net::IpAddr;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use shared::types::{ListRequest, RegistrationRequest, RemovalRequest, ServerList, UpdateRequest};
use crate::registry::entry::Entry;
use crate::registry::error::{RegistryError, RegistryResult};
use crate::registry::Registry;

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub remaining: usize,
}

/// Commands sent to the registry thread
pub enum RegistryCommand {
    Register {
        request: RegistrationRequest,
        origin: IpAddr,
        reply: oneshot::Sender<RegistryResult<Entry>>,
    },
    Update {
        request: UpdateRequest,
        origin: IpAddr,
        reply: oneshot::Sender<RegistryResult<Entry>>,
    },
    Remove {
        request: RemovalRequest,
        origin: IpAddr,
        reply: oneshot::Sender<RegistryResult<()>>,
    },
    List {
        request: ListRequest,
        requester: IpAddr,
        reply: oneshot::Sender<ServerList>,
    },
    Sweep(oneshot::Sender<SweepReport>),
    #[cfg(test)]
    Get(crate::registry::entry::EntryId, oneshot::Sender<RegistryResult<Entry>>),
    #[cfg(test)]
    StoredCount(oneshot::Sender<usize>),
    Shutdown,
}

/// Handle to the registry.
///
/// A single thread owns the `Registry` and runs commands one at a time, so
/// every operation, including sweeps, is atomic with respect to the others.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn the registry thread
    pub fn spawn(mut registry: Registry) -> Self {
        let (tx, mut rx) = mpsc::channel::<RegistryCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    RegistryCommand::Register { request, origin, reply } => {
                        let _ = reply.send(registry.register(&request, origin));
                    }
                    RegistryCommand::Update { request, origin, reply } => {
                        let _ = reply.send(registry.update(&request, origin));
                    }
                    RegistryCommand::Remove { request, origin, reply } => {
                        let _ = reply.send(registry.remove(&request, origin));
                    }
                    RegistryCommand::List { request, requester, reply } => {
                        let _ = reply.send(registry.list(&request, requester));
                    }
                    RegistryCommand::Sweep(reply) => {
                        let removed = registry.sweep();
                        let _ = reply.send(SweepReport {
                            removed,
                            remaining: registry.live_count(),
                        });
                    }
                    #[cfg(test)]
                    RegistryCommand::Get(id, reply) => {
                        let _ = reply.send(registry.get(&id));
                    }
                    #[cfg(test)]
                    RegistryCommand::StoredCount(reply) => {
                        let _ = reply.send(registry.stored_count());
                    }
                    RegistryCommand::Shutdown => {
                        tracing::info!("Registry thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    pub async fn register(
        &self,
        request: RegistrationRequest,
        origin: IpAddr,
    ) -> RegistryResult<Entry> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Register { request, origin, reply }).await?;
        rx.await.map_err(|_| RegistryError::Unavailable)?
    }

    pub async fn update(&self, request: UpdateRequest, origin: IpAddr) -> RegistryResult<Entry> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Update { request, origin, reply }).await?;
        rx.await.map_err(|_| RegistryError::Unavailable)?
    }

    pub async fn remove(&self, request: RemovalRequest, origin: IpAddr) -> RegistryResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Remove { request, origin, reply }).await?;
        rx.await.map_err(|_| RegistryError::Unavailable)?
    }

    pub async fn list(&self, request: ListRequest, requester: IpAddr) -> RegistryResult<ServerList> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::List { request, requester, reply }).await?;
        rx.await.map_err(|_| RegistryError::Unavailable)
    }

    /// Drop every lapsed entry
    pub async fn sweep(&self) -> RegistryResult<SweepReport> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Sweep(reply)).await?;
        rx.await.map_err(|_| RegistryError::Unavailable)
    }

    #[cfg(test)]
    pub async fn get(&self, id: crate::registry::entry::EntryId) -> RegistryResult<Entry> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Get(id, reply)).await?;
        rx.await.map_err(|_| RegistryError::Unavailable)?
    }

    /// Entries held by the registry, including lapsed ones no sweep has reclaimed
    #[cfg(test)]
    pub async fn stored_count(&self) -> RegistryResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::StoredCount(reply)).await?;
        rx.await.map_err(|_| RegistryError::Unavailable)
    }

    /// Stop the registry thread. Later calls fail with `Unavailable`.
    pub async fn shutdown(&self) -> RegistryResult<()> {
        self.send(RegistryCommand::Shutdown).await
    }

    async fn send(&self, cmd: RegistryCommand) -> RegistryResult<()> {
        self.tx.send(cmd).await.map_err(|_| RegistryError::Unavailable)
    }
}
