//! The boundary with the asset-streaming engine.
//!
//! The engine owns the loading machinery and the memory behind every handle.
//! This crate only drives it through [`Engine`] and observes load operations
//! through [`LoadHandle`].

use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::RecvTimeoutError;
use tokio::sync::oneshot;

use crate::rtti::ResourceType;

/// An object produced by the engine.
pub type Object = Arc<dyn Any + Send + Sync>;

/// Single-fire completion notification.
pub type CompletionCallback = Box<dyn FnOnce(LoadStatus) + Send + 'static>;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LoadStatus {
    Pending,
    Succeeded,
    Failed,
}

impl LoadStatus {
    pub fn is_done(self) -> bool {
        self != LoadStatus::Pending
    }
}

/// Type tag of a handle, fixed by what was requested when the load was issued.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HandleKind {
    Asset,
    Prefab,
}

/// What the engine is asked to load.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LoadKind {
    Asset(ResourceType),
    Prefab,
}

impl LoadKind {
    pub fn handle_kind(self) -> HandleKind {
        match self {
            LoadKind::Asset(_) => HandleKind::Asset,
            LoadKind::Prefab => HandleKind::Prefab,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitError {
    Timeout,
    Dropped,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::Timeout => f.write_str("timed out"),
            WaitError::Dropped => f.write_str("completion notification dropped"),
        }
    }
}

/// One in-flight or completed load operation.
#[async_trait]
pub trait LoadHandle: Clone + Debug + Send + Sync + 'static {
    fn status(&self) -> LoadStatus;

    /// The loaded object. Only present once the status is
    /// [`LoadStatus::Succeeded`].
    fn result(&self) -> Option<Object>;

    fn kind(&self) -> HandleKind;

    fn error(&self) -> Option<String> {
        None
    }

    /// Registers a callback fired exactly once when the load resolves. If the
    /// load has already resolved, the callback fires immediately on the
    /// calling thread.
    fn on_completed(&self, callback: CompletionCallback);

    /// Resolves when the load does. `None` means the engine dropped the
    /// notification without firing it.
    async fn completed(&self) -> Option<LoadStatus> {
        let status = self.status();
        if status.is_done() {
            return Some(status);
        }

        let (tx, rx) = oneshot::channel();
        self.on_completed(Box::new(move |status| {
            let _ = tx.send(status);
        }));

        rx.await.ok()
    }

    /// Blocks the calling thread until the load resolves.
    ///
    /// Engines that only make progress on the thread that is waiting must
    /// override this and pump themselves.
    fn wait(&self, timeout: Option<Duration>) -> Result<LoadStatus, WaitError> {
        let status = self.status();
        if status.is_done() {
            return Ok(status);
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        self.on_completed(Box::new(move |status| {
            let _ = tx.send(status);
        }));

        match timeout {
            Some(timeout) => rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => WaitError::Timeout,
                RecvTimeoutError::Disconnected => WaitError::Dropped,
            }),
            None => rx.recv().map_err(|_| WaitError::Dropped),
        }
    }
}

pub trait Engine: Send + Sync + 'static {
    type Handle: LoadHandle;

    /// Starts a load and returns immediately with a handle.
    fn begin_load(&self, id: &str, kind: LoadKind) -> Self::Handle;

    /// Drops one reference held by `handle`. Called exactly once for every
    /// handle this crate stops tracking.
    fn release(&self, handle: &Self::Handle);

    fn instantiate(&self, prefab: &Object, parent: Option<&Object>) -> Object;

    fn get_component(&self, object: &Object, component: ResourceType) -> Option<Object>;

    /// Whether `object` can act as the parent of an instantiated prefab.
    fn is_attachment_point(&self, object: &Object) -> bool;
}

/// Allocation identity of an object.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ObjectAddr(usize);

impl ObjectAddr {
    pub fn of<T: ?Sized>(object: &Arc<T>) -> ObjectAddr {
        ObjectAddr(Arc::as_ptr(object) as *const () as usize)
    }
}
