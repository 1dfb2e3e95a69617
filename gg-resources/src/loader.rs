use std::any::{self, Any};
use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, instrument, trace, warn};

use crate::cancel::CancelToken;
use crate::config::{AwaitMode, LoaderConfig};
use crate::engine::{Engine, LoadHandle, LoadStatus, Object, ObjectAddr, WaitError};
use crate::error::LoadError;
use crate::registry::HandleRegistry;
use crate::request::Request;
use crate::rtti::ResourceType;
use crate::{Asset, Component};

/// Loads resources by identifier and tracks every handle it still has to
/// release.
///
/// Clones share the same registry. Unless disabled in [`LoaderConfig`],
/// dropping the last clone releases everything still registered.
pub struct ResourceLoader<E: Engine> {
    shared: Arc<Shared<E>>,
}

struct Shared<E: Engine> {
    engine: Arc<E>,
    registry: HandleRegistry<E::Handle>,
    config: LoaderConfig,
}

enum Wait {
    Done(LoadStatus),
    Cancelled,
    Dropped,
}

impl<E: Engine> ResourceLoader<E> {
    pub fn new(engine: Arc<E>) -> ResourceLoader<E> {
        ResourceLoader::with_config(engine, LoaderConfig::default())
    }

    pub fn with_config(engine: Arc<E>, config: LoaderConfig) -> ResourceLoader<E> {
        ResourceLoader {
            shared: Arc::new(Shared {
                engine,
                registry: HandleRegistry::new(),
                config,
            }),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.shared.engine
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.shared.config
    }

    pub fn registered(&self) -> &HandleRegistry<E::Handle> {
        &self.shared.registry
    }

    /// Blocks the calling thread until the asset is loaded.
    pub fn load_asset_sync<A: Asset>(&self, id: &str) -> Result<Arc<A>, LoadError> {
        self.shared.load_sync(id, Request::asset::<A>())
    }

    /// Blocks the calling thread until the prefab `id` is loaded, then takes
    /// its `C` component.
    pub fn load_component_sync<C: Component>(&self, id: &str) -> Result<Arc<C>, LoadError> {
        self.shared.load_sync(id, Request::component::<C>())
    }

    /// Returns immediately. Exactly one of `on_loaded` and `on_error` runs
    /// later, on whichever thread the engine completes the load, unless the
    /// token is cancelled first, in which case neither does.
    ///
    /// The load is registered only after `on_loaded` returns, so releasing
    /// the asset from inside `on_loaded` releases nothing and the load stays
    /// registered until [`release_all`](Self::release_all). If `on_loaded`
    /// panics, the handle is released before the panic resumes.
    pub fn load_asset_with_callback<A, F, G>(
        &self,
        id: &str,
        on_loaded: F,
        on_error: G,
        token: &CancelToken,
    ) where
        A: Asset,
        F: FnOnce(Arc<A>) + Send + 'static,
        G: FnOnce(LoadError) + Send + 'static,
    {
        self.load_with_callback(id, Request::asset::<A>(), on_loaded, on_error, token);
    }

    /// Component form of
    /// [`load_asset_with_callback`](Self::load_asset_with_callback), with the
    /// same registration order.
    pub fn load_component_with_callback<C, F, G>(
        &self,
        id: &str,
        on_loaded: F,
        on_error: G,
        token: &CancelToken,
    ) where
        C: Component,
        F: FnOnce(Arc<C>) + Send + 'static,
        G: FnOnce(LoadError) + Send + 'static,
    {
        self.load_with_callback(id, Request::component::<C>(), on_loaded, on_error, token);
    }

    /// Resolves to `None` when the token was cancelled before the load
    /// completed. Cancellation is not an error.
    ///
    /// In [`AwaitMode::Completion`] the token is only checked once the engine
    /// completes the load. Only [`AwaitMode::Poll`] notices cancellation of a
    /// load that never completes.
    pub async fn load_asset<A: Asset>(
        &self,
        id: &str,
        token: &CancelToken,
    ) -> Result<Option<Arc<A>>, LoadError> {
        self.shared.load_async(id, Request::asset::<A>(), token).await
    }

    /// Component form of [`load_asset`](Self::load_asset), with the same
    /// cancellation behavior.
    pub async fn load_component<C: Component>(
        &self,
        id: &str,
        token: &CancelToken,
    ) -> Result<Option<Arc<C>>, LoadError> {
        self.shared
            .load_async(id, Request::component::<C>(), token)
            .await
    }

    /// Untyped form of the awaitable loads. [`Request::Prefab`] resolves to
    /// the prefab object itself.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn load(
        &self,
        id: &str,
        request: Request,
        token: &CancelToken,
    ) -> Result<Option<Object>, LoadError> {
        let shared = &*self.shared;
        let (handle, status) = match shared.await_completion(id, request, token).await? {
            Some(completed) => completed,
            None => return Ok(None),
        };

        let (loaded, resolved) = shared.resolve_object(id, request, &handle, status)?;
        if let Request::Asset(expected) = request {
            if !expected.matches(&*resolved) {
                shared.release_handle(id, &handle);
                return Err(LoadError::TypeMismatch {
                    id: id.into(),
                    expected: expected.name(),
                });
            }
        }

        shared.registry.add(id.into(), handle, loaded);
        Ok(Some(resolved))
    }

    /// Loads and registers the asset without handing it out.
    pub async fn preload_asset<A: Asset>(
        &self,
        id: &str,
        token: &CancelToken,
    ) -> Result<(), LoadError> {
        self.load_asset::<A>(id, token).await.map(drop)
    }

    pub async fn preload_component<C: Component>(
        &self,
        id: &str,
        token: &CancelToken,
    ) -> Result<(), LoadError> {
        self.load_component::<C>(id, token).await.map(drop)
    }

    /// Loads the prefab `id`, instantiates it under `parent` and returns the
    /// instance's `C` component.
    ///
    /// A parent that is not an attachment point is ignored. A missing
    /// component yields `None`; the prefab stays registered either way and
    /// is released by [`release_all`](Self::release_all).
    #[instrument(skip_all, fields(id = %id))]
    pub async fn load_and_instantiate<C: Component>(
        &self,
        id: &str,
        parent: Option<&Object>,
        token: &CancelToken,
    ) -> Result<Option<Arc<C>>, LoadError> {
        let shared = &*self.shared;
        let request = Request::Prefab;

        let (handle, status) = match shared.await_completion(id, request, token).await? {
            Some(completed) => completed,
            None => return Ok(None),
        };

        let (loaded, prefab) = shared.resolve_object(id, request, &handle, status)?;
        shared.registry.add(id.into(), handle, loaded);

        let parent = parent.filter(|parent| {
            let valid = shared.engine.is_attachment_point(parent);
            if !valid {
                error!("parent is not an attachment point, instantiating without a parent");
            }
            valid
        });

        let instance = shared.engine.instantiate(&prefab, parent);

        let component = ResourceType::of::<C>();
        let found = shared
            .engine
            .get_component(&instance, component)
            .and_then(|found| found.downcast::<C>().ok());

        if found.is_none() {
            error!(component = component.name(), "instance has no such component");
        }

        Ok(found)
    }

    /// Releases one registered load that produced `asset`, the earliest one
    /// if the engine handed the same object out several times. Returns the
    /// number of handles released; an unknown asset releases nothing.
    pub fn release_asset<A: Asset>(&self, asset: &Arc<A>) -> usize {
        self.shared.release_matching(ObjectAddr::of(asset), None)
    }

    /// Releases one prefab load whose `C` component is `component`.
    pub fn release_component<C: Component>(&self, component: &Arc<C>) -> usize {
        self.shared
            .release_matching(ObjectAddr::of(component), Some(ResourceType::of::<C>()))
    }

    pub fn release(&self, object: &Object, request: Request) -> usize {
        self.shared
            .release_matching(ObjectAddr::of(object), request.component_type())
    }

    pub fn release_all(&self) -> usize {
        self.shared.release_all()
    }

    /// Same as [`release_all`](Self::release_all). Safe to call any number
    /// of times.
    pub fn dispose(&self) {
        self.shared.release_all();
    }

    fn load_with_callback<T, F, G>(
        &self,
        id: &str,
        request: Request,
        on_loaded: F,
        on_error: G,
        token: &CancelToken,
    ) where
        T: Any + Send + Sync,
        F: FnOnce(Arc<T>) + Send + 'static,
        G: FnOnce(LoadError) + Send + 'static,
    {
        let handle = self.shared.begin(id, request);

        let shared = self.shared.clone();
        let completed = handle.clone();
        let token = token.clone();
        let id: Arc<str> = id.into();

        handle.on_completed(Box::new(move |status| {
            if token.is_cancelled() {
                debug!(id = %id, "load cancelled");
                shared.release_handle(&id, &completed);
                return;
            }

            match shared.resolve::<T>(&id, request, &completed, status) {
                Ok((loaded, resource)) => {
                    let delivered = panic::catch_unwind(AssertUnwindSafe(|| on_loaded(resource)));
                    if let Err(payload) = delivered {
                        error!(id = %id, "success callback panicked");
                        shared.release_handle(&id, &completed);
                        panic::resume_unwind(payload);
                    }

                    shared.registry.add(id, completed, loaded);
                }
                Err(error) => {
                    error!(%error, "callback load failed");
                    on_error(error);
                }
            }
        }));
    }
}

impl<E: Engine> Shared<E> {
    fn begin(&self, id: &str, request: Request) -> E::Handle {
        let kind = request.load_kind();
        trace!(id, ?kind, "begin load");
        self.engine.begin_load(id, kind)
    }

    fn load_sync<T: Any + Send + Sync>(
        &self,
        id: &str,
        request: Request,
    ) -> Result<Arc<T>, LoadError> {
        let handle = self.begin(id, request);
        let timeout = self.config.sync_timeout();

        let status = match handle.wait(timeout) {
            Ok(status) => status,
            Err(WaitError::Timeout) => {
                warn!(id, ?timeout, "synchronous load timed out");
                self.release_handle(id, &handle);
                return Err(LoadError::Timeout {
                    id: id.into(),
                    after: timeout.unwrap_or_default(),
                });
            }
            Err(WaitError::Dropped) => {
                self.release_handle(id, &handle);
                return Err(LoadError::Unresolved { id: id.into() });
            }
        };

        let (loaded, resource) = self.resolve::<T>(id, request, &handle, status)?;
        self.registry.add(id.into(), handle, loaded);
        Ok(resource)
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn load_async<T: Any + Send + Sync>(
        &self,
        id: &str,
        request: Request,
        token: &CancelToken,
    ) -> Result<Option<Arc<T>>, LoadError> {
        let (handle, status) = match self.await_completion(id, request, token).await? {
            Some(completed) => completed,
            None => return Ok(None),
        };

        let (loaded, resource) = self.resolve::<T>(id, request, &handle, status)?;
        self.registry.add(id.into(), handle, loaded);
        Ok(Some(resource))
    }

    /// Issues the load and waits for it. A cancelled load is released here
    /// and reported as `Ok(None)`.
    async fn await_completion(
        &self,
        id: &str,
        request: Request,
        token: &CancelToken,
    ) -> Result<Option<(E::Handle, LoadStatus)>, LoadError> {
        let handle = self.begin(id, request);

        let wait = match self.config.await_mode {
            AwaitMode::Completion => match handle.completed().await {
                _ if token.is_cancelled() => Wait::Cancelled,
                Some(status) => Wait::Done(status),
                None => Wait::Dropped,
            },
            AwaitMode::Poll => self.poll(&handle, token).await,
        };

        match wait {
            Wait::Done(status) => Ok(Some((handle, status))),
            Wait::Cancelled => {
                debug!("load cancelled");
                self.release_handle(id, &handle);
                Ok(None)
            }
            Wait::Dropped => {
                self.release_handle(id, &handle);
                Err(LoadError::Unresolved { id: id.into() })
            }
        }
    }

    async fn poll(&self, handle: &E::Handle, token: &CancelToken) -> Wait {
        let interval = self.config.poll_interval();

        loop {
            if token.is_cancelled() {
                return Wait::Cancelled;
            }

            let status = handle.status();
            if status.is_done() {
                return Wait::Done(status);
            }

            match interval {
                Some(interval) => {
                    let _ = tokio::time::timeout(interval, token.cancelled()).await;
                }
                None => tokio::task::yield_now().await,
            }
        }
    }

    /// Returns the object to register and the object requested. They differ
    /// for components, which are registered through their prefab. Every
    /// error path releases the handle.
    fn resolve_object(
        &self,
        id: &str,
        request: Request,
        handle: &E::Handle,
        status: LoadStatus,
    ) -> Result<(Object, Object), LoadError> {
        let loaded = match (status, handle.result()) {
            (LoadStatus::Succeeded, Some(loaded)) => loaded,
            (LoadStatus::Failed, _) => {
                let reason = handle
                    .error()
                    .unwrap_or_else(|| String::from("engine reported a failure"));
                warn!(id, %reason, "load failed");
                self.release_handle(id, handle);
                return Err(LoadError::Failed {
                    id: id.into(),
                    reason,
                });
            }
            _ => {
                self.release_handle(id, handle);
                return Err(LoadError::Unresolved { id: id.into() });
            }
        };

        let resolved = match request.component_type() {
            None => loaded.clone(),
            Some(component) => match self.engine.get_component(&loaded, component) {
                Some(resolved) => resolved,
                None => {
                    self.release_handle(id, handle);
                    return Err(LoadError::MissingComponent {
                        id: id.into(),
                        component: component.name(),
                    });
                }
            },
        };

        Ok((loaded, resolved))
    }

    fn resolve<T: Any + Send + Sync>(
        &self,
        id: &str,
        request: Request,
        handle: &E::Handle,
        status: LoadStatus,
    ) -> Result<(Object, Arc<T>), LoadError> {
        let (loaded, resolved) = self.resolve_object(id, request, handle, status)?;

        match resolved.downcast::<T>() {
            Ok(resource) => Ok((loaded, resource)),
            Err(_) => {
                self.release_handle(id, handle);
                Err(LoadError::TypeMismatch {
                    id: id.into(),
                    expected: any::type_name::<T>(),
                })
            }
        }
    }

    fn release_handle(&self, id: &str, handle: &E::Handle) {
        trace!(id, "releasing handle");
        self.engine.release(handle);
    }

    fn release_matching(&self, target: ObjectAddr, component: Option<ResourceType>) -> usize {
        let engine = &*self.engine;
        let removed = self
            .registry
            .remove_matching(target, component, |object, ty| {
                engine.get_component(object, ty)
            });

        match removed {
            Some(entry) => {
                self.release_handle(&entry.id, &entry.handle);
                1
            }
            None => {
                trace!(?target, "released object is not registered");
                0
            }
        }
    }

    fn release_all(&self) -> usize {
        let entries = self.registry.remove_all();

        for entry in &entries {
            self.release_handle(&entry.id, &entry.handle);
        }

        if !entries.is_empty() {
            debug!(count = entries.len(), "released all resources");
        }

        entries.len()
    }
}

impl<E: Engine> Drop for Shared<E> {
    fn drop(&mut self) {
        if self.config.release_on_drop {
            self.release_all();
        }
    }
}

impl<E: Engine> Clone for ResourceLoader<E> {
    fn clone(&self) -> Self {
        ResourceLoader {
            shared: self.shared.clone(),
        }
    }
}

impl<E: Engine> Debug for ResourceLoader<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("registered", &self.shared.registry.len())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
