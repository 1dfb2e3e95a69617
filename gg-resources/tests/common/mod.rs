#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gg_resources::{
    Asset, CompletionCallback, Component, Engine, HandleKind, LoadHandle, LoadKind, LoadStatus,
    Object, ResourceType,
};
use parking_lot::Mutex;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

#[derive(Debug)]
pub struct Texture {
    pub name: String,
}

impl Asset for Texture {}

#[derive(Debug)]
pub struct Sound;

impl Asset for Sound {}

#[derive(Debug)]
pub struct Brain {
    pub name: String,
}

impl Component for Brain {}

#[derive(Debug)]
pub struct Health(pub u32);

impl Component for Health {}

/// Something prefabs can be instantiated under.
pub struct Transform;

pub fn transform() -> Object {
    Arc::new(Transform)
}

/// Prefabs and their instances.
pub struct MockObject {
    pub name: String,
    pub parented: bool,
    components: Mutex<Vec<Object>>,
}

impl MockObject {
    pub fn component_count(&self) -> usize {
        self.components.lock().len()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Completion {
    /// Handles resolve inside `begin_load`.
    Immediate,
    /// Handles stay pending until the test completes them.
    Manual,
    /// Handles resolve shortly afterwards on a background thread.
    Threaded,
}

type AssetFactory = Arc<dyn Fn() -> Object + Send + Sync>;
type ComponentsFactory = Arc<dyn Fn() -> Vec<Object> + Send + Sync>;

pub struct MockEngine {
    completion: Mutex<Completion>,
    assets: Mutex<HashMap<String, AssetFactory>>,
    prefabs: Mutex<HashMap<String, ComponentsFactory>>,
    shared_prefabs: Mutex<HashMap<String, Object>>,
    issued: Mutex<Vec<MockHandle>>,
    instances: Mutex<Vec<Arc<MockObject>>>,
    serial: AtomicU64,
}

impl MockEngine {
    pub fn new(completion: Completion) -> Arc<MockEngine> {
        init_tracing();
        Arc::new(MockEngine {
            completion: Mutex::new(completion),
            assets: Mutex::new(HashMap::new()),
            prefabs: Mutex::new(HashMap::new()),
            shared_prefabs: Mutex::new(HashMap::new()),
            issued: Mutex::new(Vec::new()),
            instances: Mutex::new(Vec::new()),
            serial: AtomicU64::new(0),
        })
    }

    /// An engine knowing the `"logo"` texture, the `"click"` sound and the
    /// `"Enemy"` texture and prefab (with a `Brain` and a `Health`).
    pub fn with_content(completion: Completion) -> Arc<MockEngine> {
        let engine = MockEngine::new(completion);
        engine.add_asset("logo", || Texture {
            name: "logo".into(),
        });
        engine.add_asset("click", || Sound);
        engine.add_asset("Enemy", || Texture {
            name: "Enemy portrait".into(),
        });
        engine.add_prefab("Enemy", || {
            vec![
                Arc::new(Brain {
                    name: "Enemy".into(),
                }) as Object,
                Arc::new(Health(100)) as Object,
            ]
        });
        engine.add_prefab("Prop", || vec![Arc::new(Health(5)) as Object]);
        engine
    }

    pub fn set_completion(&self, completion: Completion) {
        *self.completion.lock() = completion;
    }

    pub fn add_asset<A, F>(&self, id: &str, make: F)
    where
        A: Asset,
        F: Fn() -> A + Send + Sync + 'static,
    {
        let factory: AssetFactory = Arc::new(move || Arc::new(make()) as Object);
        self.assets.lock().insert(id.to_owned(), factory);
    }

    /// Every load of `id` resolves to this same asset, the way a caching
    /// engine hands out one object per identifier.
    pub fn add_asset_shared<A: Asset>(&self, id: &str, asset: Arc<A>) {
        let asset: Object = asset;
        let factory: AssetFactory = Arc::new(move || asset.clone());
        self.assets.lock().insert(id.to_owned(), factory);
    }

    /// Every load of the prefab `id` resolves to one shared prefab object.
    pub fn add_prefab_shared(&self, id: &str, components: Vec<Object>) -> Object {
        let prefab: Object = Arc::new(MockObject {
            name: id.to_owned(),
            parented: false,
            components: Mutex::new(components),
        });
        self.shared_prefabs
            .lock()
            .insert(id.to_owned(), prefab.clone());
        prefab
    }

    pub fn add_prefab<F>(&self, id: &str, components: F)
    where
        F: Fn() -> Vec<Object> + Send + Sync + 'static,
    {
        self.prefabs.lock().insert(id.to_owned(), Arc::new(components));
    }

    pub fn issued(&self) -> Vec<MockHandle> {
        self.issued.lock().clone()
    }

    pub fn issued_len(&self) -> usize {
        self.issued.lock().len()
    }

    /// Resolves every pending handle, firing completion callbacks on the
    /// calling thread.
    pub fn complete_pending(&self) -> usize {
        let pending: Vec<_> = self
            .issued()
            .into_iter()
            .filter(|handle| handle.status() == LoadStatus::Pending)
            .collect();

        for handle in &pending {
            handle.complete();
        }

        pending.len()
    }

    pub fn release_counts(&self) -> Vec<usize> {
        self.issued().iter().map(MockHandle::releases).collect()
    }

    pub fn total_releases(&self) -> usize {
        self.release_counts().iter().sum()
    }

    pub fn instances(&self) -> Vec<Arc<MockObject>> {
        self.instances.lock().clone()
    }

    /// Destroys the components of a loaded object behind the loader's back.
    pub fn destroy_components(&self, object: &Object) {
        if let Some(object) = (**object).downcast_ref::<MockObject>() {
            object.components.lock().clear();
        }
    }

    fn outcome(&self, id: &str, kind: LoadKind) -> Result<Object, String> {
        match kind {
            LoadKind::Asset(_) => {
                let factory = self.assets.lock().get(id).cloned();
                factory
                    .map(|make| make())
                    .ok_or_else(|| format!("no asset named {}", id))
            }
            LoadKind::Prefab => {
                if let Some(prefab) = self.shared_prefabs.lock().get(id).cloned() {
                    return Ok(prefab);
                }

                let factory = self.prefabs.lock().get(id).cloned();
                factory
                    .map(|components| {
                        Arc::new(MockObject {
                            name: id.to_owned(),
                            parented: false,
                            components: Mutex::new(components()),
                        }) as Object
                    })
                    .ok_or_else(|| format!("no prefab named {}", id))
            }
        }
    }
}

impl Engine for MockEngine {
    type Handle = MockHandle;

    fn begin_load(&self, id: &str, kind: LoadKind) -> MockHandle {
        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let handle = MockHandle::new(serial, id, kind.handle_kind(), self.outcome(id, kind));
        self.issued.lock().push(handle.clone());

        let completion = *self.completion.lock();
        match completion {
            Completion::Immediate => handle.complete(),
            Completion::Manual => {}
            Completion::Threaded => {
                let handle = handle.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(5));
                    handle.complete();
                });
            }
        }

        handle
    }

    fn release(&self, handle: &MockHandle) {
        handle.inner.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn instantiate(&self, prefab: &Object, parent: Option<&Object>) -> Object {
        let name = match (**prefab).downcast_ref::<MockObject>() {
            Some(prefab) => prefab.name.clone(),
            None => String::from("unknown"),
        };

        let factory = self.prefabs.lock().get(&name).cloned();
        let components = factory.map(|components| components()).unwrap_or_default();

        let instance = Arc::new(MockObject {
            name,
            parented: parent.is_some(),
            components: Mutex::new(components),
        });

        self.instances.lock().push(instance.clone());
        instance
    }

    fn get_component(&self, object: &Object, component: ResourceType) -> Option<Object> {
        let object = (**object).downcast_ref::<MockObject>()?;
        let components = object.components.lock();
        components
            .iter()
            .find(|candidate| component.matches(&***candidate))
            .cloned()
    }

    fn is_attachment_point(&self, object: &Object) -> bool {
        (**object).is::<Transform>()
    }
}

#[derive(Clone)]
pub struct MockHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    serial: u64,
    id: String,
    kind: HandleKind,
    releases: AtomicUsize,
    state: Mutex<HandleState>,
}

struct HandleState {
    status: LoadStatus,
    outcome: Option<Result<Object, String>>,
    result: Option<Object>,
    error: Option<String>,
    callbacks: Vec<CompletionCallback>,
}

impl MockHandle {
    fn new(serial: u64, id: &str, kind: HandleKind, outcome: Result<Object, String>) -> MockHandle {
        MockHandle {
            inner: Arc::new(HandleInner {
                serial,
                id: id.to_owned(),
                kind,
                releases: AtomicUsize::new(0),
                state: Mutex::new(HandleState {
                    status: LoadStatus::Pending,
                    outcome: Some(outcome),
                    result: None,
                    error: None,
                    callbacks: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

    pub fn complete(&self) {
        let (status, callbacks) = {
            let mut state = self.inner.state.lock();
            let outcome = match state.outcome.take() {
                Some(outcome) => outcome,
                None => return,
            };

            match outcome {
                Ok(result) => {
                    state.status = LoadStatus::Succeeded;
                    state.result = Some(result);
                }
                Err(error) => {
                    state.status = LoadStatus::Failed;
                    state.error = Some(error);
                }
            }

            (state.status, std::mem::take(&mut state.callbacks))
        };

        for callback in callbacks {
            callback(status);
        }
    }

    /// Forgets every registered completion callback without firing it.
    pub fn drop_callbacks(&self) {
        let callbacks = std::mem::take(&mut self.inner.state.lock().callbacks);
        drop(callbacks);
    }

    pub fn callback_count(&self) -> usize {
        self.inner.state.lock().callbacks.len()
    }
}

impl LoadHandle for MockHandle {
    fn status(&self) -> LoadStatus {
        self.inner.state.lock().status
    }

    fn result(&self) -> Option<Object> {
        self.inner.state.lock().result.clone()
    }

    fn kind(&self) -> HandleKind {
        self.inner.kind
    }

    fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    fn on_completed(&self, callback: CompletionCallback) {
        let mut state = self.inner.state.lock();
        if state.status.is_done() {
            let status = state.status;
            drop(state);
            callback(status);
        } else {
            state.callbacks.push(callback);
        }
    }
}

impl Debug for MockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MockHandle({}, {})", self.inner.id, self.inner.serial)
    }
}

/// Yields until the engine has seen `count` loads.
pub async fn issued(engine: &MockEngine, count: usize) {
    while engine.issued_len() < count {
        tokio::task::yield_now().await;
    }
}
