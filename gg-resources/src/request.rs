use crate::engine::LoadKind;
use crate::rtti::ResourceType;
use crate::{Asset, Component};

/// What the caller wants back from a load.
///
/// The choice between loading an identifier directly and resolving a
/// component from the prefab it names is made here, once, before the engine
/// is involved.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Request {
    Asset(ResourceType),
    Component(ResourceType),
    /// The prefab object itself, as consumed by instantiation.
    Prefab,
}

impl Request {
    pub fn asset<A: Asset>() -> Request {
        Request::Asset(ResourceType::of::<A>())
    }

    pub fn component<C: Component>() -> Request {
        Request::Component(ResourceType::of::<C>())
    }

    pub fn load_kind(self) -> LoadKind {
        match self {
            Request::Asset(ty) => LoadKind::Asset(ty),
            Request::Component(_) | Request::Prefab => LoadKind::Prefab,
        }
    }

    pub fn component_type(self) -> Option<ResourceType> {
        match self {
            Request::Component(ty) => Some(ty),
            _ => None,
        }
    }
}
