mod cancel;
mod config;
mod engine;
mod error;
mod loader;
mod registry;
mod request;
mod rtti;

pub use self::cancel::CancelToken;
pub use self::config::{AwaitMode, LoaderConfig};
pub use self::engine::{
    CompletionCallback, Engine, HandleKind, LoadHandle, LoadKind, LoadStatus, Object, ObjectAddr,
    WaitError,
};
pub use self::error::LoadError;
pub use self::loader::ResourceLoader;
pub use self::registry::{Entry, EntryId, HandleRegistry};
pub use self::request::Request;
pub use self::rtti::ResourceType;

/// A type the engine loads directly from an identifier.
pub trait Asset: Send + Sync + 'static {}

/// A type resolved from the prefab an identifier names.
pub trait Component: Send + Sync + 'static {}
