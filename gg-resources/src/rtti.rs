use std::any::{self, Any};
use std::fmt;
use std::hash::{self, Hash};

/// A type identifier that remembers the name of the type it was created from.
#[derive(Clone, Copy)]
pub struct ResourceType {
    id: any::TypeId,
    name: &'static str,
}

impl ResourceType {
    #[inline]
    pub fn of<T: 'static>() -> ResourceType {
        ResourceType {
            id: any::TypeId::of::<T>(),
            name: any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(self) -> any::TypeId {
        self.id
    }

    #[inline]
    pub fn name(self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn is<T: 'static>(self) -> bool {
        self.id == any::TypeId::of::<T>()
    }

    /// Checks the concrete type behind a type-erased value.
    pub fn matches(self, value: &(dyn Any + Send + Sync)) -> bool {
        Any::type_id(value) == self.id
    }
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceType({})", self.name)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl Eq for ResourceType {}

impl PartialEq for ResourceType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Hash for ResourceType {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl From<ResourceType> for any::TypeId {
    fn from(v: ResourceType) -> any::TypeId {
        v.id
    }
}
