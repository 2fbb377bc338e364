//! Type-indexed identities for artifact kinds.
//!
//! An artifact kind is a (key type, value type) pair. Rules and handlers for
//! heterogeneous kinds live in one registry keyed by [`ArtifactKind`], which
//! carries the runtime type identities of both halves of the pair.

use std::any::{type_name, TypeId};
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// The observable state of an artifact.
///
/// Implemented for every type meeting the bounds.
pub trait RuleValue:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> RuleValue for T where
    T: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Identifies one artifact instance within its kind.
///
/// The associated `Value` fixes the kind's value type, so a key type alone
/// determines the artifact kind.
pub trait RuleKey:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The state type produced for keys of this type.
    type Value: RuleValue;
}

/// Runtime identity of a (key type, value type) pair.
///
/// Equality and hashing consider only the type identities; the names are
/// kept for messages.
#[derive(Clone, Copy)]
pub struct ArtifactKind {
    key: TypeId,
    value: TypeId,
    key_name: &'static str,
    value_name: &'static str,
}

impl ArtifactKind {
    /// Returns the artifact kind of key type `K`.
    pub fn of<K: RuleKey>() -> Self {
        Self {
            key: TypeId::of::<K>(),
            value: TypeId::of::<K::Value>(),
            key_name: type_name::<K>(),
            value_name: type_name::<K::Value>(),
        }
    }

    /// Returns `true` if this is the kind of key type `K`.
    pub fn is<K: RuleKey>(&self) -> bool {
        *self == Self::of::<K>()
    }

    /// Fully qualified name of the key type.
    pub fn key_name(&self) -> &'static str {
        self.key_name
    }

    /// Fully qualified name of the value type.
    pub fn value_name(&self) -> &'static str {
        self.value_name
    }

    /// The value half of this kind.
    pub fn value_kind(&self) -> ValueKind {
        ValueKind {
            id: self.value,
            name: self.value_name,
        }
    }
}

impl PartialEq for ArtifactKind {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value
    }
}

impl Eq for ArtifactKind {}

impl Hash for ArtifactKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.value.hash(state);
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.key_name, self.value_name)
    }
}

impl Debug for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactKind({self})")
    }
}

/// Runtime tag of a value type, as reported by a compiled rule.
#[derive(Clone, Copy)]
pub struct ValueKind {
    id: TypeId,
    name: &'static str,
}

impl ValueKind {
    /// Returns the tag of type `V`.
    pub fn of<V: RuleValue>() -> Self {
        Self {
            id: TypeId::of::<V>(),
            name: type_name::<V>(),
        }
    }

    /// Fully qualified name of the value type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if this tags type `V`.
    pub fn is<V: RuleValue>(&self) -> bool {
        self.id == TypeId::of::<V>()
    }
}

impl PartialEq for ValueKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ValueKind {}

impl Hash for ValueKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueKind({})", self.name)
    }
}
