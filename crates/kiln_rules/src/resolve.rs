//! The scheduler seam.
//!
//! Build code asks for artifacts through [`Resolve`]; the scheduler behind it
//! decides whether to reuse a stored value or run the kind's compiled rule.

use crate::dynamic::Dynamic;
use crate::error::BoxError;
use crate::kind::{ArtifactKind, RuleKey};

/// Resolves keys of any compiled artifact kind to their current values.
pub trait Resolve: Send + Sync {
    /// Returns the up-to-date value of `key`, which must hold a key of `kind`.
    fn resolve(&self, kind: ArtifactKind, key: Dynamic) -> Result<Dynamic, BoxError>;
}

/// Resolves a typed key through `scheduler`.
pub fn apply<K: RuleKey>(
    scheduler: &(impl Resolve + ?Sized),
    key: K,
) -> Result<K::Value, BoxError> {
    let value = scheduler.resolve(ArtifactKind::of::<K>(), Dynamic::new(key))?;
    Ok(value.downcast::<K::Value>()?)
}
