//! Type-erased envelopes for keys and values crossing the scheduler boundary.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use crate::error::RuleError;

/// A cheaply clonable, type-erased key or value.
///
/// Unwrapping is validated at the boundary: asking for the wrong type yields
/// [`RuleError::KindMismatch`] instead of a panic.
#[derive(Clone)]
pub struct Dynamic {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Dynamic {
    /// Wraps a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    /// Name of the wrapped type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the envelope holds a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Borrows the wrapped value as a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Result<&T, RuleError> {
        self.inner
            .downcast_ref::<T>()
            .ok_or_else(|| RuleError::KindMismatch {
                expected: type_name::<T>().to_string(),
                got: self.type_name.to_string(),
            })
    }

    /// Clones the wrapped value out as a `T`.
    pub fn downcast<T: Any + Clone>(&self) -> Result<T, RuleError> {
        self.downcast_ref::<T>().cloned()
    }
}

impl fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dynamic({})", self.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_to_held_type() {
        let d = Dynamic::new(String::from("a.c"));
        assert!(d.is::<String>());
        assert_eq!(d.downcast_ref::<String>().unwrap(), "a.c");
        assert_eq!(d.clone().downcast::<String>().unwrap(), "a.c");
    }

    #[test]
    fn downcast_to_other_type_is_mismatch() {
        let d = Dynamic::new(7u32);
        match d.downcast_ref::<i64>() {
            Err(RuleError::KindMismatch { expected, got }) => {
                assert_eq!(expected, "i64");
                assert_eq!(got, "u32");
            }
            other => panic!("expected KindMismatch, got {other:?}"),
        }
    }

    #[test]
    fn debug_names_type() {
        assert_eq!(format!("{:?}", Dynamic::new(1u8)), "Dynamic(u8)");
    }
}
