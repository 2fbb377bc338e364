//! Forward slots: serialized identities and results of forwarded computations.

use std::any::type_name;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use kiln_rules::{codec, RuleKey};

use crate::error::ForwardError;

/// A type-tagged, serialized value.
///
/// Used both as the key of a forwarded computation (built from its
/// identity) and as its result. Equality is structural over all three
/// fields; the wire form is the three fields in order.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForwardSlot {
    type_name: String,
    display: String,
    payload: Vec<u8>,
}

impl RuleKey for ForwardSlot {
    type Value = ForwardSlot;
}

impl ForwardSlot {
    /// The slot naming a computation by `identity`.
    pub fn for_identity<I: Serialize + fmt::Debug>(identity: &I) -> Result<Self, ForwardError> {
        Self::encode(identity)
    }

    /// The slot carrying a computation's result.
    pub fn for_value<V: Serialize + fmt::Debug>(value: &V) -> Result<Self, ForwardError> {
        Self::encode(value)
    }

    fn encode<T: Serialize + fmt::Debug>(value: &T) -> Result<Self, ForwardError> {
        let payload = codec::encode(value).map_err(|e| ForwardError::Serialization {
            reason: e.to_string(),
        })?;
        Ok(Self {
            type_name: type_name::<T>().to_string(),
            display: format!("{value:?}"),
            payload,
        })
    }

    /// Decodes the payload as a `T`.
    ///
    /// Fails with [`ForwardError::ForwardSlotTypeMismatch`] if the slot was
    /// not built from a `T`, whatever the payload bytes would decode to.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ForwardError> {
        let expected = type_name::<T>();
        if self.type_name != expected {
            return Err(ForwardError::ForwardSlotTypeMismatch {
                expected: expected.to_string(),
                got: self.type_name.clone(),
            });
        }
        codec::decode(&self.payload).map_err(|e| ForwardError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Name of the type the slot was built from.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Debug rendering of the value the slot was built from.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// The encoded value.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl fmt::Display for ForwardSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl fmt::Debug for ForwardSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForwardSlot({}: {})", self.type_name, self.display)
    }
}
