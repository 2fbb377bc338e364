//! Shared foundational types used across the Kiln build engine.
//!
//! This crate provides content hashing for stable cache keys and the common
//! internal result type.

#![warn(missing_docs)]

pub mod hash;
pub mod result;

pub use hash::ContentHash;
pub use result::{InternalError, KilnResult};
