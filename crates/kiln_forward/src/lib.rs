//! Forward caching of imperative computations.
//!
//! A build script can memoize a computation by naming it with an identity
//! value instead of writing a rule. The computation is parked in a
//! process-wide [`ForwardRegistry`] under a [`ForwardSlot`] derived from the
//! identity, and the scheduler is asked to build that slot like any other
//! artifact. The slot kind's only user rule takes the parked computation and
//! runs it, so the scheduler's usual memoization applies.

#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod forward;
pub mod registry;
pub mod slot;

pub use command::{command_key, CommandKey, CommandLine};
pub use error::ForwardError;
pub use forward::{cache, cache_action, forward_rules, ForwardCache, ForwardHandler};
pub use registry::{Computation, ForwardRegistry, Registration};
pub use slot::ForwardSlot;
