//! Rule definition and dispatch for the Kiln incremental build engine.
//!
//! Build scripts describe, per artifact kind, how an artifact is probed and
//! compared (one [`BuiltinRuleHandler`] per kind) and which production
//! procedures apply to which keys (any number of user rules, combined with
//! [`priority`], [`alternatives`] and [`versioned`]). A [`RuleSet`] collects
//! these registrations; [`compile`] turns it into a [`RuleTable`] of
//! type-erased [`RuleInfo`] records that a scheduler drives without knowing
//! concrete key or value types.

#![warn(missing_docs)]

pub mod builtin;
pub mod codec;
pub mod compile;
pub mod dynamic;
pub mod error;
pub mod kind;
pub mod resolve;
pub mod rule_set;
pub mod user_rule;

pub use builtin::{BuiltinFn, BuiltinRuleHandler, Equality};
pub use compile::{compile, compile_with, CompiledRules, RuleInfo, RuleTable};
pub use dynamic::Dynamic;
pub use error::{BoxError, RuleError};
pub use kind::{ArtifactKind, RuleKey, RuleValue, ValueKind};
pub use resolve::{apply, Resolve};
pub use rule_set::{
    action, alternatives, priority, versioned, without_actions, Action, BoxedAction, RuleSet,
    UserFn,
};
pub use user_rule::{compare_priority, produce, RuleMatch, UserRule, UserRules, DEFAULT_PRIORITY};
