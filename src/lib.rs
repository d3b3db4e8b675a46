//! policy-engine library crate
//!
//! A validation rule engine for Kubernetes admission policies. Given a
//! policy (a set of rules) and an admission event (old and new resource
//! plus actor metadata), the engine decides for each rule whether it
//! passes, fails, is skipped, or errors, and assembles a structured
//! response for the caller.
//!
//! The engine is synchronous and side-effect free apart from logging and
//! reads through the caller-provided [`ResourceCache`]. All resources and
//! patterns are untyped JSON documents.

pub mod engine;
pub mod policy;
pub mod resource;

pub use engine::context::Context;
pub use engine::loader::ResourceCache;
pub use engine::response::{EngineResponse, RuleResponse, RuleStatus};
pub use engine::{AdmissionInfo, Operation, PolicyContext, validate};
pub use policy::{Policy, PolicySpec, Rule};
