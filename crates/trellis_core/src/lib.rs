//! # trellis_core
//!
//! Runtime half of the trellis composition toolkit: a per-entity component
//! registry and the phased dependency-resolution protocol, built over a
//! weakly-referencing scene-tree boundary.
//!
//! This crate provides:
//!
//! - [`SceneTree`] / [`NodeId`] — generation-checked tree arena (the host
//!   boundary) with depth-first descendant search.
//! - [`NodeObject`] / [`Component`] — the contract attached objects satisfy.
//! - [`CapabilityId`] — FNV-1a derived registry keys for exact types and
//!   capability interfaces.
//! - [`ComponentRegistry`] — per-entity type-to-component index over weak
//!   handles.
//! - [`Entity`] — composition root driving populate → resolve → flush →
//!   flag → notify.
//!
//! Generated sources produced by `trellis_gen` call into this API; nothing
//! here depends on code generation.

pub mod capability;
pub mod entity;
pub mod object;
pub mod registry;
pub mod scene;

pub use capability::{CapabilityId, BASE_CAPABILITY};
pub use entity::{owning_entity, DeferredWrite, Entity, ResolveContext};
pub use object::{Component, NodeObject};
pub use registry::{is_component, ComponentRegistry, RegistryError};
pub use scene::{Node, NodeId, SceneTree};
