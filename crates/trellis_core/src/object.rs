//! The contract between tree nodes and the composition runtime.
//!
//! Anything attached to a [`SceneTree`](crate::scene::SceneTree) node — a
//! component or an entity root — implements [`NodeObject`]. The trait is
//! object-safe; capability membership is reported once at insertion time
//! rather than probed per lookup, which is what lets the registry index a
//! component under every interface it implements without any runtime
//! reflection.
//!
//! [`Component`] adds the static naming needed for typed lookup
//! (`get_component::<T>()`); it is implemented by generated component types
//! and by hand-written ones alike.

use std::any::Any;

use crate::capability::CapabilityId;
use crate::entity::{Entity, ResolveContext};

/// Behavior attached to a tree node.
///
/// Most hooks default to no-ops so plain data objects stay trivial; generated
/// component code overrides exactly the hooks its declaration calls for.
pub trait NodeObject: Any {
    /// Qualified type name, e.g. `"game.actors.HealthRegen"`. Doubles as the
    /// exact-type registry key via [`CapabilityId::from_name`].
    fn type_name(&self) -> &'static str;

    /// Capability ids this object is indexed under, excluding the base
    /// component capability. Computed once per type, reported at insertion.
    fn capabilities(&self) -> &[CapabilityId] {
        &[]
    }

    /// Set a named property from a dynamic value. Returns `false` when the
    /// property is unknown or the value does not convert.
    ///
    /// Used by the deferred-write flush, which only has a property name and
    /// a value at hand.
    fn set_property(&mut self, _property: &str, _value: &serde_json::Value) -> bool {
        false
    }

    /// Assign dependency references by looking up sibling capabilities.
    ///
    /// Resolution must only read registry membership, never change it; a
    /// missing dependency leaves the corresponding reference unset.
    fn resolve_dependencies(&mut self, _deps: &ResolveContext<'_>) {}

    /// Fired once per component after its entity finishes initializing.
    fn entity_ready(&mut self) {}

    /// Downcast access to an entity root, `None` for components.
    fn as_entity(&self) -> Option<&Entity> {
        None
    }

    /// Mutable counterpart of [`NodeObject::as_entity`].
    fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        None
    }

    /// Upcast for exact-type downcasting in typed lookups.
    fn as_any(&self) -> &dyn Any;

    /// Mutable counterpart of [`NodeObject::as_any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl std::fmt::Debug for dyn NodeObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeObject({})", self.type_name())
    }
}

/// A statically-named component type, usable as a typed lookup key.
pub trait Component: NodeObject {
    /// The qualified type name, statically.
    fn component_name() -> &'static str;

    /// The exact-type registry key for this component type.
    #[must_use]
    fn component_id() -> CapabilityId {
        CapabilityId::from_name(Self::component_name())
    }
}
