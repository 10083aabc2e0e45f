//! Entity roots and the dependency-resolution protocol.
//!
//! An [`Entity`] is the composition root of a subtree: it owns the component
//! registry, the initialization flag, and the deferred-write queue. The
//! protocol runs in strict phases inside [`Entity::initialize`]:
//!
//! 1. **populate** — index every component in the subtree,
//! 2. **resolve** — let each component acquire sibling references,
//! 3. **flush** — apply property writes queued before initialization,
//! 4. **flag** — mark the entity initialized,
//! 5. **notify** — fire each component's ready hook.
//!
//! Population completes fully before any resolution starts, so resolution is
//! independent of sibling attachment order. `initialize` is idempotent:
//! second and later calls return immediately.

use std::cell::Ref;

use tracing::{debug, warn};

use crate::capability::CapabilityId;
use crate::object::{Component, NodeObject};
use crate::registry::ComponentRegistry;
use crate::scene::{NodeId, SceneTree};

/// A property assignment queued for application once the entity finishes
/// initializing. Consumed exactly once, then discarded.
#[derive(Debug, Clone)]
pub struct DeferredWrite {
    /// Registry key of the target component type.
    pub target: CapabilityId,
    /// Property name understood by the target's property dispatch.
    pub property: String,
    /// Dynamic value to assign.
    pub value: serde_json::Value,
}

/// Read-only view handed to each component during dependency resolution.
///
/// Lookups skip destroyed entries without pruning: resolution only reads
/// registry membership, never changes it.
pub struct ResolveContext<'a> {
    tree: &'a SceneTree,
    registry: &'a ComponentRegistry,
}

impl<'a> ResolveContext<'a> {
    /// First live component registered under the capability, if any.
    #[must_use]
    pub fn capability(&self, key: CapabilityId) -> Option<NodeId> {
        self.registry.first_live(self.tree, key)
    }

    /// First live component under the capability with the given node name.
    #[must_use]
    pub fn capability_named(&self, key: CapabilityId, name: &str) -> Option<NodeId> {
        self.registry.first_live_named(self.tree, key, name)
    }

    /// The tree the entity lives in.
    #[must_use]
    pub fn tree(&self) -> &'a SceneTree {
        self.tree
    }
}

/// Composition root state: registry, initialization flag, deferred writes.
///
/// Lives exactly as long as its entity. Generated entity types embed an
/// `Entity` and delegate to it; a bare `Entity` can also be attached to a
/// node directly.
#[derive(Debug)]
pub struct Entity {
    node: NodeId,
    registry: ComponentRegistry,
    initialized: bool,
    deferred: Vec<DeferredWrite>,
}

impl Entity {
    /// Create the composition root for the given tree node. The registry
    /// stays empty until [`Entity::initialize`] populates it.
    #[must_use]
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            registry: ComponentRegistry::new(),
            initialized: false,
            deferred: Vec::new(),
        }
    }

    /// The entity's root node.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Returns `true` once [`Entity::initialize`] has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The entity's component registry.
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Run the initialization protocol: populate, resolve, flush deferred
    /// writes, set the flag, notify ready.
    ///
    /// Idempotent — safe to invoke from both the host lifecycle hook and
    /// programmatic callers; second and later calls are no-ops.
    pub fn initialize(&mut self, tree: &SceneTree) {
        if self.initialized {
            debug!(node = %self.node, "entity already initialized, skipping");
            return;
        }

        let populated = self.registry.populate(tree, self.node);
        self.resolve_all(tree);
        self.flush_deferred(tree);
        self.initialized = true;
        self.notify_ready(tree);
        debug!(node = %self.node, components = populated, "entity initialized");
    }

    /// Invoke every registered component's resolution routine.
    ///
    /// Order across components is unspecified and must not be relied upon:
    /// resolution reads registry membership but never mutates it, so no
    /// component can observe a partially-populated registry.
    pub fn resolve_all(&self, tree: &SceneTree) {
        let ctx = ResolveContext {
            tree,
            registry: &self.registry,
        };
        for id in self.registry.iter(tree) {
            if let Some(mut object) = tree.object_mut(id) {
                object.resolve_dependencies(&ctx);
            }
        }
    }

    fn flush_deferred(&mut self, tree: &SceneTree) {
        for write in std::mem::take(&mut self.deferred) {
            self.apply_write(tree, &write);
        }
    }

    fn apply_write(&mut self, tree: &SceneTree, write: &DeferredWrite) {
        let Some(id) = self.registry.lookup_by_capability(tree, write.target) else {
            warn!(property = %write.property, "deferred write target not registered");
            return;
        };
        let applied = tree
            .object_mut(id)
            .is_some_and(|mut object| object.set_property(&write.property, &write.value));
        if !applied {
            warn!(node = %id, property = %write.property, "deferred write rejected");
        }
    }

    fn notify_ready(&self, tree: &SceneTree) {
        for id in self.registry.iter(tree) {
            if let Some(mut object) = tree.object_mut(id) {
                object.entity_ready();
            }
        }
    }

    /// Returns `true` if a live component is registered under `T`'s type.
    #[must_use]
    pub fn has_component<T: Component>(&self, tree: &SceneTree) -> bool {
        self.registry.first_live(tree, T::component_id()).is_some()
    }

    /// Typed lookup of the first live component of exact type `T`.
    pub fn get_component<'a, T: Component>(&mut self, tree: &'a SceneTree) -> Option<Ref<'a, T>> {
        self.registry.lookup::<T>(tree)
    }

    /// Typed lookup of the first live `T` whose node name equals `name`.
    pub fn get_component_by_name<'a, T: Component>(
        &mut self,
        tree: &'a SceneTree,
        name: &str,
    ) -> Option<Ref<'a, T>> {
        self.registry.lookup_by_name::<T>(tree, name)
    }

    /// Lazy enumeration of all live components, deduplicated by identity.
    pub fn components<'a>(&'a self, tree: &'a SceneTree) -> impl Iterator<Item = NodeId> + 'a {
        self.registry.iter(tree)
    }

    /// Queue a property write against the first component of type `T`.
    ///
    /// Before initialization the write is queued and applied during the
    /// flush phase; afterwards it is applied immediately.
    pub fn queue_deferred_write<T: Component>(
        &mut self,
        tree: &SceneTree,
        property: impl Into<String>,
        value: serde_json::Value,
    ) {
        self.queue_deferred_write_for(tree, T::component_id(), property, value);
    }

    /// Capability-id variant of [`Entity::queue_deferred_write`], for callers
    /// that only have a runtime type value at hand.
    pub fn queue_deferred_write_for(
        &mut self,
        tree: &SceneTree,
        target: CapabilityId,
        property: impl Into<String>,
        value: serde_json::Value,
    ) {
        let write = DeferredWrite {
            target,
            property: property.into(),
            value,
        };
        if self.initialized {
            self.apply_write(tree, &write);
        } else {
            self.deferred.push(write);
        }
    }

    /// Number of writes still queued.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.deferred.len()
    }

    /// Register a component attached after this entity's subtree was
    /// populated.
    ///
    /// The component is passed `&mut` because late attachment runs from the
    /// component's own initialization routine, where it is already borrowed
    /// out of the tree. If the entity has already initialized, the component
    /// is resolved and notified immediately.
    pub fn attach_component(&mut self, tree: &SceneTree, id: NodeId, object: &mut dyn NodeObject) {
        self.registry.insert_object(id, object);
        if self.initialized {
            let ctx = ResolveContext {
                tree,
                registry: &self.registry,
            };
            object.resolve_dependencies(&ctx);
            object.entity_ready();
            debug!(node = %id, "late-attached component resolved");
        }
    }
}

impl NodeObject for Entity {
    fn type_name(&self) -> &'static str {
        "trellis.Entity"
    }

    fn as_entity(&self) -> Option<&Entity> {
        Some(self)
    }

    fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        Some(self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Nearest ancestor node carrying an entity root, walking parent links
/// upward from (and excluding) `node`.
#[must_use]
pub fn owning_entity(tree: &SceneTree, node: NodeId) -> Option<NodeId> {
    let mut current = tree.parent(node);
    while let Some(id) = current {
        let is_entity = tree
            .object(id)
            .is_some_and(|object| object.as_entity().is_some());
        if is_entity {
            return Some(id);
        }
        current = tree.parent(id);
    }
    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const I_HEALTH: CapabilityId = CapabilityId::from_name("test.IHealth");

    struct Health {
        value: f64,
        ready_count: u32,
    }

    impl Health {
        fn new() -> Self {
            Self {
                value: 100.0,
                ready_count: 0,
            }
        }
    }

    impl NodeObject for Health {
        fn type_name(&self) -> &'static str {
            "test.Health"
        }

        fn capabilities(&self) -> &[CapabilityId] {
            &[I_HEALTH]
        }

        fn set_property(&mut self, property: &str, value: &serde_json::Value) -> bool {
            match property {
                "value" => match value.as_f64() {
                    Some(v) => {
                        self.value = v;
                        true
                    }
                    None => false,
                },
                _ => false,
            }
        }

        fn entity_ready(&mut self) {
            self.ready_count += 1;
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    impl Component for Health {
        fn component_name() -> &'static str {
            "test.Health"
        }
    }

    struct Regen {
        health: Option<NodeId>,
        resolve_count: u32,
        ready_count: u32,
    }

    impl Regen {
        fn new() -> Self {
            Self {
                health: None,
                resolve_count: 0,
                ready_count: 0,
            }
        }
    }

    impl NodeObject for Regen {
        fn type_name(&self) -> &'static str {
            "test.Regen"
        }

        fn resolve_dependencies(&mut self, deps: &ResolveContext<'_>) {
            self.health = deps.capability(I_HEALTH);
            self.resolve_count += 1;
        }

        fn entity_ready(&mut self) {
            self.ready_count += 1;
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    impl Component for Regen {
        fn component_name() -> &'static str {
            "test.Regen"
        }
    }

    /// Entity subtree with Regen attached *before* Health, to prove that
    /// resolution does not depend on sibling insertion order.
    fn build_scene() -> (SceneTree, NodeId, NodeId, NodeId) {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Actor");
        let regen = tree.spawn_child(root, "Regen");
        tree.attach(regen, Box::new(Regen::new()));
        let health = tree.spawn_child(root, "Health");
        tree.attach(health, Box::new(Health::new()));
        (tree, root, regen, health)
    }

    #[test]
    fn test_initialize_resolves_regardless_of_sibling_order() {
        let (tree, root, _regen, health) = build_scene();
        let mut entity = Entity::new(root);
        entity.initialize(&tree);

        let regen = entity.get_component::<Regen>(&tree).unwrap();
        assert_eq!(regen.health, Some(health));
    }

    #[test]
    fn test_ready_fires_once_per_component_after_resolution() {
        let (tree, root, _, _) = build_scene();
        let mut entity = Entity::new(root);
        entity.initialize(&tree);

        assert_eq!(entity.get_component::<Health>(&tree).unwrap().ready_count, 1);
        let regen = entity.get_component::<Regen>(&tree).unwrap();
        assert_eq!(regen.ready_count, 1);
        // Resolution completed before the notification fired.
        assert!(regen.health.is_some());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (tree, root, _, _) = build_scene();
        let mut entity = Entity::new(root);
        entity.initialize(&tree);
        let entries = entity.registry().entry_count();

        entity.initialize(&tree);

        assert_eq!(entity.registry().entry_count(), entries);
        let regen = entity.get_component::<Regen>(&tree).unwrap();
        assert_eq!(regen.resolve_count, 1);
        assert_eq!(regen.ready_count, 1);
    }

    #[test]
    fn test_missing_dependency_degrades_silently() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Actor");
        let regen = tree.spawn_child(root, "Regen");
        tree.attach(regen, Box::new(Regen::new()));

        let mut entity = Entity::new(root);
        entity.initialize(&tree);

        let regen = entity.get_component::<Regen>(&tree).unwrap();
        assert_eq!(regen.resolve_count, 1);
        assert_eq!(regen.health, None);
    }

    #[test]
    fn test_deferred_write_applied_once_at_initialize() {
        let (tree, root, _, _) = build_scene();
        let mut entity = Entity::new(root);
        entity.queue_deferred_write::<Health>(&tree, "value", json!(20.0));
        assert_eq!(entity.pending_writes(), 1);

        entity.initialize(&tree);

        assert_eq!(entity.pending_writes(), 0);
        let health = entity.get_component::<Health>(&tree).unwrap();
        assert!((health.value - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_write_after_initialize_applies_immediately() {
        let (tree, root, _, _) = build_scene();
        let mut entity = Entity::new(root);
        entity.initialize(&tree);

        entity.queue_deferred_write::<Health>(&tree, "value", json!(55.0));

        assert_eq!(entity.pending_writes(), 0);
        let health = entity.get_component::<Health>(&tree).unwrap();
        assert!((health.value - 55.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_destroyed_component_yields_no_result() {
        let (mut tree, root, _, health) = build_scene();
        let mut entity = Entity::new(root);
        entity.initialize(&tree);

        tree.destroy(health);

        assert!(entity.get_component::<Health>(&tree).is_none());
        assert!(!entity.has_component::<Health>(&tree));
    }

    #[test]
    fn test_owning_entity_walks_to_nearest_root() {
        let (mut tree, root, regen, _) = build_scene();
        tree.attach(root, Box::new(Entity::new(root)));

        assert_eq!(owning_entity(&tree, regen), Some(root));
        assert_eq!(owning_entity(&tree, root), None);
    }

    #[test]
    fn test_late_attach_resolves_and_notifies() {
        let (mut tree, root, _, health) = build_scene();
        tree.attach(root, Box::new(Entity::new(root)));
        {
            let mut object = tree.object_mut(root).unwrap();
            object.as_entity_mut().unwrap().initialize(&tree);
        }

        let late = tree.spawn_child(root, "LateRegen");
        tree.attach(late, Box::new(Regen::new()));
        {
            let mut component = tree.object_mut(late).unwrap();
            let mut entity = tree.object_mut(root).unwrap();
            entity
                .as_entity_mut()
                .unwrap()
                .attach_component(&tree, late, &mut *component);
        }

        let object = tree.object(late).unwrap();
        let regen = object.as_any().downcast_ref::<Regen>().unwrap();
        assert_eq!(regen.health, Some(health));
        assert_eq!(regen.ready_count, 1);
    }

    #[test]
    fn test_components_enumerates_each_once() {
        let (tree, root, regen, health) = build_scene();
        let mut entity = Entity::new(root);
        entity.initialize(&tree);

        let mut ids: Vec<NodeId> = entity.components(&tree).collect();
        ids.sort();
        let mut expected = vec![regen, health];
        expected.sort();
        assert_eq!(ids, expected);
    }
}
