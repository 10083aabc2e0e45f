//! Per-entity component registry.
//!
//! Maps capability ids to ordered lists of weakly-held node handles. A
//! component is indexed under its exact type id and under every capability it
//! reports; the same node therefore appears under several keys. Entries never
//! extend component lifetime — a handle whose node the host destroyed simply
//! stops resolving, and lookups treat it as absent.
//!
//! Stale-entry policy: lookups scan a key's list for the first **live**
//! entry, pruning dead entries they walk past and dropping keys left empty.
//! (Observed source behavior pruned the whole bucket whenever the first
//! entry was stale; the strict-filter semantics here are a deliberate
//! correction, recorded in DESIGN.md.)

use std::cell::Ref;
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::capability::CapabilityId;
use crate::object::{Component, NodeObject};
use crate::scene::{NodeId, SceneTree};

/// Registry population/insertion errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The candidate node is dead, carries no object, or is an entity root.
    /// This is a programmer-error guard, not a recoverable runtime condition.
    #[error("node {0} is not a live component-bearing node")]
    NotAComponent(NodeId),
}

/// Returns `true` if the node carries a component object (an attached object
/// that is not an entity root).
#[must_use]
pub fn is_component(tree: &SceneTree, id: NodeId) -> bool {
    match tree.object(id) {
        Some(object) => object.as_entity().is_none(),
        None => false,
    }
}

/// Per-entity index from capability id to weakly-held component handles.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    entries: HashMap<CapabilityId, Vec<NodeId>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every component in the subtree below `root`.
    ///
    /// Runs the descendant search with the "carries a component object"
    /// predicate and inserts each match. Single-use per entity: callers gate
    /// on the entity's initialization flag, since re-population would
    /// duplicate nothing (per-key duplicate handles are skipped) but is
    /// wasted work. Returns the number of components indexed.
    pub fn populate(&mut self, tree: &SceneTree, root: NodeId) -> usize {
        let matches = tree.descendants_matching(root, is_component);
        let count = matches.len();
        for id in matches {
            // The predicate already vetted each node; a failure here would
            // mean the tree changed mid-walk, which the single-threaded
            // model rules out.
            let _ = self.insert(tree, id);
        }
        debug!(root = %root, count, "registry populated");
        count
    }

    /// Register a component node under its exact type id and every reported
    /// capability id.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotAComponent`] if the node is dead, has no attached
    /// object, or the object is an entity root.
    pub fn insert(&mut self, tree: &SceneTree, id: NodeId) -> Result<(), RegistryError> {
        let object = tree.object(id).ok_or(RegistryError::NotAComponent(id))?;
        if object.as_entity().is_some() {
            return Err(RegistryError::NotAComponent(id));
        }
        self.insert_object(id, &*object);
        Ok(())
    }

    /// Register from an already-borrowed object. Used for late attachment,
    /// where the component is held `&mut` by the caller and cannot be
    /// re-borrowed through the tree.
    pub(crate) fn insert_object(&mut self, id: NodeId, object: &dyn NodeObject) {
        self.insert_key(CapabilityId::from_name(object.type_name()), id);
        for &capability in object.capabilities() {
            if capability != CapabilityId::base() {
                self.insert_key(capability, id);
            }
        }
    }

    fn insert_key(&mut self, key: CapabilityId, id: NodeId) {
        let bucket = self.entries.entry(key).or_default();
        if !bucket.contains(&id) {
            bucket.push(id);
        }
    }

    /// First live entry under `key`, pruning dead entries walked past and
    /// removing the key once its list empties.
    pub fn lookup_by_capability(&mut self, tree: &SceneTree, key: CapabilityId) -> Option<NodeId> {
        let bucket = self.entries.get_mut(&key)?;
        while let Some(&first) = bucket.first() {
            if tree.is_alive(first) {
                return Some(first);
            }
            bucket.remove(0);
        }
        self.entries.remove(&key);
        None
    }

    /// First live entry under `T`'s exact type id, downcast to `T`.
    pub fn lookup<'a, T: Component>(&mut self, tree: &'a SceneTree) -> Option<Ref<'a, T>> {
        let id = self.lookup_by_capability(tree, T::component_id())?;
        downcast::<T>(tree, id)
    }

    /// First live entry under `T`'s type id whose node name equals `name`.
    pub fn lookup_by_name<'a, T: Component>(
        &mut self,
        tree: &'a SceneTree,
        name: &str,
    ) -> Option<Ref<'a, T>> {
        let key = T::component_id();
        let bucket = self.entries.get_mut(&key)?;
        bucket.retain(|&id| tree.is_alive(id));
        let found = bucket
            .iter()
            .copied()
            .find(|&id| tree.name(id) == Some(name));
        if bucket.is_empty() {
            self.entries.remove(&key);
        }
        downcast::<T>(tree, found?)
    }

    /// Read-only variant of [`ComponentRegistry::lookup_by_capability`]:
    /// skips dead entries without pruning. This is the lookup dependency
    /// resolution uses, since resolution must not mutate registry membership.
    #[must_use]
    pub fn first_live(&self, tree: &SceneTree, key: CapabilityId) -> Option<NodeId> {
        self.entries
            .get(&key)?
            .iter()
            .copied()
            .find(|&id| tree.is_alive(id))
    }

    /// Read-only scan for a live entry under `key` with the given node name.
    #[must_use]
    pub fn first_live_named(&self, tree: &SceneTree, key: CapabilityId, name: &str) -> Option<NodeId> {
        self.entries
            .get(&key)?
            .iter()
            .copied()
            .find(|&id| tree.is_alive(id) && tree.name(id) == Some(name))
    }

    /// Returns `true` if the node is registered under any key and alive.
    #[must_use]
    pub fn contains(&self, tree: &SceneTree, id: NodeId) -> bool {
        tree.is_alive(id) && self.entries.values().any(|bucket| bucket.contains(&id))
    }

    /// Remove a node from every key it is registered under, dropping keys
    /// left empty. Returns `true` if anything was removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let mut removed = false;
        self.entries.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|&entry| entry != id);
            removed |= bucket.len() != before;
            !bucket.is_empty()
        });
        removed
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of distinct live components currently indexed.
    #[must_use]
    pub fn len(&self, tree: &SceneTree) -> usize {
        self.iter(tree).count()
    }

    /// Returns `true` if no live component is indexed.
    #[must_use]
    pub fn is_empty(&self, tree: &SceneTree) -> bool {
        self.iter(tree).next().is_none()
    }

    /// Total registered key-slots, counting one per (key, node) pair.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Lazy enumeration of all live components, deduplicated by node
    /// identity: a component registered under its exact type and several
    /// capabilities is yielded once. Order across keys is unspecified.
    pub fn iter<'a>(&'a self, tree: &'a SceneTree) -> impl Iterator<Item = NodeId> + 'a {
        let mut seen = HashSet::new();
        self.entries
            .values()
            .flatten()
            .copied()
            .filter(move |&id| tree.is_alive(id) && seen.insert(id))
    }
}

fn downcast<T: Component>(tree: &SceneTree, id: NodeId) -> Option<Ref<'_, T>> {
    let object = tree.object(id)?;
    Ref::filter_map(object, |o| o.as_any().downcast_ref::<T>()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::BASE_CAPABILITY;

    struct Probe {
        tag: u32,
    }

    const I_PROBE: CapabilityId = CapabilityId::from_name("test.IProbe");

    impl NodeObject for Probe {
        fn type_name(&self) -> &'static str {
            "test.Probe"
        }

        fn capabilities(&self) -> &[CapabilityId] {
            &[I_PROBE]
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    impl Component for Probe {
        fn component_name() -> &'static str {
            "test.Probe"
        }
    }

    fn spawn_probe(tree: &mut SceneTree, parent: NodeId, name: &str, tag: u32) -> NodeId {
        let id = tree.spawn_child(parent, name);
        tree.attach(id, Box::new(Probe { tag }));
        id
    }

    #[test]
    fn test_insert_rejects_bare_node() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let bare = tree.spawn_child(root, "Bare");

        let mut registry = ComponentRegistry::new();
        assert!(matches!(
            registry.insert(&tree, bare),
            Err(RegistryError::NotAComponent(_))
        ));
    }

    #[test]
    fn test_insert_rejects_dead_handle() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let id = spawn_probe(&mut tree, root, "P", 0);
        tree.destroy(id);

        let mut registry = ComponentRegistry::new();
        assert!(registry.insert(&tree, id).is_err());
    }

    #[test]
    fn test_lookup_returns_inserted_component() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let id = spawn_probe(&mut tree, root, "P", 7);

        let mut registry = ComponentRegistry::new();
        registry.insert(&tree, id).unwrap();

        let probe = registry.lookup::<Probe>(&tree).unwrap();
        assert_eq!(probe.tag, 7);
        assert_eq!(registry.lookup_by_capability(&tree, Probe::component_id()), Some(id));
    }

    #[test]
    fn test_lookup_by_capability_interface() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let id = spawn_probe(&mut tree, root, "P", 0);

        let mut registry = ComponentRegistry::new();
        registry.insert(&tree, id).unwrap();

        assert_eq!(registry.lookup_by_capability(&tree, I_PROBE), Some(id));
        // The base capability is never a key.
        assert_eq!(
            registry.lookup_by_capability(&tree, CapabilityId::from_name(BASE_CAPABILITY)),
            None
        );
    }

    #[test]
    fn test_destroyed_node_is_absent_and_pruned() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let dead = spawn_probe(&mut tree, root, "Dead", 1);
        let live = spawn_probe(&mut tree, root, "Live", 2);

        let mut registry = ComponentRegistry::new();
        registry.insert(&tree, dead).unwrap();
        registry.insert(&tree, live).unwrap();
        tree.destroy(dead);

        // The dead entry is skipped, not faulted on, and gets pruned — but
        // only from the bucket the lookup walked.
        let found = registry.lookup_by_capability(&tree, Probe::component_id());
        assert_eq!(found, Some(live));
        assert_eq!(registry.entry_count(), 3);

        assert_eq!(registry.lookup_by_capability(&tree, I_PROBE), Some(live));
        assert_eq!(registry.entry_count(), 2);
    }

    #[test]
    fn test_lookup_on_fully_dead_key_removes_it() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let id = spawn_probe(&mut tree, root, "P", 0);

        let mut registry = ComponentRegistry::new();
        registry.insert(&tree, id).unwrap();
        tree.destroy(id);

        assert_eq!(registry.lookup_by_capability(&tree, Probe::component_id()), None);
        assert_eq!(registry.lookup_by_capability(&tree, I_PROBE), None);
        assert_eq!(registry.entry_count(), 0);
    }

    #[test]
    fn test_lookup_by_name() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let _first = spawn_probe(&mut tree, root, "First", 1);
        let _second = spawn_probe(&mut tree, root, "Second", 2);

        let mut registry = ComponentRegistry::new();
        registry.populate(&tree, root);

        let probe = registry.lookup_by_name::<Probe>(&tree, "Second").unwrap();
        assert_eq!(probe.tag, 2);
        assert!(registry.lookup_by_name::<Probe>(&tree, "Missing").is_none());
    }

    #[test]
    fn test_populate_indexes_full_subtree() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let holder = tree.spawn_child(root, "Holder");
        spawn_probe(&mut tree, holder, "Nested", 0);
        spawn_probe(&mut tree, root, "Direct", 1);

        let mut registry = ComponentRegistry::new();
        assert_eq!(registry.populate(&tree, root), 2);
        assert_eq!(registry.len(&tree), 2);
    }

    #[test]
    fn test_iter_deduplicates_multi_key_components() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let id = spawn_probe(&mut tree, root, "P", 0);

        let mut registry = ComponentRegistry::new();
        registry.insert(&tree, id).unwrap();

        // Registered under the exact type and IProbe, yielded once.
        assert_eq!(registry.entry_count(), 2);
        assert_eq!(registry.iter(&tree).collect::<Vec<_>>(), vec![id]);
    }

    #[test]
    fn test_remove_and_contains() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let id = spawn_probe(&mut tree, root, "P", 0);

        let mut registry = ComponentRegistry::new();
        registry.insert(&tree, id).unwrap();
        assert!(registry.contains(&tree, id));

        assert!(registry.remove(id));
        assert!(!registry.contains(&tree, id));
        assert_eq!(registry.entry_count(), 0);
        assert!(!registry.remove(id));
    }

    #[test]
    fn test_duplicate_insert_is_idempotent() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let id = spawn_probe(&mut tree, root, "P", 0);

        let mut registry = ComponentRegistry::new();
        registry.insert(&tree, id).unwrap();
        registry.insert(&tree, id).unwrap();
        assert_eq!(registry.entry_count(), 2);
    }

    #[test]
    fn test_clear() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let id = spawn_probe(&mut tree, root, "P", 0);

        let mut registry = ComponentRegistry::new();
        registry.insert(&tree, id).unwrap();
        registry.clear();
        assert!(registry.is_empty(&tree));
    }
}
