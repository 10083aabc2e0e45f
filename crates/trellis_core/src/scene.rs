//! Host scene-tree boundary.
//!
//! The composition runtime never owns component lifetime — the tree does.
//! [`SceneTree`] is a generation-checked slot arena: destroying a node bumps
//! its slot's generation, so every [`NodeId`] held elsewhere (registry
//! entries, dependency references) silently stops resolving instead of
//! dangling. Nodes carry a stable name, parent/child linkage, and an optional
//! attached [`NodeObject`] behind a `RefCell` — the runtime is
//! single-threaded and cooperative, so interior mutability is all the
//! synchronisation needed.

use std::cell::{Ref, RefCell, RefMut};

use serde::{Deserialize, Serialize};

use crate::object::NodeObject;

/// A weak, generation-checked handle to a node in a [`SceneTree`].
///
/// A `NodeId` never keeps its node alive. After the node is destroyed the
/// handle still compares and hashes normally, but every tree accessor
/// returns `None` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({}v{})", self.index, self.generation)
    }
}

/// A single tree node: stable name, linkage, and an optional attached object.
#[derive(Debug)]
pub struct Node {
    /// Stable identifier within the tree, assigned at spawn time.
    pub name: String,
    /// Parent node, `None` for roots.
    pub parent: Option<NodeId>,
    /// Children in attachment order.
    pub children: Vec<NodeId>,
    object: Option<RefCell<Box<dyn NodeObject>>>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// The tree arena. One per host "scene"; all composition state hangs off it.
#[derive(Debug, Default)]
pub struct SceneTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl SceneTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a root node (no parent).
    pub fn spawn_root(&mut self, name: impl Into<String>) -> NodeId {
        self.spawn(None, name)
    }

    /// Spawn a node as the last child of `parent`.
    ///
    /// Returns [`NodeId`] of the new node; the parent's child list records it
    /// in attachment order. A stale `parent` handle spawns nothing and the
    /// returned id is immediately dead — callers holding live parents never
    /// see this.
    pub fn spawn_child(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        self.spawn(Some(parent), name)
    }

    fn spawn(&mut self, parent: Option<NodeId>, name: impl Into<String>) -> NodeId {
        let node = Node {
            name: name.into(),
            parent,
            children: Vec::new(),
            object: None,
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        };

        if let Some(parent) = parent {
            match self.get_mut(parent) {
                Some(p) => p.children.push(id),
                None => {
                    // Parent died between handle acquisition and spawn; kill
                    // the orphan so the caller's handle is visibly dead.
                    self.destroy(id);
                }
            }
        }
        id
    }

    /// Destroy a node and its entire subtree.
    ///
    /// Every handle to a destroyed node becomes permanently unresolvable.
    /// Returns `true` if the node was alive.
    pub fn destroy(&mut self, id: NodeId) -> bool {
        let Some(node) = self.take(id) else {
            return false;
        };
        if let Some(parent) = node.parent {
            if let Some(p) = self.get_mut(parent) {
                p.children.retain(|&c| c != id);
            }
        }
        for child in node.children {
            self.destroy_subtree(child);
        }
        true
    }

    fn destroy_subtree(&mut self, id: NodeId) {
        if let Some(node) = self.take(id) {
            for child in node.children {
                self.destroy_subtree(child);
            }
        }
    }

    fn take(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation || slot.node.is_none() {
            return None;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        slot.node.take()
    }

    /// Returns `true` if the handle still resolves to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Resolve a handle to its node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// The node's stable name.
    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.get(id).map(|n| n.name.as_str())
    }

    /// The node's parent, if it has one and the node is alive.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// The node's children in attachment order; empty for dead handles.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Attach an object to a node, replacing any previous attachment.
    ///
    /// Returns `false` (and drops the object) if the handle is stale.
    pub fn attach(&mut self, id: NodeId, object: Box<dyn NodeObject>) -> bool {
        match self.get_mut(id) {
            Some(node) => {
                node.object = Some(RefCell::new(object));
                true
            }
            None => false,
        }
    }

    /// Returns `true` if the node is alive and carries an attached object.
    #[must_use]
    pub fn has_object(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| n.object.is_some())
    }

    /// Borrow a node's attached object.
    #[must_use]
    pub fn object(&self, id: NodeId) -> Option<Ref<'_, dyn NodeObject>> {
        let cell = self.get(id)?.object.as_ref()?;
        Some(Ref::map(cell.borrow(), |b| b.as_ref()))
    }

    /// Mutably borrow a node's attached object.
    #[must_use]
    pub fn object_mut(&self, id: NodeId) -> Option<RefMut<'_, dyn NodeObject>> {
        let cell = self.get(id)?.object.as_ref()?;
        Some(RefMut::map(cell.borrow_mut(), |b| b.as_mut()))
    }

    /// Collect every node in the subtree below `root` satisfying `predicate`.
    ///
    /// Traversal is depth-first, parent before children, siblings in
    /// attachment order. `root` itself is not visited. The walk is stateless
    /// and returns a complete collection; the host tree is acyclic by
    /// construction, so no cycle handling is needed.
    #[must_use]
    pub fn descendants_matching<F>(&self, root: NodeId, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&SceneTree, NodeId) -> bool,
    {
        let mut out = Vec::new();
        for &child in self.children(root) {
            self.walk(child, &predicate, &mut out);
        }
        out
    }

    fn walk<F>(&self, id: NodeId, predicate: &F, out: &mut Vec<NodeId>)
    where
        F: Fn(&SceneTree, NodeId) -> bool,
    {
        if predicate(self, id) {
            out.push(id);
        }
        for &child in self.children(id) {
            self.walk(child, predicate, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_and_linkage() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let a = tree.spawn_child(root, "A");
        let b = tree.spawn_child(root, "B");

        assert_eq!(tree.name(root), Some("Root"));
        assert_eq!(tree.parent(a), Some(root));
        assert_eq!(tree.children(root), &[a, b]);
    }

    #[test]
    fn test_destroy_invalidates_handle() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let a = tree.spawn_child(root, "A");

        assert!(tree.destroy(a));
        assert!(!tree.is_alive(a));
        assert!(tree.children(root).is_empty());
        // Destroying again is a no-op.
        assert!(!tree.destroy(a));
    }

    #[test]
    fn test_destroy_takes_subtree() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let a = tree.spawn_child(root, "A");
        let leaf = tree.spawn_child(a, "Leaf");

        tree.destroy(a);
        assert!(!tree.is_alive(leaf));
    }

    #[test]
    fn test_slot_reuse_does_not_resurrect_stale_handle() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let a = tree.spawn_child(root, "A");
        tree.destroy(a);

        let b = tree.spawn_child(root, "B");
        // The slot is reused but the old handle stays dead.
        assert!(tree.is_alive(b));
        assert!(!tree.is_alive(a));
        assert_ne!(a, b);
    }

    #[test]
    fn test_descendants_matching_is_preorder() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let a = tree.spawn_child(root, "A");
        let a1 = tree.spawn_child(a, "A1");
        let a2 = tree.spawn_child(a, "A2");
        let b = tree.spawn_child(root, "B");
        let b1 = tree.spawn_child(b, "B1");

        let all = tree.descendants_matching(root, |_, _| true);
        assert_eq!(all, vec![a, a1, a2, b, b1]);
    }

    #[test]
    fn test_descendants_matching_filters_but_still_recurses() {
        let mut tree = SceneTree::new();
        let root = tree.spawn_root("Root");
        let skip = tree.spawn_child(root, "skip");
        let keep = tree.spawn_child(skip, "keep");

        let found = tree.descendants_matching(root, |t, id| t.name(id) == Some("keep"));
        assert_eq!(found, vec![keep]);
    }
}
