//! Semantic type graph over declared types.
//!
//! The analyzer recovers type relationships from syntax and records them
//! here as resolved edges, so inheritance questions become pure key walks.
//! Generic definitions are normalized: a [`TypeKey`] is a qualified name
//! plus an arity, which makes `Container<Foo>` and the open form
//! `Container<T>` the same key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use trellis_schema::TypeRef;

/// Normalized identity of a declared type: qualified name + generic arity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeKey {
    /// Dotted qualified name, e.g. `"game.shared.IHealthProvider"`.
    pub qualified: String,
    /// Number of generic parameters/arguments.
    pub arity: usize,
}

impl TypeKey {
    pub fn new(qualified: impl Into<String>, arity: usize) -> Self {
        Self {
            qualified: qualified.into(),
            arity,
        }
    }

    /// The bare type name (last segment of the qualified name).
    pub fn name(&self) -> &str {
        self.qualified.rsplit('.').next().unwrap_or("")
    }

    /// The namespace segments (everything before the name).
    pub fn namespace_path(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self.qualified.split('.').collect();
        segments.pop();
        segments
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.qualified)
    }
}

/// What kind of declaration a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Class,
    Interface,
}

/// One declared type with its resolved inheritance edges.
///
/// Bases that do not resolve to any declared type (host engine classes like
/// `Node`) are external: they end the inheritance walk and carry no edges.
#[derive(Debug, Clone)]
pub struct TypeNode {
    pub key: TypeKey,
    pub kind: TypeKind,
    /// Resolved base class, classes only.
    pub base: Option<TypeKey>,
    /// Resolved implemented interfaces (classes) or extended interfaces
    /// (interfaces).
    pub interfaces: Vec<TypeKey>,
}

/// All declared types, keyed by normalized identity.
#[derive(Debug, Clone, Default)]
pub struct TypeGraph {
    types: HashMap<TypeKey, TypeNode>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a type. Returns `false` (leaving the existing entry) when the
    /// key is already declared — the caller reports the duplicate.
    pub fn insert(&mut self, node: TypeNode) -> bool {
        if self.types.contains_key(&node.key) {
            return false;
        }
        self.types.insert(node.key.clone(), node);
        true
    }

    /// Replace a type's inheritance edges once resolution has run.
    pub fn set_edges(&mut self, key: &TypeKey, base: Option<TypeKey>, interfaces: Vec<TypeKey>) {
        if let Some(node) = self.types.get_mut(key) {
            node.base = base;
            node.interfaces = interfaces;
        }
    }

    pub fn get(&self, key: &TypeKey) -> Option<&TypeNode> {
        self.types.get(key)
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.types.contains_key(key)
    }

    /// Resolve a syntactic type reference to a declared key.
    ///
    /// Qualified references resolve directly. Unqualified ones are tried
    /// against the declaring file's namespace, then each `use` namespace in
    /// order, then the built-in `trellis` prelude.
    pub fn resolve(
        &self,
        reference: &TypeRef,
        namespace: &[String],
        uses: &[Vec<String>],
    ) -> Option<TypeKey> {
        let arity = reference.arity();
        if !reference.qualifier().is_empty() {
            let key = TypeKey::new(reference.path.join("."), arity);
            return self.contains(&key).then_some(key);
        }

        let mut scopes: Vec<Vec<String>> = Vec::with_capacity(uses.len() + 2);
        scopes.push(namespace.to_vec());
        scopes.extend(uses.iter().cloned());
        scopes.push(vec!["trellis".to_string()]);

        for scope in &scopes {
            let qualified = format!("{}.{}", scope.join("."), reference.name());
            let key = TypeKey::new(qualified, arity);
            if self.contains(&key) {
                return Some(key);
            }
        }
        None
    }

    /// Generic-definition-aware inheritance test.
    ///
    /// Walks `child`'s base-class chain; at each step the type itself and
    /// every implemented interface (transitively) are tested against
    /// `parent`. Keys already normalize open generics, so asking with
    /// `Container<T>` matches a declaration extending `Container<Foo>`.
    /// The walk ends — returning `false` — when it runs off the top of the
    /// declared hierarchy.
    pub fn inherits_or_implements(&self, child: &TypeKey, parent: &TypeKey) -> bool {
        let mut current = Some(child.clone());
        while let Some(key) = current {
            if key == *parent {
                return true;
            }
            let Some(node) = self.get(&key) else {
                // External type: nothing more is declared above it.
                return false;
            };
            for iface in &node.interfaces {
                if self.interface_matches(iface, parent) {
                    return true;
                }
            }
            current = node.base.clone();
        }
        false
    }

    fn interface_matches(&self, iface: &TypeKey, parent: &TypeKey) -> bool {
        if iface == parent {
            return true;
        }
        match self.get(iface) {
            Some(node) => node
                .interfaces
                .iter()
                .any(|base| self.interface_matches(base, parent)),
            None => false,
        }
    }

    /// Every interface in `class`'s inheritance closure that derives from
    /// `base_capability`, excluding the base capability itself — the set of
    /// registry keys a component of this class is indexed under.
    ///
    /// Discovery order is deterministic: own interfaces before inherited
    /// ones, each interface before the interfaces it extends.
    pub fn capability_closure(&self, class: &TypeKey, base_capability: &TypeKey) -> Vec<TypeKey> {
        let mut seen = Vec::new();
        let mut current = Some(class.clone());
        while let Some(key) = current {
            let Some(node) = self.get(&key) else {
                break;
            };
            for iface in &node.interfaces {
                self.collect_interface(iface, &mut seen);
            }
            current = node.base.clone();
        }
        seen.retain(|key| {
            key != base_capability && self.inherits_or_implements(key, base_capability)
        });
        seen
    }

    fn collect_interface(&self, iface: &TypeKey, seen: &mut Vec<TypeKey>) {
        if seen.contains(iface) {
            return;
        }
        seen.push(iface.clone());
        if let Some(node) = self.get(iface) {
            for base in &node.interfaces {
                self.collect_interface(base, seen);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(qualified: &str, arity: usize, base: Option<TypeKey>, ifaces: Vec<TypeKey>) -> TypeNode {
        TypeNode {
            key: TypeKey::new(qualified, arity),
            kind: TypeKind::Class,
            base,
            interfaces: ifaces,
        }
    }

    fn interface(qualified: &str, bases: Vec<TypeKey>) -> TypeNode {
        TypeNode {
            key: TypeKey::new(qualified, 0),
            kind: TypeKind::Interface,
            base: None,
            interfaces: bases,
        }
    }

    /// t.GenericBase<T>, t.ChildOfGenericBase : GenericBase<Foo>,
    /// t.IComponent, t.ICap : IComponent, t.Impl : ICap, t.Unrelated.
    fn build() -> TypeGraph {
        let mut graph = TypeGraph::new();
        graph.insert(class("t.GenericBase", 1, None, vec![]));
        graph.insert(class(
            "t.ChildOfGenericBase",
            0,
            Some(TypeKey::new("t.GenericBase", 1)),
            vec![],
        ));
        graph.insert(interface("t.IComponent", vec![]));
        graph.insert(interface("t.ICap", vec![TypeKey::new("t.IComponent", 0)]));
        graph.insert(class(
            "t.Impl",
            0,
            None,
            vec![TypeKey::new("t.ICap", 0)],
        ));
        graph.insert(class("t.Unrelated", 0, None, vec![]));
        graph
    }

    #[test]
    fn test_open_generic_base_matches() {
        let graph = build();
        // Asking with the open generic definition form.
        assert!(graph.inherits_or_implements(
            &TypeKey::new("t.ChildOfGenericBase", 0),
            &TypeKey::new("t.GenericBase", 1),
        ));
    }

    #[test]
    fn test_unrelated_type_does_not_match() {
        let graph = build();
        assert!(!graph.inherits_or_implements(
            &TypeKey::new("t.Unrelated", 0),
            &TypeKey::new("t.GenericBase", 1),
        ));
    }

    #[test]
    fn test_transitive_interface_match() {
        let graph = build();
        // Impl : ICap : IComponent.
        assert!(graph.inherits_or_implements(
            &TypeKey::new("t.Impl", 0),
            &TypeKey::new("t.IComponent", 0),
        ));
    }

    #[test]
    fn test_capability_closure_excludes_base() {
        let graph = build();
        let caps = graph.capability_closure(
            &TypeKey::new("t.Impl", 0),
            &TypeKey::new("t.IComponent", 0),
        );
        assert_eq!(caps, vec![TypeKey::new("t.ICap", 0)]);
    }

    #[test]
    fn test_resolve_prefers_declaring_namespace() {
        let mut graph = build();
        graph.insert(interface("other.ICap", vec![]));

        let ns = vec!["t".to_string()];
        let uses = vec![vec!["other".to_string()]];
        let key = graph
            .resolve(&TypeRef::simple("ICap"), &ns, &uses)
            .unwrap();
        assert_eq!(key.qualified, "t.ICap");
    }

    #[test]
    fn test_resolve_falls_through_to_uses() {
        let graph = build();
        let ns = vec!["elsewhere".to_string()];
        let uses = vec![vec!["t".to_string()]];
        let key = graph
            .resolve(&TypeRef::simple("ICap"), &ns, &uses)
            .unwrap();
        assert_eq!(key.qualified, "t.ICap");
    }

    #[test]
    fn test_resolve_unknown_is_none() {
        let graph = build();
        assert!(graph
            .resolve(&TypeRef::simple("Missing"), &["t".to_string()], &[])
            .is_none());
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let mut graph = build();
        assert!(!graph.insert(class("t.Unrelated", 0, None, vec![])));
    }
}
