/// Abstract syntax tree for the trellis declaration language.
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub namespace: NamespaceDecl,
    pub uses: Vec<UseDecl>,
    pub items: Vec<Item>,
}

// ---------------------------------------------------------------------------
// Namespace & imports
// ---------------------------------------------------------------------------

/// `namespace game.actors`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceDecl {
    pub path: Vec<String>,
}

impl NamespaceDecl {
    /// Dotted form, e.g. `"game.actors"`.
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

/// `use game.shared` — brings another namespace's types into scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UseDecl {
    pub path: Vec<String>,
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Item {
    Class(ClassDecl),
    Interface(InterfaceDecl),
}

// ---------------------------------------------------------------------------
// Type references
// ---------------------------------------------------------------------------

/// A possibly-qualified, possibly-generic type reference:
/// `Node`, `game.shared.IHealthProvider`, `Container<Foo>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    /// Path segments; the last one is the type name, the rest qualify it.
    pub path: Vec<String>,
    /// Generic arguments, empty for non-generic references.
    pub args: Vec<TypeRef>,
}

impl TypeRef {
    /// An unqualified, non-generic reference.
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            path: vec![name.into()],
            args: Vec::new(),
        }
    }

    /// The bare type name (last path segment).
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    /// The qualifying segments, empty for unqualified references.
    pub fn qualifier(&self) -> &[String] {
        &self.path[..self.path.len().saturating_sub(1)]
    }

    /// Number of generic arguments (or parameters, for a declaration site).
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.join("."))?;
        if !self.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{arg}")?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

/// A composition marker attached to a class declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Marker {
    /// `@entity` — the type is a composition root.
    Entity,
    /// `@component(ParentCap)` — the type is a component whose parent entity
    /// exposes the given capability.
    Component(TypeRef),
    /// `@dependency(Cap)` — the component needs a sibling exposing the given
    /// capability. Repeatable; order is preserved.
    Dependency(TypeRef),
}

// ---------------------------------------------------------------------------
// Class
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub generic_params: Vec<String>,
    pub markers: Vec<Marker>,
    /// Base class and implemented interfaces, in declaration order. Which is
    /// which is a semantic question answered by the analyzer.
    pub bases: Vec<TypeRef>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub line: usize,
    pub col: usize,
}

impl ClassDecl {
    /// Returns `true` if the class carries the `@entity` marker.
    pub fn is_entity(&self) -> bool {
        self.markers.iter().any(|m| matches!(m, Marker::Entity))
    }

    /// The `@component` parent capability, if the class is marked.
    pub fn component_parent(&self) -> Option<&TypeRef> {
        self.markers.iter().find_map(|m| match m {
            Marker::Component(parent) => Some(parent),
            _ => None,
        })
    }

    /// The declared `@dependency` capabilities, in marker order.
    pub fn dependencies(&self) -> impl Iterator<Item = &TypeRef> {
        self.markers.iter().filter_map(|m| match m {
            Marker::Dependency(dep) => Some(dep),
            _ => None,
        })
    }
}

/// `var name: Type`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
}

/// `fn name(params) -> Ret` — only the signature is declared; bodies are
/// hand-written Rust.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<FieldDecl>,
    pub ret: Option<TypeRef>,
}

impl MethodDecl {
    /// Returns `true` for the exact ready-callback shape: no parameters and
    /// no return value.
    pub fn is_ready_callback(&self) -> bool {
        self.name == "entity_ready" && self.params.is_empty() && self.ret.is_none()
    }
}

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceDecl {
    pub name: String,
    pub generic_params: Vec<String>,
    pub bases: Vec<TypeRef>,
    pub line: usize,
    pub col: usize,
}
