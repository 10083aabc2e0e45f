//! Declaration analyzer.
//!
//! Scans a full declaration set once and produces the descriptors the code
//! synthesizer consumes: component descriptors (parent capability, ordered
//! dependencies, capability closure), entity descriptors (with inherited-
//! machinery detection), and the capability interfaces needing generated
//! constants. Semantic failures — unresolvable marker arguments, duplicate
//! generation targets, unsupported field types — become non-fatal
//! [`Diagnostic`]s tied to the declaring type's source location; the scan
//! always completes.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;
use trellis_core::BASE_CAPABILITY;
use trellis_schema::{ClassDecl, Declarations, FieldDecl, File};

use crate::typegraph::{TypeGraph, TypeKey, TypeKind, TypeNode};

/// A non-fatal analysis finding tied to a declaration.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Name of the declaration the finding is about.
    pub type_name: String,
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}:{}): {}",
            self.type_name, self.line, self.col, self.message
        )
    }
}

/// Everything the synthesizer needs to emit a component's members.
#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    pub name: String,
    pub namespace: Vec<String>,
    /// Dotted qualified name; doubles as the exact-type registry key.
    pub qualified: String,
    /// The `@component` marker argument, resolved.
    pub parent_capability: TypeKey,
    /// The `@dependency` marker arguments, resolved, in marker order.
    pub dependencies: Vec<TypeKey>,
    /// Capability interfaces the component is indexed under.
    pub capabilities: Vec<TypeKey>,
    /// The declaration already defines the ready callback; the generated
    /// hook must delegate instead of emitting a conflicting stub.
    pub has_user_ready: bool,
    pub fields: Vec<FieldDecl>,
}

/// Everything the synthesizer needs to emit an entity's members.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub name: String,
    pub namespace: Vec<String>,
    pub qualified: String,
    /// An ancestor class is itself a marked entity: the registry and
    /// initialization machinery is inherited, not re-emitted.
    pub has_entity_ancestor: bool,
    pub has_user_ready: bool,
    pub fields: Vec<FieldDecl>,
}

/// The analyzed model of one declaration set.
#[derive(Debug)]
pub struct Analysis {
    pub components: Vec<ComponentDescriptor>,
    pub entities: Vec<EntityDescriptor>,
    /// Declared capability interfaces (deriving the base capability,
    /// excluding it), in declaration order.
    pub capabilities: Vec<TypeKey>,
    pub diagnostics: Vec<Diagnostic>,
    pub graph: TypeGraph,
}

impl Analysis {
    /// JSON description of the analyzed model, for tooling.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "components": self.components.iter().map(|c| {
                serde_json::json!({
                    "name": c.qualified,
                    "parent": c.parent_capability.qualified,
                    "dependencies": c.dependencies.iter()
                        .map(|d| d.qualified.as_str()).collect::<Vec<_>>(),
                    "capabilities": c.capabilities.iter()
                        .map(|d| d.qualified.as_str()).collect::<Vec<_>>(),
                    "user_ready": c.has_user_ready,
                })
            }).collect::<Vec<_>>(),
            "entities": self.entities.iter().map(|e| {
                serde_json::json!({
                    "name": e.qualified,
                    "inherited": e.has_entity_ancestor,
                    "user_ready": e.has_user_ready,
                })
            }).collect::<Vec<_>>(),
            "capabilities": self.capabilities.iter()
                .map(|c| c.qualified.as_str()).collect::<Vec<_>>(),
            "diagnostics": self.diagnostics,
        })
    }
}

/// Field types the generated property dispatch can convert from a dynamic
/// value.
fn is_supported_field_type(name: &str) -> bool {
    matches!(
        name,
        "bool"
            | "u8"
            | "u16"
            | "u32"
            | "u64"
            | "i8"
            | "i16"
            | "i32"
            | "i64"
            | "f32"
            | "f64"
            | "string"
    )
}

fn file_uses(file: &File) -> Vec<Vec<String>> {
    file.uses.iter().map(|u| u.path.clone()).collect()
}

fn key_of(file: &File, name: &str, arity: usize) -> TypeKey {
    TypeKey::new(format!("{}.{}", file.namespace.dotted(), name), arity)
}

/// Scan the declaration set and build the analyzed model.
pub fn analyze(decls: &Declarations) -> Analysis {
    let mut graph = TypeGraph::new();
    let mut diagnostics = Vec::new();
    let base_key = TypeKey::new(BASE_CAPABILITY, 0);

    // Built-in prelude: the root component-marker capability.
    graph.insert(TypeNode {
        key: base_key.clone(),
        kind: TypeKind::Interface,
        base: None,
        interfaces: Vec::new(),
    });

    // Pass 1: declare every type, detecting duplicate declarations.
    for (file, class) in decls.classes() {
        let key = key_of(file, &class.name, class.generic_params.len());
        let inserted = graph.insert(TypeNode {
            key: key.clone(),
            kind: TypeKind::Class,
            base: None,
            interfaces: Vec::new(),
        });
        if !inserted {
            diagnostics.push(Diagnostic {
                type_name: class.name.clone(),
                line: class.line,
                col: class.col,
                message: format!("duplicate declaration of '{key}'"),
            });
        }
    }
    for (file, iface) in decls.interfaces() {
        let key = key_of(file, &iface.name, iface.generic_params.len());
        let inserted = graph.insert(TypeNode {
            key: key.clone(),
            kind: TypeKind::Interface,
            base: None,
            interfaces: Vec::new(),
        });
        if !inserted {
            diagnostics.push(Diagnostic {
                type_name: iface.name.clone(),
                line: iface.line,
                col: iface.col,
                message: format!("duplicate declaration of '{key}'"),
            });
        }
    }

    // Pass 2: resolve inheritance edges. Bases that resolve to no declared
    // type are external host classes and simply end the walk.
    let mut edged: HashSet<TypeKey> = HashSet::new();
    for (file, class) in decls.classes() {
        let key = key_of(file, &class.name, class.generic_params.len());
        if !edged.insert(key.clone()) {
            continue;
        }
        let uses = file_uses(file);
        let mut base = None;
        let mut interfaces = Vec::new();
        for base_ref in &class.bases {
            match graph.resolve(base_ref, &file.namespace.path, &uses) {
                Some(resolved) => {
                    let kind = graph.get(&resolved).map(|n| n.kind);
                    if kind == Some(TypeKind::Interface) {
                        interfaces.push(resolved);
                    } else if base.is_none() {
                        base = Some(resolved);
                    } else {
                        diagnostics.push(Diagnostic {
                            type_name: class.name.clone(),
                            line: class.line,
                            col: class.col,
                            message: format!("more than one base class: '{base_ref}'"),
                        });
                    }
                }
                None => {
                    debug!(class = %class.name, base = %base_ref, "external base type");
                }
            }
        }
        graph.set_edges(&key, base, interfaces);
    }
    for (file, iface) in decls.interfaces() {
        let key = key_of(file, &iface.name, iface.generic_params.len());
        if !edged.insert(key.clone()) {
            continue;
        }
        let uses = file_uses(file);
        let mut bases = Vec::new();
        for base_ref in &iface.bases {
            match graph.resolve(base_ref, &file.namespace.path, &uses) {
                Some(resolved) => bases.push(resolved),
                None => diagnostics.push(Diagnostic {
                    type_name: iface.name.clone(),
                    line: iface.line,
                    col: iface.col,
                    message: format!("cannot resolve base interface '{base_ref}'"),
                }),
            }
        }
        graph.set_edges(&key, None, bases);
    }

    // Marked-entity set, needed for inherited-machinery detection.
    let mut entity_keys: HashSet<TypeKey> = HashSet::new();
    for (file, class) in decls.classes() {
        if class.is_entity() {
            entity_keys.insert(key_of(file, &class.name, class.generic_params.len()));
        }
    }

    // Pass 3: descriptors for marked types.
    let mut components = Vec::new();
    let mut entities = Vec::new();
    let mut described: HashSet<TypeKey> = HashSet::new();
    for (file, class) in decls.classes() {
        let key = key_of(file, &class.name, class.generic_params.len());
        if !described.insert(key.clone()) {
            continue; // duplicate, already reported
        }
        let uses = file_uses(file);
        let fields = checked_fields(class, &mut diagnostics);
        let has_user_ready = class.methods.iter().any(|m| m.is_ready_callback());

        match (class.is_entity(), class.component_parent()) {
            (true, Some(_)) => {
                diagnostics.push(Diagnostic {
                    type_name: class.name.clone(),
                    line: class.line,
                    col: class.col,
                    message: "marked as both entity and component".to_string(),
                });
            }
            (true, None) => {
                let has_entity_ancestor = ancestor_is_entity(&graph, &key, &entity_keys);
                entities.push(EntityDescriptor {
                    name: class.name.clone(),
                    namespace: file.namespace.path.clone(),
                    qualified: key.qualified.clone(),
                    has_entity_ancestor,
                    has_user_ready,
                    fields,
                });
            }
            (false, Some(parent_ref)) => {
                let Some(parent_capability) =
                    graph.resolve(parent_ref, &file.namespace.path, &uses)
                else {
                    diagnostics.push(Diagnostic {
                        type_name: class.name.clone(),
                        line: class.line,
                        col: class.col,
                        message: format!("cannot resolve parent capability '{parent_ref}'"),
                    });
                    continue;
                };
                let mut dependencies = Vec::new();
                for dep_ref in class.dependencies() {
                    match graph.resolve(dep_ref, &file.namespace.path, &uses) {
                        Some(dep) => dependencies.push(dep),
                        None => diagnostics.push(Diagnostic {
                            type_name: class.name.clone(),
                            line: class.line,
                            col: class.col,
                            message: format!("cannot resolve dependency '{dep_ref}'"),
                        }),
                    }
                }
                components.push(ComponentDescriptor {
                    name: class.name.clone(),
                    namespace: file.namespace.path.clone(),
                    qualified: key.qualified.clone(),
                    parent_capability,
                    dependencies,
                    capabilities: graph.capability_closure(&key, &base_key),
                    has_user_ready,
                    fields,
                });
            }
            (false, None) => {
                if class.dependencies().next().is_some() {
                    diagnostics.push(Diagnostic {
                        type_name: class.name.clone(),
                        line: class.line,
                        col: class.col,
                        message: "dependency markers require a component marker".to_string(),
                    });
                }
            }
        }
    }

    // Capability interfaces needing generated constants.
    let mut capabilities = Vec::new();
    let mut cap_seen: HashSet<TypeKey> = HashSet::new();
    for (file, iface) in decls.interfaces() {
        let key = key_of(file, &iface.name, iface.generic_params.len());
        if !cap_seen.insert(key.clone()) {
            continue;
        }
        if key != base_key && graph.inherits_or_implements(&key, &base_key) {
            capabilities.push(key);
        }
    }

    debug!(
        components = components.len(),
        entities = entities.len(),
        diagnostics = diagnostics.len(),
        "declaration scan complete"
    );

    Analysis {
        components,
        entities,
        capabilities,
        diagnostics,
        graph,
    }
}

fn ancestor_is_entity(
    graph: &TypeGraph,
    class: &TypeKey,
    entity_keys: &HashSet<TypeKey>,
) -> bool {
    let mut current = graph.get(class).and_then(|n| n.base.clone());
    while let Some(key) = current {
        if entity_keys.contains(&key) {
            return true;
        }
        current = graph.get(&key).and_then(|n| n.base.clone());
    }
    false
}

fn checked_fields(class: &ClassDecl, diagnostics: &mut Vec<Diagnostic>) -> Vec<FieldDecl> {
    let mut fields = Vec::new();
    for field in &class.fields {
        let supported = field.ty.qualifier().is_empty()
            && field.ty.args.is_empty()
            && is_supported_field_type(field.ty.name());
        if supported {
            fields.push(field.clone());
        } else {
            diagnostics.push(Diagnostic {
                type_name: class.name.clone(),
                line: class.line,
                col: class.col,
                message: format!(
                    "field '{}' has unsupported type '{}'",
                    field.name, field.ty
                ),
            });
        }
    }
    fields
}
