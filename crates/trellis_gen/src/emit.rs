//! Code synthesizer.
//!
//! Turns analyzed descriptors into Rust source artifacts targeting the
//! `trellis_core` runtime API: a capability-constant module per namespace, a
//! component definition per component descriptor, and the registry and
//! initialization machinery per root-most entity descriptor.
//!
//! Namespace handling is a correctness requirement, not style: declaration
//! namespaces map to Rust module paths, the import block is deduplicated and
//! sorted, and a dependency whose capability lives in another namespace is
//! referenced through its own namespace's generated constants.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use tracing::debug;

use crate::analyzer::{Analysis, ComponentDescriptor, EntityDescriptor};
use crate::typegraph::TypeKey;

const HEADER: &str = "// Generated by trellis-gen — do not edit.\n";

/// One emitted source artifact, keyed by the type (or namespace) it
/// supplements.
#[derive(Debug, Clone)]
pub struct GeneratedSource {
    pub type_name: String,
    /// Relative path under the generation output directory.
    pub file_name: String,
    pub code: String,
}

/// Emit every artifact for an analyzed declaration set: capability modules
/// first, then components, then root-most entities. Entities whose machinery
/// is inherited from a marked ancestor are skipped.
pub fn emit_all(analysis: &Analysis) -> Vec<GeneratedSource> {
    let mut sources = Vec::new();

    let mut by_namespace: BTreeMap<String, Vec<&TypeKey>> = BTreeMap::new();
    for capability in &analysis.capabilities {
        by_namespace
            .entry(capability.namespace_path().join("."))
            .or_default()
            .push(capability);
    }
    for (namespace, capabilities) in &by_namespace {
        sources.push(emit_capability_module(namespace, capabilities));
    }

    for component in &analysis.components {
        sources.push(emit_component(component));
    }

    for entity in &analysis.entities {
        if entity.has_entity_ancestor {
            debug!(entity = %entity.qualified, "machinery inherited, skipping emission");
            continue;
        }
        sources.push(emit_entity(entity));
    }

    sources
}

// ---------------------------------------------------------------------------
// Capability constants
// ---------------------------------------------------------------------------

fn emit_capability_module(namespace: &str, capabilities: &[&TypeKey]) -> GeneratedSource {
    let mut code = String::from(HEADER);
    code.push('\n');
    code.push_str("use trellis_core::CapabilityId;\n");
    for capability in capabilities {
        let _ = write!(
            code,
            "\n/// Capability `{qualified}`.\npub const {name}: CapabilityId =\n    CapabilityId::from_name(\"{qualified}\");\n",
            qualified = capability.qualified,
            name = const_case(capability.name()),
        );
    }

    GeneratedSource {
        type_name: format!("{namespace}.capabilities"),
        file_name: format!("{}/capabilities.rs", namespace.replace('.', "/")),
        code,
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

fn emit_component(desc: &ComponentDescriptor) -> GeneratedSource {
    let mut core_items: BTreeSet<&str> = ["CapabilityId", "Component", "NodeId", "NodeObject", "SceneTree"]
        .into_iter()
        .collect();
    if !desc.dependencies.is_empty() {
        core_items.insert("ResolveContext");
    }

    // Deduplicated, sorted imports for every capability constant touched —
    // own capabilities and dependencies alike, cross-namespace or not.
    let mut const_uses: BTreeSet<String> = BTreeSet::new();
    for capability in desc.capabilities.iter().chain(&desc.dependencies) {
        const_uses.insert(format!(
            "use {}::{};\n",
            const_module_path(capability),
            const_case(capability.name())
        ));
    }

    let mut code = String::from(HEADER);
    code.push('\n');
    let _ = write!(
        code,
        "use trellis_core::{{owning_entity, {}}};\n",
        core_items.into_iter().collect::<Vec<_>>().join(", ")
    );
    if !const_uses.is_empty() {
        code.push('\n');
        for import in &const_uses {
            code.push_str(import);
        }
    }

    // Struct definition.
    let _ = write!(
        code,
        "\n/// Component `{qualified}`, attached under a parent exposing\n/// `{parent}`.\npub struct {name} {{\n    /// Backing tree node.\n    pub node: NodeId,\n    /// Parent entity node, acquired by `initialize_component`.\n    pub parent: Option<NodeId>,\n",
        qualified = desc.qualified,
        parent = desc.parent_capability.qualified,
        name = desc.name,
    );
    for dep in &desc.dependencies {
        let _ = write!(
            code,
            "    /// Dependency on `{qualified}`.\n    pub {field}: Option<NodeId>,\n",
            qualified = dep.qualified,
            field = snake_case(dep.name()),
        );
    }
    for field in &desc.fields {
        let _ = write!(
            code,
            "    pub {}: {},\n",
            field.name,
            rust_type(field.ty.name())
        );
    }
    code.push_str("}\n");

    // Inherent impl.
    let _ = write!(
        code,
        "\nimpl {name} {{\n    pub const TYPE_NAME: &'static str = \"{qualified}\";\n\n    pub const CAPABILITIES: &'static [CapabilityId] = &[{caps}];\n",
        name = desc.name,
        qualified = desc.qualified,
        caps = desc
            .capabilities
            .iter()
            .map(|c| const_case(c.name()))
            .collect::<Vec<_>>()
            .join(", "),
    );
    let _ = write!(
        code,
        "\n    pub fn new(node: NodeId) -> Self {{\n        Self {{\n            node,\n            parent: None,\n"
    );
    for dep in &desc.dependencies {
        let _ = write!(code, "            {}: None,\n", snake_case(dep.name()));
    }
    for field in &desc.fields {
        let _ = write!(code, "            {}: Default::default(),\n", field.name);
    }
    code.push_str("        }\n    }\n");

    code.push_str(
        "\n    /// Acquires the parent entity and, when it has already initialized,\n    /// registers and resolves immediately (late attachment).\n    pub fn initialize_component(&mut self, tree: &SceneTree) {\n        self.parent = owning_entity(tree, self.node);\n        let Some(parent) = self.parent else {\n            return;\n        };\n        if let Some(mut object) = tree.object_mut(parent) {\n            if let Some(entity) = object.as_entity_mut() {\n                if entity.is_initialized() {\n                    entity.attach_component(tree, self.node, self);\n                }\n            }\n        }\n    }\n}\n",
    );

    // NodeObject impl.
    let _ = write!(
        code,
        "\nimpl NodeObject for {name} {{\n    fn type_name(&self) -> &'static str {{\n        Self::TYPE_NAME\n    }}\n\n    fn capabilities(&self) -> &[CapabilityId] {{\n        Self::CAPABILITIES\n    }}\n",
        name = desc.name,
    );
    if let Some(dispatch) = emit_set_property(&desc.fields) {
        code.push_str(&dispatch);
    }
    if !desc.dependencies.is_empty() {
        code.push_str(
            "\n    fn resolve_dependencies(&mut self, deps: &ResolveContext<'_>) {\n",
        );
        for dep in &desc.dependencies {
            let _ = write!(
                code,
                "        self.{field} = deps.capability({cap});\n",
                field = snake_case(dep.name()),
                cap = const_case(dep.name()),
            );
        }
        code.push_str("    }\n");
    }
    if desc.has_user_ready {
        let _ = write!(
            code,
            "\n    fn entity_ready(&mut self) {{\n        {name}::entity_ready(self);\n    }}\n",
            name = desc.name,
        );
    }
    code.push_str(
        "\n    fn as_any(&self) -> &dyn std::any::Any {\n        self\n    }\n\n    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {\n        self\n    }\n}\n",
    );

    // Component impl.
    let _ = write!(
        code,
        "\nimpl Component for {name} {{\n    fn component_name() -> &'static str {{\n        Self::TYPE_NAME\n    }}\n}}\n",
        name = desc.name,
    );

    GeneratedSource {
        type_name: desc.qualified.clone(),
        file_name: module_file(&desc.namespace, &desc.name),
        code,
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

fn emit_entity(desc: &EntityDescriptor) -> GeneratedSource {
    let mut code = String::from(HEADER);
    code.push('\n');
    code.push_str("use std::cell::Ref;\n\n");
    code.push_str("use trellis_core::{Component, Entity, NodeId, NodeObject, SceneTree};\n");

    let _ = write!(
        code,
        "\n/// Entity root `{qualified}`.\npub struct {name} {{\n    /// Backing tree node.\n    pub node: NodeId,\n    core: Entity,\n",
        qualified = desc.qualified,
        name = desc.name,
    );
    for field in &desc.fields {
        let _ = write!(
            code,
            "    pub {}: {},\n",
            field.name,
            rust_type(field.ty.name())
        );
    }
    code.push_str("}\n");

    let _ = write!(
        code,
        "\nimpl {name} {{\n    pub const TYPE_NAME: &'static str = \"{qualified}\";\n\n    pub fn new(node: NodeId) -> Self {{\n        Self {{\n            node,\n            core: Entity::new(node),\n",
        name = desc.name,
        qualified = desc.qualified,
    );
    for field in &desc.fields {
        let _ = write!(code, "            {}: Default::default(),\n", field.name);
    }
    code.push_str("        }\n    }\n");

    code.push_str(
        "\n    pub fn is_initialized(&self) -> bool {\n        self.core.is_initialized()\n    }\n\n    /// Idempotent: populate, resolve, flush deferred writes, set the flag,\n    /// notify ready.\n    pub fn initialize(&mut self, tree: &SceneTree) {\n        self.core.initialize(tree);\n    }\n\n    pub fn resolve_all(&self, tree: &SceneTree) {\n        self.core.resolve_all(tree);\n    }\n\n    pub fn has_component<T: Component>(&self, tree: &SceneTree) -> bool {\n        self.core.has_component::<T>(tree)\n    }\n\n    pub fn get_component<'a, T: Component>(&mut self, tree: &'a SceneTree) -> Option<Ref<'a, T>> {\n        self.core.get_component::<T>(tree)\n    }\n\n    pub fn get_component_by_name<'a, T: Component>(\n        &mut self,\n        tree: &'a SceneTree,\n        name: &str,\n    ) -> Option<Ref<'a, T>> {\n        self.core.get_component_by_name::<T>(tree, name)\n    }\n\n    pub fn components<'a>(&'a self, tree: &'a SceneTree) -> impl Iterator<Item = NodeId> + 'a {\n        self.core.components(tree)\n    }\n\n    pub fn queue_deferred_write<T: Component>(\n        &mut self,\n        tree: &SceneTree,\n        property: &str,\n        value: serde_json::Value,\n    ) {\n        self.core.queue_deferred_write::<T>(tree, property, value);\n    }\n}\n",
    );

    let _ = write!(
        code,
        "\nimpl NodeObject for {name} {{\n    fn type_name(&self) -> &'static str {{\n        Self::TYPE_NAME\n    }}\n",
        name = desc.name,
    );
    if let Some(dispatch) = emit_set_property(&desc.fields) {
        code.push_str(&dispatch);
    }
    if desc.has_user_ready {
        let _ = write!(
            code,
            "\n    fn entity_ready(&mut self) {{\n        {name}::entity_ready(self);\n    }}\n",
            name = desc.name,
        );
    }
    code.push_str(
        "\n    fn as_entity(&self) -> Option<&Entity> {\n        Some(&self.core)\n    }\n\n    fn as_entity_mut(&mut self) -> Option<&mut Entity> {\n        Some(&mut self.core)\n    }\n\n    fn as_any(&self) -> &dyn std::any::Any {\n        self\n    }\n\n    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {\n        self\n    }\n}\n",
    );

    GeneratedSource {
        type_name: desc.qualified.clone(),
        file_name: module_file(&desc.namespace, &desc.name),
        code,
    }
}

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

fn emit_set_property(fields: &[trellis_schema::FieldDecl]) -> Option<String> {
    if fields.is_empty() {
        return None;
    }
    let mut code = String::from(
        "\n    fn set_property(&mut self, property: &str, value: &serde_json::Value) -> bool {\n        match property {\n",
    );
    for field in fields {
        let (accessor, convert) = json_accessor(field.ty.name());
        let _ = write!(
            code,
            "            \"{name}\" => match value.{accessor}() {{\n                Some(v) => {{\n                    self.{name} = {convert};\n                    true\n                }}\n                None => false,\n            }},\n",
            name = field.name,
            accessor = accessor,
            convert = convert,
        );
    }
    code.push_str("            _ => false,\n        }\n    }\n");
    Some(code)
}

/// Rust module path of the generated capability-constants module for a
/// capability's namespace.
fn const_module_path(capability: &TypeKey) -> String {
    let mut path = String::from("crate");
    for segment in capability.namespace_path() {
        path.push_str("::");
        path.push_str(segment);
    }
    path.push_str("::capabilities");
    path
}

fn module_file(namespace: &[String], name: &str) -> String {
    format!("{}/{}.rs", namespace.join("/"), snake_case(name))
}

/// Deterministic field-name derivation: the capability type name rendered in
/// snake case (`IHealthProvider` → `i_health_provider`).
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn const_case(name: &str) -> String {
    snake_case(name).to_ascii_uppercase()
}

fn rust_type(decl_type: &str) -> &str {
    match decl_type {
        "string" => "String",
        other => other,
    }
}

/// JSON accessor and conversion expression for a declared field type.
fn json_accessor(decl_type: &str) -> (&'static str, String) {
    match decl_type {
        "bool" => ("as_bool", "v".to_string()),
        "f64" => ("as_f64", "v".to_string()),
        "f32" => ("as_f64", "v as f32".to_string()),
        "i64" => ("as_i64", "v".to_string()),
        "i8" | "i16" | "i32" => ("as_i64", format!("v as {decl_type}")),
        "u64" => ("as_u64", "v".to_string()),
        "u8" | "u16" | "u32" => ("as_u64", format!("v as {decl_type}")),
        "string" => ("as_str", "v.to_string()".to_string()),
        other => unreachable!("unsupported field type '{other}' passed analysis"),
    }
}
