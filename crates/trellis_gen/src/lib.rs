//! # trellis_gen
//!
//! Build-time half of the trellis composition toolkit: the declaration
//! analyzer and the code synthesizer.
//!
//! The pipeline runs once, ahead of normal compilation:
//!
//! 1. `trellis_schema` parses `.tls` declaration files,
//! 2. [`analyze`] recovers semantic type information — the type graph,
//!    component/entity descriptors, capability closures — reporting
//!    non-fatal [`Diagnostic`]s for anything it cannot resolve,
//! 3. [`emit_all`] synthesizes the supplemental Rust members each marked
//!    type needs, wired against the `trellis_core` runtime API.

pub mod analyzer;
pub mod emit;
pub mod typegraph;

pub use analyzer::{analyze, Analysis, ComponentDescriptor, Diagnostic, EntityDescriptor};
pub use emit::{emit_all, GeneratedSource};
pub use typegraph::{TypeGraph, TypeKey, TypeKind, TypeNode};
