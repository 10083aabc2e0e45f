/// Declaration-set container — collects parsed files so the analyzer can see
/// the whole program's type declarations at once.
use std::path::Path;

use thiserror::Error;

use crate::ast::{ClassDecl, File, InterfaceDecl, Item};
use crate::parser::Parser;

#[derive(Debug, Error)]
pub enum DeclError {
    #[error("parse error: {0}")]
    Parse(#[from] crate::parser::ParseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// All declaration files loaded for one generation run.
///
/// Duplicate type declarations are *not* rejected here — detecting duplicate
/// generation targets is the analyzer's job, and it reports them as
/// diagnostics rather than aborting the load.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    pub files: Vec<File>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `.tls` declaration file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), DeclError> {
        let source = std::fs::read_to_string(path)?;
        self.load_source(&source)
    }

    /// Parse a source string and add its declarations.
    pub fn load_source(&mut self, source: &str) -> Result<(), DeclError> {
        self.files.push(Parser::parse(source)?);
        Ok(())
    }

    /// Every class declaration, paired with its declaring file.
    pub fn classes(&self) -> impl Iterator<Item = (&File, &ClassDecl)> {
        self.files.iter().flat_map(|file| {
            file.items.iter().filter_map(move |item| match item {
                Item::Class(c) => Some((file, c)),
                Item::Interface(_) => None,
            })
        })
    }

    /// Every interface declaration, paired with its declaring file.
    pub fn interfaces(&self) -> impl Iterator<Item = (&File, &InterfaceDecl)> {
        self.files.iter().flat_map(|file| {
            file.items.iter().filter_map(move |item| match item {
                Item::Interface(i) => Some((file, i)),
                Item::Class(_) => None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_iterate() {
        let mut decls = Declarations::new();
        decls
            .load_source("namespace game.shared\ninterface IHealthProvider : IComponent")
            .unwrap();
        decls
            .load_source(
                "namespace game.actors\nuse game.shared\n@entity\nclass Player : Node {}",
            )
            .unwrap();

        assert_eq!(decls.files.len(), 2);
        assert_eq!(decls.classes().count(), 1);
        assert_eq!(decls.interfaces().count(), 1);

        let (file, class) = decls.classes().next().unwrap();
        assert_eq!(file.namespace.dotted(), "game.actors");
        assert_eq!(class.name, "Player");
    }

    #[test]
    fn test_load_source_propagates_parse_error() {
        let mut decls = Declarations::new();
        assert!(decls.load_source("class NoNamespace").is_err());
    }
}
