//! # trellis-gen — declaration scanner & code synthesizer
//!
//! Runs the composition pipeline once, ahead of normal compilation:
//!
//! 1. Load every `.tls` declaration file from the input directory.
//! 2. Analyze the declaration set (reporting diagnostics as warnings).
//! 3. Write one generated Rust source per marked type — plus one capability
//!    module per namespace — into the output directory.
//!
//! Directories come from argv (`trellis-gen <decl-dir> <out-dir>`), falling
//! back to `TRELLIS_DECL_DIR` / `TRELLIS_OUT_DIR`, then to `decl` and
//! `generated`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trellis_gen::{analyze, emit_all};
use trellis_schema::Declarations;

fn arg_or_env(index: usize, env: &str, default: &str) -> PathBuf {
    std::env::args()
        .nth(index)
        .or_else(|| std::env::var(env).ok())
        .unwrap_or_else(|| default.to_string())
        .into()
}

fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trellis_gen=info".parse()?))
        .init();

    let decl_dir = arg_or_env(1, "TRELLIS_DECL_DIR", "decl");
    let out_dir = arg_or_env(2, "TRELLIS_OUT_DIR", "generated");

    let decls = load_declarations(&decl_dir)?;
    info!(files = decls.files.len(), dir = %decl_dir.display(), "declarations loaded");

    let analysis = analyze(&decls);
    for diagnostic in &analysis.diagnostics {
        warn!("{diagnostic}");
    }

    let sources = emit_all(&analysis);
    for source in &sources {
        let path = out_dir.join(&source.file_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&path, &source.code).with_context(|| format!("writing {}", path.display()))?;
        info!(artifact = %source.type_name, file = %path.display(), "generated");
    }

    info!(
        artifacts = sources.len(),
        diagnostics = analysis.diagnostics.len(),
        "generation complete"
    );
    Ok(())
}

fn load_declarations(dir: &Path) -> Result<Declarations> {
    let mut decls = Declarations::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading declaration dir {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "tls"))
        .collect();
    // Deterministic load order, so diagnostics and first-wins duplicate
    // handling do not depend on directory enumeration order.
    paths.sort();
    for path in &paths {
        decls
            .load_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }
    Ok(decls)
}
