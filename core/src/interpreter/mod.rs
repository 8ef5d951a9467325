//! Statement execution engine
//!
//! Script units arrive as JSON ASTs (`types::ast`), are lowered and checked by
//! the [`builder`], and run against a [`Frame`] owned by a [`Host`].
//! Construction problems are collected as diagnostics, never raised.

pub mod builder;
pub mod debug;
pub mod describe;
pub mod diagnostics;
pub mod errors;
pub mod expressions;
pub mod frame;
pub mod hash;
pub mod host;
pub mod semantic_validator;
pub mod statements;
pub mod switch;
pub mod traverse;
pub mod trigger;
pub mod types;

#[cfg(test)]
mod tests;

pub use builder::{load_unit, load_unit_json, Builder, Unit};
pub use describe::{Desc, DescMode};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use errors::{LoadError, RuntimeError};
pub use frame::Frame;
pub use host::{EngineSettings, Host, QueuedEvent, SessionId};
pub use statements::{Stmt, StmtId, StmtKind, StmtTag};
pub use traverse::{TraversalCallback, TraversalCode};
pub use trigger::{Trigger, TriggerMgr, TriggerState};
pub use types::{Flow, Span, Type, Val};

use std::path::{Path, PathBuf};

/// Where to look for script units
#[derive(Debug, Clone, Default)]
pub struct UnitSources {
    /// Files, or directories scanned (non-recursively) for `.json` units
    pub paths: Vec<PathBuf>,
}

impl UnitSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn add_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.paths.extend(paths);
        self
    }

    /// Every unit file named by the configured paths, sorted per directory
    pub fn files(&self) -> Result<Vec<PathBuf>, LoadError> {
        let mut files = Vec::new();
        for path in &self.paths {
            if !path.is_dir() {
                files.push(path.clone());
                continue;
            }
            let entries = std::fs::read_dir(path).map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            })?;
            let mut found: Vec<PathBuf> = entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            found.sort();
            files.extend(found);
        }
        Ok(files)
    }
}

/// Read and load one unit file
pub fn load_unit_file(path: &Path) -> Result<Unit, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loading unit");
    load_unit_json(&text)
}

/// Load every unit the sources name, stopping at the first failure
pub fn load_units(sources: &UnitSources) -> Result<Vec<Unit>, LoadError> {
    sources
        .files()?
        .iter()
        .map(|p| load_unit_file(p))
        .collect()
}
