//! Debugger line maps
//!
//! A process-wide map from source file to the statements that start in it,
//! kept in lexical order so a debugger can find "the first statement at line
//! N" for a breakpoint. It exists only between [`init`] and [`teardown`], and
//! only for files registered with [`add_file`]; statement construction
//! registers into it when it exists and execution never reads it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::statements::StmtId;
use super::types::Span;

/// One statement's location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmtLocMapping {
    pub span: Span,
    pub stmt: StmtId,
}

type FileMaps = HashMap<String, Vec<StmtLocMapping>>;

static FILE_MAPS: Mutex<Option<FileMaps>> = Mutex::new(None);

fn maps() -> MutexGuard<'static, Option<FileMaps>> {
    FILE_MAPS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Start collecting line maps. Existing maps are kept.
pub fn init() {
    let mut maps = maps();
    if maps.is_none() {
        *maps = Some(HashMap::new());
        tracing::debug!("debug file maps initialized");
    }
}

/// Drop every map
pub fn teardown() {
    *maps() = None;
}

pub fn is_initialized() -> bool {
    maps().is_some()
}

/// Start tracking `file`. No-op unless initialized.
pub fn add_file(file: &str) {
    if let Some(maps) = maps().as_mut() {
        maps.entry(file.to_string()).or_default();
    }
}

/// Record a statement location. Returns false when the file is not tracked.
pub fn register(file: &str, span: Span, stmt: StmtId) -> bool {
    let mut guard = maps();
    let Some(map) = guard.as_mut().and_then(|m| m.get_mut(file)) else {
        return false;
    };

    // Usually lexically last; otherwise bubble it back into place
    map.push(StmtLocMapping { span, stmt });
    let mut idx = map.len() - 1;
    while idx > 0 && map[idx - 1].span.starts_after(&map[idx].span) {
        map.swap(idx - 1, idx);
        idx -= 1;
    }
    true
}

/// First statement starting on `line` of `file`
pub fn lookup_line(file: &str, line: usize) -> Option<StmtId> {
    maps()
        .as_ref()?
        .get(file)?
        .iter()
        .find(|m| m.span.start_line == line)
        .map(|m| m.stmt)
}

/// Snapshot of the mappings for `file`, in lexical order
pub fn mappings(file: &str) -> Vec<StmtLocMapping> {
    maps()
        .as_ref()
        .and_then(|m| m.get(file))
        .cloned()
        .unwrap_or_default()
}
