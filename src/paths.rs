//! Deterministic derivation of a table's file set from a base path (C3).
//!
//! Derivation is purely lexical: no filesystem access happens here, and the
//! full set of potential branch paths is produced regardless of how deep the
//! table actually grows.

use crate::format::MAX_BRANCH_LEVELS;
use std::path::{Path, PathBuf};

/// The file paths that make up one table.
#[derive(Debug, Clone)]
pub struct TablePaths {
    pub leaf: PathBuf,
    pub large_value: PathBuf,
    branch: Vec<PathBuf>,
}

impl TablePaths {
    /// Builds the deterministic path set for `base_path`.
    pub fn build(base_path: &Path) -> Self {
        let base = base_path.as_os_str().to_owned();

        let mut large_value = base.clone();
        large_value.push(".lvs");

        let branch = (0..MAX_BRANCH_LEVELS)
            .map(|level| {
                let mut p = base.clone();
                p.push(format!(".{level:03}"));
                PathBuf::from(p)
            })
            .collect();

        TablePaths {
            leaf: PathBuf::from(base),
            large_value: PathBuf::from(large_value),
            branch,
        }
    }

    /// The path for branch level `level`, or `None` if `level` exceeds
    /// `MAX_BRANCH_LEVELS`.
    pub fn branch(&self, level: usize) -> Option<&Path> {
        self.branch.get(level).map(PathBuf::as_path)
    }
}
