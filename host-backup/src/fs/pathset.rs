//! Include/exclude resolution.
//!
//! Turns the declarative path configuration into the walk parameters for the
//! archiver. Nothing here touches the filesystem: missing include roots are
//! passed through and surface later as build warnings.

use crate::config::PathsConfig;
use crate::utils::ConfigError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

/// Declarative include roots and exclusion globs, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSpec {
    pub include_roots: Vec<PathBuf>,
    pub exclude_patterns: Vec<String>,
}

impl From<&PathsConfig> for PathSpec {
    fn from(config: &PathsConfig) -> Self {
        Self {
            include_roots: config.include.clone(),
            exclude_patterns: config.exclude.clone(),
        }
    }
}

/// Resolved walk parameters: include roots plus compiled exclusions.
#[derive(Debug, Clone)]
pub struct PathSet {
    include_roots: Vec<PathBuf>,
    patterns: Vec<String>,
    excludes: GlobSet,
}

/// Compile a [`PathSpec`] into a [`PathSet`].
///
/// Patterns beginning with `/` are anchored to the full path. Any other
/// pattern also matches a trailing run of path components, so `b/*`
/// excludes `/srv/b/file` and `*/lost+found` hits that name anywhere.
/// `*` crosses directory separators.
pub fn resolve(spec: PathSpec) -> Result<PathSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();

    for pattern in &spec.exclude_patterns {
        builder.add(compile(pattern, pattern)?);
        if !pattern.starts_with('/') && !pattern.starts_with("**") {
            builder.add(compile(&format!("**/{}", pattern), pattern)?);
        }
    }

    let excludes = builder.build().map_err(|source| ConfigError::Pattern {
        pattern: spec.exclude_patterns.join(", "),
        source,
    })?;

    Ok(PathSet {
        include_roots: spec.include_roots,
        patterns: spec.exclude_patterns,
        excludes,
    })
}

fn compile(glob: &str, pattern: &str) -> Result<globset::Glob, ConfigError> {
    GlobBuilder::new(glob)
        .literal_separator(false)
        .build()
        .map_err(|source| ConfigError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

impl PathSet {
    pub fn include_roots(&self) -> &[PathBuf] {
        &self.include_roots
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True when any exclusion pattern matches the full path.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.excludes.is_match(path)
    }
}
