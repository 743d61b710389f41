//! Plugin identifier parsing.
//!
//! An identifier is either a direct path to a loadable module
//! (`/path/to/plugin.so`) or a logical `<category>/<name>` reference that
//! has to be built first. Anything with fewer than two `/`-separated
//! segments is rejected; there is no such thing as a bare local plugin name.

use crate::error::{PluginError, Result};

use super::types::MODULE_EXTENSION;

/// Separator between identifier segments.
pub const SEGMENT_SEPARATOR: char = '/';

/// How an identifier is turned into a module path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// Names a compiled module on disk; loaded without a build step.
    DirectModule,
    /// Names a category and plugin resolved under the plugins source root.
    Logical,
}

/// A trimmed identifier split into its segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentifier {
    raw: String,
    segments: Vec<String>,
    kind: IdentifierKind,
}

impl ParsedIdentifier {
    /// Parse a raw identifier.
    ///
    /// Surrounding whitespace is trimmed. Callers are expected to skip
    /// identifiers that are empty after trimming; an empty string here is
    /// rejected like any other single-segment name.
    ///
    /// # Errors
    /// `PluginError::InvalidIdentifier` if the identifier has fewer than two segments.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let segments: Vec<String> = raw
            .split(SEGMENT_SEPARATOR)
            .map(str::to_string)
            .collect();

        if segments.len() < 2 {
            return Err(PluginError::InvalidIdentifier(raw.to_string()));
        }

        let kind = if is_module_path(raw) {
            IdentifierKind::DirectModule
        } else {
            IdentifierKind::Logical
        };

        Ok(Self {
            raw: raw.to_string(),
            segments,
            kind,
        })
    }

    /// The trimmed identifier as supplied.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Segments in their original order, unmodified.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    pub fn is_direct_module(&self) -> bool {
        self.kind == IdentifierKind::DirectModule
    }
}

/// Whether `raw` ends with the platform loadable-module suffix.
pub fn is_module_path(raw: &str) -> bool {
    raw.strip_suffix(MODULE_EXTENSION)
        .is_some_and(|stem| stem.ends_with('.'))
}
