//! Engine configuration.

use crate::node::NodeKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The JSON could not be decoded.
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// `indent_unit` is empty.
    #[error("indent_unit must not be empty")]
    EmptyIndentUnit,
    /// `blank_line_threshold` is below 2.
    #[error("blank_line_threshold must be at least 2, got {0}")]
    BlankLineThreshold(usize),
    /// An unknown node kind name in the drag allow-set.
    #[error("unknown node kind in drag policy: {0}")]
    UnknownDragKind(String),
}

const DRAGGABLE_KINDS: &[&str] = &[
    "paragraph",
    "heading",
    "list",
    "list-item",
    "blockquote",
    "table",
    "code",
    "thematic-break",
    "attachment",
];

/// Which nodes may be moved by drag-reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragPolicy {
    /// Kind names (as reported by [`NodeKind::name`]) that may be dragged.
    pub allowed: Vec<String>,
}

impl Default for DragPolicy {
    fn default() -> Self {
        Self {
            allowed: [
                "paragraph",
                "heading",
                "list-item",
                "blockquote",
                "table",
                "code",
                "thematic-break",
                "attachment",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl DragPolicy {
    /// Returns `true` if nodes of `kind` may be dragged.
    pub fn allows(&self, kind: &NodeKind) -> bool {
        self.allowed.iter().any(|name| name == kind.name())
    }
}

/// Tunables of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Unit inserted by code-line auto indent and removed by Shift+Tab.
    pub indent_unit: String,
    /// Code blocks longer than this (in chars) are not highlighted.
    pub max_highlight_chars: usize,
    /// Maximum number of undo steps kept.
    pub undo_levels: usize,
    /// Autosave debounce delay.
    pub autosave_delay_ms: u64,
    /// Blank-line runs at least this long between top-level blocks become empty paragraphs.
    pub blank_line_threshold: usize,
    /// Drag-reorder allow-set.
    pub drag: DragPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            indent_unit: "\t".to_string(),
            max_highlight_chars: 20_000,
            undo_levels: 100,
            autosave_delay_ms: 1_000,
            blank_line_threshold: 4,
            drag: DragPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indent_unit.is_empty() {
            return Err(ConfigError::EmptyIndentUnit);
        }
        if self.blank_line_threshold < 2 {
            return Err(ConfigError::BlankLineThreshold(self.blank_line_threshold));
        }
        if let Some(unknown) = self
            .drag
            .allowed
            .iter()
            .find(|name| !DRAGGABLE_KINDS.contains(&name.as_str()))
        {
            return Err(ConfigError::UnknownDragKind(unknown.clone()));
        }
        Ok(())
    }
}
