//! Cell Export
//!
//! Pure renderers from an ordered cell sequence to shareable documents:
//! - render_script() - one runnable, `# %%`-delimited interpreter script
//! - render_notebook() - structured notebook document (nbformat 4.5)
//!
//! Rendering never touches executor state and never fails; empty input
//! produces a well-formed empty document.

mod notebook;
mod script;

pub use notebook::{parse_notebook, render_notebook};
pub use script::render_script;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Code,
    Markdown,
}

/// One exportable cell: source content plus optionally its captured output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub kind: CellKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Cell {
    pub fn code(content: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Code,
            content: content.into(),
            output: None,
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Markdown,
            content: content.into(),
            output: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// Load an ordered cell list from a JSON array file
pub async fn load_cells(path: &Path) -> Result<Vec<Cell>> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}
