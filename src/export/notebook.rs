//! Notebook rendering
//!
//! Serializes cells to the standard notebook interchange document
//! (nbformat 4.5) and parses such documents back into the cell list. Code
//! cells carry their captured output as a stream output block.

use serde_json::{json, Value};

use super::{Cell, CellKind};
use crate::error::Result;

/// Render cells as a pretty-printed notebook document
pub fn render_notebook(cells: &[Cell]) -> String {
    let cell_values: Vec<Value> = cells.iter().map(render_cell).collect();
    let document = json!({
        "cells": cell_values,
        "metadata": {
            "kernelspec": {
                "display_name": "Python 3",
                "language": "python",
                "name": "python3"
            },
            "language_info": {
                "name": "python"
            }
        },
        "nbformat": 4,
        "nbformat_minor": 5
    });
    serde_json::to_string_pretty(&document).unwrap_or_default()
}

fn render_cell(cell: &Cell) -> Value {
    let source = source_lines(&cell.content);
    match cell.kind {
        CellKind::Markdown => json!({
            "cell_type": "markdown",
            "metadata": {},
            "source": source
        }),
        CellKind::Code => {
            let outputs = match cell.output.as_deref() {
                Some(text) if !text.is_empty() => json!([{
                    "output_type": "stream",
                    "name": "stdout",
                    "text": source_lines(text)
                }]),
                _ => json!([]),
            };
            json!({
                "cell_type": "code",
                "execution_count": null,
                "metadata": {},
                "outputs": outputs,
                "source": source
            })
        }
    }
}

/// Parse a notebook document back into the ordered cell list
///
/// Tolerates both line-array and plain-string source fields. A document
/// without a cell array parses as empty.
pub fn parse_notebook(document: &str) -> Result<Vec<Cell>> {
    let value: Value = serde_json::from_str(document)?;
    let Some(cell_values) = value.get("cells").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut cells = Vec::with_capacity(cell_values.len());
    for cell_value in cell_values {
        let kind = match cell_value.get("cell_type").and_then(Value::as_str) {
            Some("markdown") => CellKind::Markdown,
            _ => CellKind::Code,
        };
        let content = join_text(cell_value.get("source"));
        let output = match kind {
            CellKind::Code => first_stream_output(cell_value),
            CellKind::Markdown => None,
        };
        cells.push(Cell {
            kind,
            content,
            output,
        });
    }
    Ok(cells)
}

/// Split text into the line array form the document format uses, keeping
/// line terminators
fn source_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

fn join_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(lines)) => lines.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

fn first_stream_output(cell: &Value) -> Option<String> {
    for output in cell.get("outputs")?.as_array()? {
        if output.get("output_type").and_then(Value::as_str) == Some("stream") {
            let text = join_text(output.get("text"));
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}
