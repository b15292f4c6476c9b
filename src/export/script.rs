//! Script rendering
//!
//! Flattens a cell sequence into one interpreter-runnable script. Cells are
//! delimited with `# %%` markers; markdown cells ride along as triple-quoted
//! blocks so the result stays directly executable.

use super::{Cell, CellKind};

/// Render cells as one `# %%`-delimited script
pub fn render_script(cells: &[Cell]) -> String {
    if cells.is_empty() {
        return String::new();
    }

    let sections: Vec<String> = cells
        .iter()
        .map(|cell| match cell.kind {
            CellKind::Code => format!("# %%\n{}", cell.content),
            CellKind::Markdown => format!("# %% [markdown]\n\"\"\"\n{}\n\"\"\"", cell.content),
        })
        .collect();

    let mut script = sections.join("\n\n");
    script.push('\n');
    script
}
