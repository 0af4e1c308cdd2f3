//! Standard output utilities for consistent command formatting

use colored::*;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color as TableColor, ContentArrangement, Table};

use crate::stage::StageState;

pub fn section_header(title: &str) {
    println!("\n{}", title.bold().cyan());
}

pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn info(message: &str) {
    println!("{} {}", "●".blue(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn empty(message: &str) {
    println!("{} {}", "◌".dimmed(), message);
}

/// Display a process/action message
pub fn action(message: &str) {
    println!("{} {}", "▶".cyan(), message);
}

/// Tree structure item
pub fn tree_item(is_last: bool, label: &str, value: Option<&str>) {
    let prefix = if is_last { "└─" } else { "├─" };
    if let Some(val) = value {
        println!("{} {}: {}", prefix.dimmed(), label, val);
    } else {
        println!("{} {}", prefix.dimmed(), label);
    }
}

/// Nested tree item under a non-last parent
pub fn tree_item_continued(is_last: bool, label: &str, value: &str) {
    let prefix = if is_last { "└─" } else { "├─" };
    println!("{}{} {}: {}", "│  ".dimmed(), prefix.dimmed(), label, value);
}

/// Stage state with its status colour
pub fn state_label(state: StageState) -> ColoredString {
    match state {
        StageState::NotStarted => state.as_str().dimmed(),
        StageState::Running => state.as_str().cyan(),
        StageState::Ok => state.as_str().green(),
        StageState::Error => state.as_str().red().bold(),
    }
}

pub fn create_standard_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .add_attribute(Attribute::Bold)
        .fg(TableColor::Cyan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_header() {
        let mut table = create_standard_table();
        table.set_header(vec![header_cell("Submission"), header_cell("Stage")]);
        table.add_row(vec!["sub1", "prepare"]);
        let rendered = table.to_string();
        assert!(rendered.contains("Submission"));
        assert!(rendered.contains("prepare"));
    }
}
