//! Output formatting for CLI commands

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

/// Format a byte count in human-readable form
///
/// Examples:
/// - 500 -> "500 B"
/// - 1536000 -> "1.5 MB"
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Shorten a digest for table display
pub fn short_fingerprint(fingerprint: &str) -> String {
    if fingerprint.len() > 12 && fingerprint.is_ascii() {
        format!("{}…", &fingerprint[..12])
    } else {
        fingerprint.to_string()
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);
    table
}

/// Print a table with a highlighted header row
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = new_table(headers);
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

/// Print a table where each cell may carry a color
pub fn print_table_colored(headers: &[&str], rows: Vec<Vec<(String, Option<Color>)>>) {
    let mut table = new_table(headers);
    for row in rows {
        let cells: Vec<Cell> = row
            .into_iter()
            .map(|(text, color)| match color {
                Some(c) => Cell::new(text).fg(c),
                None => Cell::new(text),
            })
            .collect();
        table.add_row(cells);
    }
    println!("{table}");
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
