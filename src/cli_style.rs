/*!
 * CLI output styling for notaryd
 */

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};
use notary_connect::DrainReport;

use crate::service::Health;

/// Brand colors for consistent styling
pub struct Theme;

impl Theme {
    pub fn primary<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan()
    }

    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }
}

/// Unicode icons for visual feedback
pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const INFO: &'static str = "ℹ";
    pub const ARROW_RIGHT: &'static str = "→";
}

/// Create a minimal table (no outer borders)
pub fn create_minimal_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_NO_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Create a key-value table
pub fn stats_table(items: &[(&str, String)]) -> Table {
    let mut table = create_minimal_table();

    for (key, value) in items {
        table.add_row(vec![
            Cell::new(key).fg(Color::Cyan),
            Cell::new(value)
                .fg(Color::White)
                .add_attribute(Attribute::Bold),
        ]);
    }

    table
}

pub fn health_table(health: &Health) -> Table {
    stats_table(&[
        ("Status", health.status.clone()),
        ("Version", health.version.clone()),
        ("Enrolled", yes_no(health.enrolled)),
        ("Device", health.device_id.clone()),
        ("Signer", format!("{} ({})", health.signer, health.key_vault)),
        ("Pending spans", health.pending_count.to_string()),
    ])
}

pub fn drain_table(report: &DrainReport) -> Table {
    let mut items = vec![
        ("Attempted", report.attempted.to_string()),
        ("Delivered", report.delivered.to_string()),
        ("Dead-lettered", report.abandoned.to_string()),
        ("Remaining", report.remaining.to_string()),
    ];
    if let Some(failure) = &report.failure {
        items.push(("Stopped by", failure.clone()));
    }
    stats_table(&items)
}

fn yes_no(value: bool) -> String {
    if value {
        format!("{} yes", Icons::SUCCESS)
    } else {
        format!("{} no", Icons::ERROR)
    }
}

/// Print a styled error message with optional suggestion
pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!(
        "\n{} {}",
        Theme::error(format!("{} Error:", Icons::ERROR)),
        message
    );

    if let Some(hint) = suggestion {
        eprintln!(
            "  {} {}",
            Theme::muted(Icons::ARROW_RIGHT),
            Theme::muted(hint)
        );
    }
    eprintln!();
}

pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        Theme::warning(Icons::WARNING.to_string()),
        Theme::warning(message)
    );
}

pub fn print_success(message: &str) {
    println!(
        "{} {}",
        Theme::success(Icons::SUCCESS.to_string()),
        Theme::success(message)
    );
}

pub fn print_info(message: &str) {
    println!("{} {}", Theme::primary(Icons::INFO.to_string()), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_table_shows_failure_row() {
        let report = DrainReport {
            attempted: 1,
            failure: Some("Network error: refused".into()),
            remaining: 4,
            ..Default::default()
        };
        let rendered = drain_table(&report).to_string();
        assert!(rendered.contains("Stopped by"));
        assert!(rendered.contains("refused"));

        let clean = drain_table(&DrainReport::default()).to_string();
        assert!(!clean.contains("Stopped by"));
    }

    #[test]
    fn test_yes_no() {
        assert!(yes_no(true).ends_with("yes"));
        assert!(yes_no(false).ends_with("no"));
    }
}
