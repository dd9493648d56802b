use std::fmt::Write as _;

use platform_db::StageChange;
use products_crm::{BoardView, Deal, StageRegistry};

pub fn amount(minor_units: i64) -> String {
    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

pub fn stages(registry: &StageRegistry) -> String {
    let mut out = String::new();
    for stage in registry.ordered_stages() {
        let marker = if stage.is_terminal() { " (closed)" } else { "" };
        let _ = writeln!(
            out,
            "{:>4}  {:<20} {:>3}%{marker}",
            stage.order, stage.name, stage.default_probability
        );
    }
    out
}

fn deal_line(out: &mut String, deal: &Deal) {
    let value = deal.value.map(amount).unwrap_or_else(|| "-".to_string());
    let contact = deal.contact.as_deref().unwrap_or("");
    let _ = writeln!(
        out,
        "    {}  {:<32} {:>12}  {}",
        deal.id, deal.title, value, contact
    );
}

pub fn board(view: &BoardView) -> String {
    let mut out = String::new();
    for column in &view.columns {
        let _ = writeln!(
            out,
            "{} [{}] total {} expected {}",
            column.stage.name,
            column.count,
            amount(column.total_value),
            amount(column.expected_value)
        );
        for deal in &column.deals {
            deal_line(&mut out, deal);
        }
    }
    if !view.uncategorized.is_empty() {
        let _ = writeln!(out, "Uncategorized [{}]", view.uncategorized.len());
        for deal in &view.uncategorized {
            deal_line(&mut out, deal);
        }
    }
    let _ = writeln!(
        out,
        "{} deals, total {}, expected {}",
        view.total_count,
        amount(view.total_value),
        amount(view.total_expected_value)
    );
    out
}

pub fn history(changes: &[StageChange]) -> String {
    if changes.is_empty() {
        return "no stage changes recorded\n".to_string();
    }
    let mut out = String::new();
    for change in changes {
        let from = change
            .from_stage
            .as_ref()
            .map(|stage| stage.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{}  {} -> {} ({}%)",
            change.changed_at.format("%Y-%m-%d %H:%M:%S"),
            from,
            change.to_stage,
            change.probability
        );
    }
    out
}
