use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::runner::{AnalyzeReport, RunStats, ScheduleReport};

pub fn render_analyze_table(report: &AnalyzeReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Column", "Missing", "Have", "Coverage"]);

    for gap in &report.gaps {
        let pct = gap.coverage_pct();
        let coverage_cell = if pct >= 90.0 {
            Cell::new(format!("{pct:.1}%")).fg(Color::Green)
        } else if pct < 50.0 {
            Cell::new(format!("{pct:.1}%")).fg(Color::Red)
        } else {
            Cell::new(format!("{pct:.1}%"))
        };
        table.add_row(Row::from(vec![
            Cell::new(gap.field.as_slug()),
            Cell::new(gap.missing.to_string()),
            Cell::new(gap.have().to_string()),
            coverage_cell,
        ]));
    }
    table.to_string()
}

pub fn render_schedule_table(report: &ScheduleReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Tier",
        "Records",
        "Re-check (days)",
        "Scrapes per day",
    ]);

    for tier in &report.tiers {
        table.add_row(Row::from(vec![
            Cell::new(tier.priority.to_string()),
            Cell::new(tier.records.to_string()),
            Cell::new(tier.interval_days.to_string()),
            Cell::new(format!("{:.1}", tier.scrapes_per_day)),
        ]));
    }
    table.to_string()
}

pub fn render_stats_table(stats: &RunStats) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Metric", "Value"]);

    let failed_cell = if stats.failed > 0 {
        Cell::new(stats.failed.to_string()).fg(Color::Red)
    } else {
        Cell::new(stats.failed.to_string())
    };
    table.add_row(Row::from(vec![
        Cell::new("processed"),
        Cell::new(stats.processed.to_string()),
    ]));
    table.add_row(Row::from(vec![
        Cell::new("updated"),
        Cell::new(stats.updated.to_string()).fg(Color::Green),
    ]));
    table.add_row(Row::from(vec![
        Cell::new("skipped"),
        Cell::new(stats.skipped.to_string()),
    ]));
    table.add_row(Row::from(vec![Cell::new("failed"), failed_cell]));
    table.add_row(Row::from(vec![
        Cell::new("success rate"),
        Cell::new(format!("{:.1}%", stats.success_rate())),
    ]));
    table.to_string()
}

/// Per-column acceptance counts; empty when the run changed nothing.
pub fn render_fields_table(stats: &RunStats) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Column", "Updates"]);

    for (field, count) in &stats.fields_updated {
        table.add_row(Row::from(vec![
            Cell::new(field),
            Cell::new(count.to_string()),
        ]));
    }
    table.to_string()
}
