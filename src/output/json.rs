use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};

use crate::runner::AnalyzeReport;

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn analyze_to_json(report: &AnalyzeReport) -> Result<String> {
    let gaps: Vec<Value> = report
        .gaps
        .iter()
        .map(|gap| {
            json!({
                "field": gap.field.as_slug(),
                "missing": gap.missing,
                "have": gap.have(),
                "coverage_pct": (gap.coverage_pct() * 10.0).round() / 10.0,
            })
        })
        .collect();
    render_json(&json!({
        "total_rows": report.total_rows,
        "fields": gaps,
    }))
}
