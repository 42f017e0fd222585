use anyhow::Result;

use crate::runner::{AnalyzeReport, RunStats, ScheduleReport};

pub fn analyze_to_csv(report: &AnalyzeReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["field", "missing", "have", "coverage_pct"])?;
    for gap in &report.gaps {
        writer.write_record([
            gap.field.as_slug().to_string(),
            gap.missing.to_string(),
            gap.have().to_string(),
            format!("{:.1}", gap.coverage_pct()),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn schedule_to_csv(report: &ScheduleReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["tier", "records", "interval_days", "scrapes_per_day"])?;
    for tier in &report.tiers {
        writer.write_record([
            tier.priority.to_string(),
            tier.records.to_string(),
            tier.interval_days.to_string(),
            format!("{:.1}", tier.scrapes_per_day),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn stats_to_csv(stats: &RunStats) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["metric", "value"])?;
    writer.write_record(["processed".to_string(), stats.processed.to_string()])?;
    writer.write_record(["updated".to_string(), stats.updated.to_string()])?;
    writer.write_record(["skipped".to_string(), stats.skipped.to_string()])?;
    writer.write_record(["failed".to_string(), stats.failed.to_string()])?;
    writer.write_record([
        "success_rate".to_string(),
        format!("{:.1}", stats.success_rate()),
    ])?;
    for (field, count) in &stats.fields_updated {
        writer.write_record([format!("updated_{field}"), count.to_string()])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
