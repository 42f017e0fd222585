use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::{Database, FieldGap};
use crate::enrich::Enricher;
use crate::extract::ExtractorSet;
use crate::model::{FieldKey, FieldUpdate, SourceId, UniversityRecord};
use crate::normalize;
use crate::quality;
use crate::sources::dataset::{self, DatasetClient, QS_DATASET, THE_DATASET};
use crate::sources::directory;
use crate::sources::http::ScrapeClient;
use crate::sources::scorecard::ScorecardClient;
use crate::sources::{qs, the_rankings, wikipedia};
use crate::staleness::{self, Priority, TierLoad, REFRESHABLE};

/// Which ranking table an import run reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportSource {
    Qs,
    The,
}

/// How a refresh run picks its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Re-scrape every refreshable column, fresh or not.
    Full,
    /// Only columns whose tracked age is past the TTL.
    Incremental,
    /// One column, and only where it is stale.
    Field,
}

/// Counters for one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub processed: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Accepted changes per column slug.
    pub fields_updated: BTreeMap<String, u64>,
}

impl RunStats {
    pub fn record_fields(&mut self, fields: &[FieldKey]) {
        for field in fields {
            *self
                .fields_updated
                .entry(field.as_slug().to_string())
                .or_insert(0) += 1;
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        (self.updated as f64 / self.processed as f64) * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzeReport {
    pub total_rows: u64,
    pub gaps: Vec<FieldGap>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReport {
    pub total_rows: u64,
    pub tiers: Vec<TierLoad>,
}

/// Serial batch driver. One university is finished before the next starts;
/// the politeness delay between rows is the only throttle.
pub struct Runner<'a> {
    config: &'a Config,
    db: &'a Database,
    client: ScrapeClient,
    dry_run: bool,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a Config, db: &'a Database, dry_run: bool) -> Result<Self> {
        let client = ScrapeClient::new(&config.scrape)?;
        Ok(Self {
            config,
            db,
            client,
            dry_run,
        })
    }

    /// Imports a ranking table: download (or read the given CSV), normalize,
    /// upsert row by row keyed on (name, country).
    pub async fn import(
        &self,
        source: ImportSource,
        csv_path: Option<&Path>,
        force_download: bool,
        limit: Option<usize>,
    ) -> Result<RunStats> {
        let data = match csv_path {
            Some(path) => dataset::read_csv_lossy(path)?,
            None => {
                let cache_dir = self.config.resolved_data_dir().join("datasets");
                let datasets = DatasetClient::from_env(&cache_dir)?;
                let dataset_ref = match source {
                    ImportSource::Qs => &QS_DATASET,
                    ImportSource::The => &THE_DATASET,
                };
                let path = datasets
                    .download(&self.client, dataset_ref, force_download)
                    .await?;
                dataset::read_csv_lossy(&path)?
            }
        };

        let records = match source {
            ImportSource::Qs => qs::records_from_csv(&data, limit)?,
            ImportSource::The => the_rankings::records_from_csv(&data, limit)?,
        };
        let source_id = match source {
            ImportSource::Qs => SourceId::QsRankingsApi,
            ImportSource::The => SourceId::TheRankingsApi,
        };
        info!(rows = records.len(), source = %source_id, "parsed ranking table");

        let mut stats = RunStats::default();
        let now = Utc::now();
        for mut record in records {
            normalize::sanitize_record(&mut record);
            stamp_source_provenance(&mut record, source_id, now);
            stats.processed += 1;
            if self.dry_run {
                stats.updated += 1;
                continue;
            }
            match self.db.upsert_university(&record).await {
                Ok(outcome) => {
                    stats.updated += 1;
                    debug!(university = %record.display_label(), ?outcome, "imported");
                }
                Err(err) => {
                    error!(university = %record.display_label(), "import write failed: {err:#}");
                    stats.failed += 1;
                }
            }
        }
        self.log_summary(&stats);
        Ok(stats)
    }

    /// Imports US institutions from the government scorecard API: page
    /// through the filtered result set, normalize, upsert keyed on
    /// (name, country).
    pub async fn import_scorecard(
        &self,
        state: Option<&str>,
        limit: Option<usize>,
    ) -> Result<RunStats> {
        let scorecard = ScorecardClient::from_env()?;
        let records = scorecard.fetch_all(&self.client, state, limit).await?;
        info!(rows = records.len(), "fetched scorecard result set");

        let mut stats = RunStats::default();
        let now = Utc::now();
        for mut record in records {
            normalize::sanitize_record(&mut record);
            stamp_source_provenance(&mut record, SourceId::CollegeScorecardApi, now);
            stats.processed += 1;
            if self.dry_run {
                stats.updated += 1;
                continue;
            }
            match self.db.upsert_university(&record).await {
                Ok(outcome) => {
                    stats.updated += 1;
                    debug!(university = %record.display_label(), ?outcome, "imported");
                }
                Err(err) => {
                    error!(university = %record.display_label(), "import write failed: {err:#}");
                    stats.failed += 1;
                }
            }
        }
        self.log_summary(&stats);
        Ok(stats)
    }

    /// Seeds rows from the public university directory API. Fresh names are
    /// inserted whole; for rows already on file the directory's columns go
    /// through the confidence gate instead of overwriting the stored row.
    pub async fn seed_directory(&self, country: Option<&str>) -> Result<RunStats> {
        let records = directory::fetch_all(&self.client, country).await?;
        let mut stats = RunStats::default();
        let now = Utc::now();
        for mut record in records {
            normalize::sanitize_record(&mut record);
            stats.processed += 1;
            if self.dry_run {
                stats.updated += 1;
                continue;
            }
            let existing = match self
                .db
                .fetch_by_identity(&record.name, record.country.as_deref())
                .await
            {
                Ok(existing) => existing,
                Err(err) => {
                    error!(university = %record.display_label(), "seed lookup failed: {err:#}");
                    stats.failed += 1;
                    continue;
                }
            };
            match existing {
                None => {
                    stamp_source_provenance(&mut record, SourceId::UniversitiesListApi, now);
                    match self.db.upsert_university(&record).await {
                        Ok(_) => {
                            stats.updated += 1;
                            debug!(university = %record.display_label(), "seeded");
                        }
                        Err(err) => {
                            error!(university = %record.display_label(), "seed write failed: {err:#}");
                            stats.failed += 1;
                        }
                    }
                }
                Some(mut stored) => {
                    let applied = merge_directory_fields(&mut stored, &record, now);
                    if applied.is_empty() {
                        // Known row: nothing the gate would accept.
                        stats.skipped += 1;
                        continue;
                    }
                    match self.write_record(&stored).await {
                        Ok(()) => {
                            stats.updated += 1;
                            stats.record_fields(&applied);
                            debug!(
                                university = %stored.display_label(),
                                fields = applied.len(),
                                "reseeded"
                            );
                        }
                        Err(err) => {
                            error!(university = %stored.display_label(), "seed write failed: {err:#}");
                            stats.failed += 1;
                        }
                    }
                }
            }
        }
        self.log_summary(&stats);
        Ok(stats)
    }

    /// Fills one still-null column across a page of rows.
    pub async fn fill(
        &self,
        field: FieldKey,
        country: Option<&str>,
        limit: usize,
    ) -> Result<RunStats> {
        if !REFRESHABLE.contains(&field) {
            bail!("{field} only moves via imports; batch fill covers scrapeable columns");
        }
        let candidates = self.db.fetch_missing(field, country, limit).await?;
        info!(rows = candidates.len(), field = %field, "rows with the column still null");

        let extractors = ExtractorSet::with_defaults();
        let enricher = self.enricher();
        let mut stats = RunStats::default();
        let total = candidates.len();
        for mut record in candidates {
            stats.processed += 1;
            info!(
                university = %record.display_label(),
                progress = format!("{}/{total}", stats.processed),
                "filling"
            );
            let applied = if matches!(field, FieldKey::Description | FieldKey::City) {
                self.fill_from_wikipedia(&extractors, &mut record, &[field])
                    .await
            } else {
                enricher.enrich(&mut record, &[field]).await
            };
            self.finish_row(&mut stats, &mut record, &applied).await;
            self.client.polite_sleep().await;
        }
        self.log_summary(&stats);
        Ok(stats)
    }

    /// Staleness-driven update pass over the oldest-scraped rows.
    pub async fn refresh(
        &self,
        mode: RefreshMode,
        field: Option<FieldKey>,
        priority: Option<Priority>,
        country: Option<&str>,
        limit: usize,
    ) -> Result<RunStats> {
        if mode == RefreshMode::Field && field.is_none() {
            bail!("field mode needs a column; pass --field");
        }
        let now = Utc::now();
        // The staleness maps live inside the row JSON, so candidates are
        // over-fetched and filtered here rather than in the query.
        let pool = self.db.fetch_for_refresh(country, limit * 3).await?;
        let mut candidates: Vec<(UniversityRecord, Vec<FieldKey>)> = Vec::new();
        for record in pool {
            if let Some(priority) = priority {
                if staleness::priority_for(&record) != priority {
                    continue;
                }
            }
            let wanted = wanted_for(&record, mode, field, now);
            if wanted.is_empty() {
                continue;
            }
            candidates.push((record, wanted));
            if candidates.len() == limit {
                break;
            }
        }
        if candidates.is_empty() {
            info!("nothing is stale; no rows to refresh");
            return Ok(RunStats::default());
        }
        info!(rows = candidates.len(), ?mode, "rows needing a refresh");

        let extractors = ExtractorSet::with_defaults();
        let enricher = self.enricher();
        let mut stats = RunStats::default();
        let total = candidates.len();
        for (mut record, wanted) in candidates {
            stats.processed += 1;
            info!(
                university = %record.display_label(),
                progress = format!("{}/{total}", stats.processed),
                fields = wanted.len(),
                "refreshing"
            );
            // Description and city come from the encyclopedia; the fallback
            // chain handles everything else.
            let (wiki_fields, chain_fields): (Vec<FieldKey>, Vec<FieldKey>) = wanted
                .iter()
                .copied()
                .partition(|field| matches!(*field, FieldKey::Description | FieldKey::City));
            let mut applied = Vec::new();
            if !chain_fields.is_empty() {
                applied.extend(enricher.enrich(&mut record, &chain_fields).await);
            }
            if !wiki_fields.is_empty() {
                applied.extend(
                    self.fill_from_wikipedia(&extractors, &mut record, &wiki_fields)
                        .await,
                );
            }
            self.finish_row(&mut stats, &mut record, &applied).await;
            self.client.polite_sleep().await;
        }
        self.log_summary(&stats);
        Ok(stats)
    }

    /// Per-column null counts for coverage planning.
    pub async fn analyze(&self) -> Result<AnalyzeReport> {
        let total_rows = self.db.count_rows().await?;
        info!(total_rows, "counting nulls per column");
        let mut gaps = Vec::new();
        for field in REFRESHABLE {
            let missing = self.db.count_missing(field).await?;
            gaps.push(FieldGap {
                field,
                missing,
                total: total_rows,
            });
        }
        gaps.sort_by(|a, b| b.missing.cmp(&a.missing));
        Ok(AnalyzeReport { total_rows, gaps })
    }

    /// Steady-state workload projection per priority tier.
    pub async fn schedule_report(&self) -> Result<ScheduleReport> {
        let total_rows = self.db.count_rows().await?;
        Ok(ScheduleReport {
            total_rows,
            tiers: staleness::schedule_projection(total_rows),
        })
    }

    fn enricher(&self) -> Enricher {
        Enricher::with_defaults(
            &self.client,
            &self.config.resolved_data_dir(),
            self.config.scrape.max_pages_per_site,
        )
    }

    /// Encyclopedia pass for the fields the fallback chain cannot mine.
    async fn fill_from_wikipedia(
        &self,
        extractors: &ExtractorSet,
        record: &mut UniversityRecord,
        wanted: &[FieldKey],
    ) -> Vec<FieldKey> {
        let page = match wikipedia::lookup(&self.client, &record.name).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                debug!(university = %record.display_label(), "no encyclopedia page found");
                return Vec::new();
            }
            Err(err) => {
                warn!(university = %record.display_label(), "encyclopedia lookup failed: {err:#}");
                return Vec::new();
            }
        };
        let now = Utc::now();
        let mut applied = Vec::new();
        for update in wikipedia::updates_from_page(&page, wanted, extractors) {
            if quality::apply_update(record, &update, now) {
                applied.push(update.field);
            }
        }
        applied
    }

    /// Books one scraped row: stats, scrape timestamp, write-back.
    async fn finish_row(
        &self,
        stats: &mut RunStats,
        record: &mut UniversityRecord,
        applied: &[FieldKey],
    ) {
        if applied.is_empty() {
            debug!(university = %record.display_label(), "no new data");
            stats.skipped += 1;
            return;
        }
        record.last_scraped_at = Some(Utc::now());
        stats.record_fields(applied);
        if self.dry_run {
            stats.updated += 1;
            return;
        }
        match self.write_record(record).await {
            Ok(()) => {
                stats.updated += 1;
                info!(
                    university = %record.display_label(),
                    fields = applied.len(),
                    "updated"
                );
            }
            Err(err) => {
                error!(university = %record.display_label(), "write failed: {err:#}");
                stats.failed += 1;
            }
        }
    }

    async fn write_record(&self, record: &UniversityRecord) -> Result<()> {
        match record.id {
            Some(id) => {
                let mut row = record.to_row();
                row.remove("id");
                self.db
                    .query()
                    .eq("id", &id.to_string())
                    .update(&Value::Object(row))
                    .await
            }
            None => self.db.upsert_university(record).await.map(|_| ()),
        }
    }

    fn log_summary(&self, stats: &RunStats) {
        info!(
            processed = stats.processed,
            updated = stats.updated,
            skipped = stats.skipped,
            failed = stats.failed,
            success_rate = format!("{:.1}%", stats.success_rate()),
            "run finished"
        );
        for (field, count) in &stats.fields_updated {
            info!(field = field.as_str(), count = *count, "column updated");
        }
        if self.dry_run {
            info!("dry run: nothing was written");
        }
    }
}

/// Field list one record gets in a refresh run.
fn wanted_for(
    record: &UniversityRecord,
    mode: RefreshMode,
    field: Option<FieldKey>,
    now: DateTime<Utc>,
) -> Vec<FieldKey> {
    match mode {
        RefreshMode::Full => REFRESHABLE.to_vec(),
        RefreshMode::Incremental => {
            // Tier interval gates the whole record before per-field TTLs run.
            if !staleness::needs_refresh(record, now) {
                return Vec::new();
            }
            staleness::stale_fields(record, &REFRESHABLE, now)
        }
        RefreshMode::Field => match field {
            Some(field) if staleness::field_is_stale(record, field, now) => vec![field],
            _ => Vec::new(),
        },
    }
}

/// Directory columns a row already on file may receive. Each one runs
/// through the confidence gate, so a reseed never clobbers scraped values.
fn merge_directory_fields(
    stored: &mut UniversityRecord,
    incoming: &UniversityRecord,
    now: DateTime<Utc>,
) -> Vec<FieldKey> {
    let mut applied = Vec::new();
    for field in [FieldKey::Website, FieldKey::State] {
        let Some(value) = incoming.get(field) else {
            continue;
        };
        let update = FieldUpdate::new(field, value, SourceId::UniversitiesListApi);
        if quality::apply_update(stored, &update, now) {
            applied.push(field);
        }
    }
    applied
}

/// Imports own every column they set; stamping provenance gives a later
/// scrape a confidence it has to beat.
fn stamp_source_provenance(record: &mut UniversityRecord, source: SourceId, now: DateTime<Utc>) {
    for field in FieldKey::ALL {
        if matches!(field, FieldKey::Name | FieldKey::Country) {
            continue;
        }
        if let Some(value) = record.get(field) {
            let confidence = quality::score_value(field, source, &value, None);
            record.record_provenance(field, source, confidence, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::FieldValue;

    fn imported_record() -> UniversityRecord {
        let mut record = UniversityRecord::new("Test U", Some("FR".to_string()));
        record.global_rank = Some(51);
        record.qs_score = Some(96.5);
        record.description = Some("Test U is a higher education institution in France.".to_string());
        record
    }

    #[test]
    fn provenance_is_stamped_for_set_columns_only() {
        let mut record = imported_record();
        let now = Utc::now();
        stamp_source_provenance(&mut record, SourceId::QsRankingsApi, now);

        assert_eq!(
            record.data_sources.get("global_rank").map(String::as_str),
            Some("qs_rankings_api")
        );
        assert_eq!(record.last_updated_for(FieldKey::QsScore), Some(now));
        assert!(record.confidence_for(FieldKey::GlobalRank).is_some());
        // Identity columns and unset columns carry no tracking entries.
        assert!(!record.data_sources.contains_key("name"));
        assert!(!record.data_sources.contains_key("acceptance_rate"));
    }

    #[test]
    fn full_mode_targets_every_refreshable_column() {
        let record = imported_record();
        let wanted = wanted_for(&record, RefreshMode::Full, None, Utc::now());
        assert_eq!(wanted.len(), REFRESHABLE.len());
    }

    #[test]
    fn incremental_mode_skips_fresh_columns() {
        let mut record = imported_record();
        let now = Utc::now();
        record.set(FieldKey::AcceptanceRate, FieldValue::Float(18.0));
        record.record_provenance(FieldKey::AcceptanceRate, SourceId::DirectWebsite, 0.9, now);

        let wanted = wanted_for(&record, RefreshMode::Incremental, None, now);
        assert!(!wanted.contains(&FieldKey::AcceptanceRate));
        assert!(wanted.contains(&FieldKey::Website));
    }

    #[test]
    fn incremental_mode_honours_the_record_recheck_interval() {
        let mut record = imported_record();
        let now = Utc::now();
        // Rank 51 puts the record in the critical tier: 30 day interval.
        record.last_scraped_at = Some(now - Duration::days(1));

        // Columns are stale by TTL, but the record was just scraped.
        let wanted = wanted_for(&record, RefreshMode::Incremental, None, now);
        assert!(wanted.is_empty());

        record.last_scraped_at = Some(now - Duration::days(40));
        let wanted = wanted_for(&record, RefreshMode::Incremental, None, now);
        assert!(!wanted.is_empty());

        // Never-scraped rows are always due.
        record.last_scraped_at = None;
        let wanted = wanted_for(&record, RefreshMode::Incremental, None, now);
        assert!(!wanted.is_empty());
    }

    #[test]
    fn field_mode_respects_the_ttl() {
        let mut record = imported_record();
        let now = Utc::now();
        record.set(FieldKey::Website, FieldValue::Text("https://test.edu".to_string()));
        record.record_provenance(
            FieldKey::Website,
            SourceId::DirectWebsite,
            0.9,
            now - Duration::days(10),
        );

        // Ten days old against a 180 day TTL: nothing to do.
        let fresh = wanted_for(&record, RefreshMode::Field, Some(FieldKey::Website), now);
        assert!(fresh.is_empty());

        // An untracked column is treated as stale.
        let stale = wanted_for(&record, RefreshMode::Field, Some(FieldKey::TuitionOutState), now);
        assert_eq!(stale, vec![FieldKey::TuitionOutState]);
    }

    #[test]
    fn directory_reseed_cannot_downgrade_scraped_values() {
        let now = Utc::now();
        let mut stored = UniversityRecord::new("Test U", Some("US".to_string()));
        stored.set(
            FieldKey::Website,
            FieldValue::Text("https://www.test.edu".to_string()),
        );
        stored.record_provenance(FieldKey::Website, SourceId::DirectWebsite, 0.95, now);

        let mut incoming = UniversityRecord::new("Test U", Some("US".to_string()));
        incoming.set(
            FieldKey::Website,
            FieldValue::Text("http://test.example.org".to_string()),
        );
        incoming.set(FieldKey::State, FieldValue::Text("Ohio".to_string()));

        let applied = merge_directory_fields(&mut stored, &incoming, now);
        // The scraped website outscores the directory; the empty state
        // column takes the directory value.
        assert_eq!(applied, vec![FieldKey::State]);
        assert_eq!(stored.website.as_deref(), Some("https://www.test.edu"));
        assert_eq!(stored.state.as_deref(), Some("Ohio"));
        assert_eq!(
            stored.data_sources.get("state").map(String::as_str),
            Some("universities_list_api")
        );
    }

    #[test]
    fn stats_track_per_column_counts() {
        let mut stats = RunStats::default();
        stats.record_fields(&[FieldKey::Website, FieldKey::AcceptanceRate]);
        stats.record_fields(&[FieldKey::Website]);
        assert_eq!(stats.fields_updated.get("website"), Some(&2));
        assert_eq!(stats.fields_updated.get("acceptance_rate"), Some(&1));

        stats.processed = 40;
        stats.updated = 32;
        assert!((stats.success_rate() - 80.0).abs() < 1e-9);
        assert_eq!(RunStats::default().success_rate(), 0.0);
    }
}
