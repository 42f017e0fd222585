use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{FieldKey, UniversityRecord};

/// Fields the refresh loop will try to re-scrape. Identity fields, state,
/// ranking columns, and earnings figures are excluded: nothing in the scrape
/// chain can produce them, they only move via imports and seeding.
pub const REFRESHABLE: [FieldKey; 20] = [
    FieldKey::City,
    FieldKey::Website,
    FieldKey::LogoUrl,
    FieldKey::UniversityType,
    FieldKey::LocationType,
    FieldKey::Description,
    FieldKey::AcceptanceRate,
    FieldKey::SatMath25,
    FieldKey::SatMath75,
    FieldKey::SatVerbal25,
    FieldKey::SatVerbal75,
    FieldKey::ActComposite25,
    FieldKey::ActComposite75,
    FieldKey::GpaAverage,
    FieldKey::TuitionInState,
    FieldKey::TuitionOutState,
    FieldKey::TotalCost,
    FieldKey::GraduationRate4Year,
    FieldKey::GraduationRate6Year,
    FieldKey::TotalStudents,
];

/// Days before a field's value is considered stale. Hand-picked per field;
/// anything unlisted falls back to 90 days.
pub fn ttl_days(field: FieldKey) -> i64 {
    match field {
        FieldKey::Website => 180,
        FieldKey::LogoUrl => 730,
        FieldKey::Name => 9999,
        FieldKey::Country => 9999,
        FieldKey::City => 365,
        FieldKey::State => 365,
        FieldKey::AcceptanceRate => 365,
        FieldKey::TuitionOutState => 365,
        FieldKey::GraduationRate4Year => 365,
        FieldKey::GlobalRank => 365,
        FieldKey::NationalRank => 365,
        FieldKey::TotalStudents => 180,
        FieldKey::UniversityType => 730,
        FieldKey::LocationType => 730,
        FieldKey::Description => 90,
        _ => 90,
    }
}

/// Pure staleness test: stale when never recorded or older than the TTL.
pub fn is_stale(now: DateTime<Utc>, last_updated: Option<DateTime<Utc>>, ttl: i64) -> bool {
    match last_updated {
        None => true,
        Some(last) => (now - last).num_days() > ttl,
    }
}

pub fn field_is_stale(record: &UniversityRecord, field: FieldKey, now: DateTime<Utc>) -> bool {
    is_stale(now, record.last_updated_for(field), ttl_days(field))
}

/// Stale subset of `candidates` for one record, in candidate order.
pub fn stale_fields(
    record: &UniversityRecord,
    candidates: &[FieldKey],
    now: DateTime<Utc>,
) -> Vec<FieldKey> {
    candidates
        .iter()
        .filter(|field| field_is_stale(record, **field, now))
        .copied()
        .collect()
}

/// Re-check cadence class for a university.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Whole-record re-check interval in days.
    pub fn recheck_days(&self) -> i64 {
        match self {
            Self::Critical => 30,
            Self::High => 90,
            Self::Medium => 180,
            Self::Low => 365,
        }
    }

    /// Rough share of the directory expected to land in this tier.
    pub fn directory_share(&self) -> f64 {
        match self {
            Self::Critical => 0.05,
            Self::High => 0.15,
            Self::Medium => 0.50,
            Self::Low => 0.30,
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown priority: {0}")]
pub struct PriorityParseError(pub String);

impl FromStr for Priority {
    type Err = PriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(PriorityParseError(s.to_string())),
        }
    }
}

const FAMOUS_NAMES: [&str; 10] = [
    "harvard",
    "stanford",
    "mit",
    "oxford",
    "cambridge",
    "yale",
    "princeton",
    "columbia",
    "berkeley",
    "caltech",
];

/// Priority from global rank with a famous-name override. Compared as whole
/// name tokens so "Smith College" does not trip on "mit".
pub fn priority_for(record: &UniversityRecord) -> Priority {
    let lowered = record.name.to_ascii_lowercase();
    let mut tokens = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty());
    if tokens.any(|token| FAMOUS_NAMES.contains(&token)) {
        return Priority::Critical;
    }
    match record.global_rank {
        Some(rank) if rank <= 100 => Priority::Critical,
        Some(rank) if rank <= 500 => Priority::High,
        Some(rank) if rank <= 2000 => Priority::Medium,
        Some(_) => Priority::Low,
        None => Priority::Medium,
    }
}

/// Record-level re-check: due when never scraped or older than the tier
/// interval.
pub fn needs_refresh(record: &UniversityRecord, now: DateTime<Utc>) -> bool {
    is_stale(now, record.last_scraped_at, priority_for(record).recheck_days())
}

/// Projected steady-state workload for one tier.
#[derive(Debug, Clone, Serialize)]
pub struct TierLoad {
    pub priority: Priority,
    pub records: u64,
    pub interval_days: i64,
    pub scrapes_per_day: f64,
}

/// Expected workload per tier for a directory of `total_records` rows, using
/// the assumed tier distribution. Used by the `schedule` report.
pub fn schedule_projection(total_records: u64) -> Vec<TierLoad> {
    Priority::ALL
        .iter()
        .map(|priority| {
            let records = (total_records as f64 * priority.directory_share()).round() as u64;
            let interval_days = priority.recheck_days();
            TierLoad {
                priority: *priority,
                records,
                interval_days,
                scrapes_per_day: records as f64 / interval_days as f64,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::extract::ExtractorSet;
    use crate::model::{FieldKey, UniversityRecord};

    #[test]
    fn every_refreshable_column_has_a_scrape_producer() {
        let extractors = ExtractorSet::with_defaults();
        for field in REFRESHABLE {
            // Description, city, and logo come from the encyclopedia and the
            // site crawl rather than a regex extractor.
            let covered = extractors.for_field(field).is_some()
                || matches!(
                    field,
                    FieldKey::Description | FieldKey::City | FieldKey::LogoUrl
                );
            assert!(covered, "no producer for {field}");
        }
        assert!(!REFRESHABLE.contains(&FieldKey::State));
    }

    #[test]
    fn never_recorded_is_stale() {
        assert!(is_stale(Utc::now(), None, 365));
    }

    #[test]
    fn staleness_depends_only_on_age_and_ttl() {
        let now = Utc::now();
        assert!(is_stale(now, Some(now - Duration::days(100)), 90));
        assert!(!is_stale(now, Some(now - Duration::days(10)), 90));
        assert!(!is_stale(now, Some(now - Duration::days(90)), 90));
    }

    #[test]
    fn ttl_table_matches_field_families() {
        assert_eq!(ttl_days(FieldKey::Website), 180);
        assert_eq!(ttl_days(FieldKey::LogoUrl), 730);
        assert_eq!(ttl_days(FieldKey::Description), 90);
        assert_eq!(ttl_days(FieldKey::Name), 9999);
        // unlisted fields use the default
        assert_eq!(ttl_days(FieldKey::GpaAverage), 90);
    }

    #[test]
    fn rank_tiers_map_to_priorities() {
        let mut record = UniversityRecord::new("Example University", Some("US".into()));
        record.global_rank = Some(100);
        assert_eq!(priority_for(&record), Priority::Critical);
        record.global_rank = Some(101);
        assert_eq!(priority_for(&record), Priority::High);
        record.global_rank = Some(500);
        assert_eq!(priority_for(&record), Priority::High);
        record.global_rank = Some(2000);
        assert_eq!(priority_for(&record), Priority::Medium);
        record.global_rank = Some(2001);
        assert_eq!(priority_for(&record), Priority::Low);
        record.global_rank = None;
        assert_eq!(priority_for(&record), Priority::Medium);
    }

    #[test]
    fn famous_names_force_critical() {
        let record = UniversityRecord::new("University of Oxford", Some("GB".into()));
        assert_eq!(priority_for(&record), Priority::Critical);
        let unranked = UniversityRecord::new("Smith College", Some("US".into()));
        assert_eq!(priority_for(&unranked), Priority::Medium);
    }

    #[test]
    fn stale_fields_filters_by_per_field_ttl() {
        let now = Utc::now();
        let mut record = UniversityRecord::new("Test U", Some("US".into()));
        record
            .field_last_updated
            .insert("website".to_string(), now - Duration::days(200));
        record
            .field_last_updated
            .insert("description".to_string(), now - Duration::days(10));
        let stale = stale_fields(
            &record,
            &[FieldKey::Website, FieldKey::Description, FieldKey::City],
            now,
        );
        assert_eq!(stale, vec![FieldKey::Website, FieldKey::City]);
    }

    #[test]
    fn projection_covers_whole_directory() {
        let loads = schedule_projection(10_000);
        let total: u64 = loads.iter().map(|l| l.records).sum();
        assert_eq!(total, 10_000);
        assert!(loads[0].scrapes_per_day > loads[3].scrapes_per_day);
    }
}
