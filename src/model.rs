use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Enrichable columns of a university row. Slugs match the database schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    Name,
    Country,
    City,
    State,
    Website,
    LogoUrl,
    UniversityType,
    LocationType,
    Description,
    AcceptanceRate,
    SatMath25,
    SatMath75,
    SatVerbal25,
    SatVerbal75,
    ActComposite25,
    ActComposite75,
    GpaAverage,
    TuitionInState,
    TuitionOutState,
    TotalCost,
    GraduationRate4Year,
    GraduationRate6Year,
    MedianEarnings10Yr,
    TotalStudents,
    GlobalRank,
    NationalRank,
    QsScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Float,
    Int,
}

impl FieldKey {
    pub const ALL: [FieldKey; 27] = [
        FieldKey::Name,
        FieldKey::Country,
        FieldKey::City,
        FieldKey::State,
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
        FieldKey::MedianEarnings10Yr,
        FieldKey::TotalStudents,
        FieldKey::GlobalRank,
        FieldKey::NationalRank,
        FieldKey::QsScore,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Country => "country",
            Self::City => "city",
            Self::State => "state",
            Self::Website => "website",
            Self::LogoUrl => "logo_url",
            Self::UniversityType => "university_type",
            Self::LocationType => "location_type",
            Self::Description => "description",
            Self::AcceptanceRate => "acceptance_rate",
            Self::SatMath25 => "sat_math_25",
            Self::SatMath75 => "sat_math_75",
            Self::SatVerbal25 => "sat_verbal_25",
            Self::SatVerbal75 => "sat_verbal_75",
            Self::ActComposite25 => "act_composite_25",
            Self::ActComposite75 => "act_composite_75",
            Self::GpaAverage => "gpa_average",
            Self::TuitionInState => "tuition_in_state",
            Self::TuitionOutState => "tuition_out_state",
            Self::TotalCost => "total_cost",
            Self::GraduationRate4Year => "graduation_rate_4year",
            Self::GraduationRate6Year => "graduation_rate_6year",
            Self::MedianEarnings10Yr => "median_earnings_10yr",
            Self::TotalStudents => "total_students",
            Self::GlobalRank => "global_rank",
            Self::NationalRank => "national_rank",
            Self::QsScore => "qs_score",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Name
            | Self::Country
            | Self::City
            | Self::State
            | Self::Website
            | Self::LogoUrl
            | Self::UniversityType
            | Self::LocationType
            | Self::Description => FieldKind::Text,
            Self::AcceptanceRate
            | Self::GpaAverage
            | Self::TuitionInState
            | Self::TuitionOutState
            | Self::TotalCost
            | Self::GraduationRate4Year
            | Self::GraduationRate6Year
            | Self::MedianEarnings10Yr
            | Self::QsScore => FieldKind::Float,
            Self::SatMath25
            | Self::SatMath75
            | Self::SatVerbal25
            | Self::SatVerbal75
            | Self::ActComposite25
            | Self::ActComposite75
            | Self::TotalStudents
            | Self::GlobalRank
            | Self::NationalRank => FieldKind::Int,
        }
    }

    /// Fields whose value identifies the institution rather than describing it.
    pub fn is_identifying(&self) -> bool {
        matches!(
            self,
            Self::Website | Self::Name | Self::City | Self::Country
        )
    }

    /// Categorical fields that free-text mining gets wrong most often.
    pub fn is_categorical(&self) -> bool {
        matches!(self, Self::UniversityType | Self::LocationType)
    }

    /// Numeric admissions/financial/outcome metrics.
    pub fn is_statistic(&self) -> bool {
        matches!(
            self,
            Self::AcceptanceRate
                | Self::SatMath25
                | Self::SatMath75
                | Self::SatVerbal25
                | Self::SatVerbal75
                | Self::ActComposite25
                | Self::ActComposite75
                | Self::GpaAverage
                | Self::TuitionInState
                | Self::TuitionOutState
                | Self::TotalCost
                | Self::GraduationRate4Year
                | Self::GraduationRate6Year
                | Self::MedianEarnings10Yr
                | Self::TotalStudents
        )
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown field: {0}")]
pub struct FieldKeyParseError(pub String);

impl FromStr for FieldKey {
    type Err = FieldKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        FieldKey::ALL
            .iter()
            .find(|key| key.as_slug() == normalized)
            .copied()
            .ok_or_else(|| FieldKeyParseError(s.to_string()))
    }
}

/// A typed scraped value. Strategies never hand around raw strings.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Float(f64),
    Int(i64),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Float(v) => serde_json::json!(v),
            Self::Int(v) => serde_json::json!(v),
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
        }
    }
}

/// Where a value came from. Priority and base confidence are fixed per source;
/// the quality tracker layers field-specific adjustments on top.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    DirectWebsite,
    CollegeScorecardApi,
    QsRankingsApi,
    TheRankingsApi,
    UniversitiesListApi,
    Wikipedia,
    SearchEngine,
}

impl SourceId {
    pub const ALL: [SourceId; 7] = [
        SourceId::DirectWebsite,
        SourceId::CollegeScorecardApi,
        SourceId::QsRankingsApi,
        SourceId::TheRankingsApi,
        SourceId::UniversitiesListApi,
        SourceId::Wikipedia,
        SourceId::SearchEngine,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::DirectWebsite => "direct_website",
            Self::CollegeScorecardApi => "college_scorecard_api",
            Self::QsRankingsApi => "qs_rankings_api",
            Self::TheRankingsApi => "the_rankings_api",
            Self::UniversitiesListApi => "universities_list_api",
            Self::Wikipedia => "wikipedia",
            Self::SearchEngine => "search_engine",
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            Self::DirectWebsite => 10,
            Self::CollegeScorecardApi => 9,
            Self::QsRankingsApi => 8,
            Self::TheRankingsApi => 8,
            Self::UniversitiesListApi => 7,
            Self::Wikipedia => 6,
            Self::SearchEngine => 5,
        }
    }

    pub fn base_confidence(&self) -> f64 {
        match self {
            Self::DirectWebsite => 0.85,
            Self::CollegeScorecardApi => 0.95,
            Self::QsRankingsApi => 0.90,
            Self::TheRankingsApi => 0.90,
            Self::UniversitiesListApi => 0.80,
            Self::Wikipedia => 0.70,
            Self::SearchEngine => 0.60,
        }
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown source: {0}")]
pub struct SourceIdParseError(pub String);

impl FromStr for SourceId {
    type Err = SourceIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        SourceId::ALL
            .iter()
            .find(|source| source.as_slug() == normalized)
            .copied()
            .ok_or_else(|| SourceIdParseError(s.to_string()))
    }
}

/// One accepted-or-pending change to a record, with provenance attached.
#[derive(Debug, Clone)]
pub struct FieldUpdate {
    pub field: FieldKey,
    pub value: FieldValue,
    pub source: SourceId,
    /// Pattern strength reported by the extractor, if any. Scales the
    /// source-based confidence; `None` means a fully trusted match.
    pub pattern_confidence: Option<f64>,
}

impl FieldUpdate {
    pub fn new(field: FieldKey, value: FieldValue, source: SourceId) -> Self {
        Self {
            field,
            value,
            source,
            pattern_confidence: None,
        }
    }

    pub fn with_pattern_confidence(mut self, confidence: f64) -> Self {
        self.pattern_confidence = Some(confidence);
        self
    }
}

/// A university row as stored in the hosted table. The three tracking maps
/// carry per-field provenance; map keys are field slugs so rows written by
/// older tooling (with columns this build does not model) still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniversityRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub university_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat_math_25: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat_math_75: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat_verbal_25: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat_verbal_75: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub act_composite_25: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub act_composite_75: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpa_average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuition_in_state: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuition_out_state: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graduation_rate_4year: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graduation_rate_6year: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_earnings_10yr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_students: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_rank: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_rank: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qs_score: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_sources: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_confidence: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_last_updated: BTreeMap<String, DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scraped_at: Option<DateTime<Utc>>,
}

impl UniversityRecord {
    pub fn new(name: impl Into<String>, country: Option<String>) -> Self {
        Self {
            name: name.into(),
            country,
            ..Self::default()
        }
    }

    pub fn display_label(&self) -> String {
        match &self.country {
            Some(country) => format!("{} ({country})", self.name),
            None => self.name.clone(),
        }
    }

    pub fn get(&self, key: FieldKey) -> Option<FieldValue> {
        match key {
            FieldKey::Name => Some(FieldValue::Text(self.name.clone())),
            FieldKey::Country => self.country.clone().map(FieldValue::Text),
            FieldKey::City => self.city.clone().map(FieldValue::Text),
            FieldKey::State => self.state.clone().map(FieldValue::Text),
            FieldKey::Website => self.website.clone().map(FieldValue::Text),
            FieldKey::LogoUrl => self.logo_url.clone().map(FieldValue::Text),
            FieldKey::UniversityType => self.university_type.clone().map(FieldValue::Text),
            FieldKey::LocationType => self.location_type.clone().map(FieldValue::Text),
            FieldKey::Description => self.description.clone().map(FieldValue::Text),
            FieldKey::AcceptanceRate => self.acceptance_rate.map(FieldValue::Float),
            FieldKey::SatMath25 => self.sat_math_25.map(FieldValue::Int),
            FieldKey::SatMath75 => self.sat_math_75.map(FieldValue::Int),
            FieldKey::SatVerbal25 => self.sat_verbal_25.map(FieldValue::Int),
            FieldKey::SatVerbal75 => self.sat_verbal_75.map(FieldValue::Int),
            FieldKey::ActComposite25 => self.act_composite_25.map(FieldValue::Int),
            FieldKey::ActComposite75 => self.act_composite_75.map(FieldValue::Int),
            FieldKey::GpaAverage => self.gpa_average.map(FieldValue::Float),
            FieldKey::TuitionInState => self.tuition_in_state.map(FieldValue::Float),
            FieldKey::TuitionOutState => self.tuition_out_state.map(FieldValue::Float),
            FieldKey::TotalCost => self.total_cost.map(FieldValue::Float),
            FieldKey::GraduationRate4Year => self.graduation_rate_4year.map(FieldValue::Float),
            FieldKey::GraduationRate6Year => self.graduation_rate_6year.map(FieldValue::Float),
            FieldKey::MedianEarnings10Yr => self.median_earnings_10yr.map(FieldValue::Float),
            FieldKey::TotalStudents => self.total_students.map(FieldValue::Int),
            FieldKey::GlobalRank => self.global_rank.map(FieldValue::Int),
            FieldKey::NationalRank => self.national_rank.map(FieldValue::Int),
            FieldKey::QsScore => self.qs_score.map(FieldValue::Float),
        }
    }

    /// Applies a typed value to the matching column. Returns false when the
    /// value's type does not fit the field.
    pub fn set(&mut self, key: FieldKey, value: FieldValue) -> bool {
        match (key.kind(), &value) {
            (FieldKind::Text, FieldValue::Text(_)) => {}
            (FieldKind::Float, FieldValue::Float(_)) | (FieldKind::Float, FieldValue::Int(_)) => {}
            (FieldKind::Int, FieldValue::Int(_)) => {}
            (FieldKind::Int, FieldValue::Float(v)) if v.fract() == 0.0 => {}
            _ => return false,
        }
        let text = || value.as_text().map(str::to_string);
        let float = || value.as_f64();
        let int = || value.as_f64().map(|v| v as i64);
        match key {
            FieldKey::Name => {
                if let Some(v) = text() {
                    self.name = v;
                }
            }
            FieldKey::Country => self.country = text(),
            FieldKey::City => self.city = text(),
            FieldKey::State => self.state = text(),
            FieldKey::Website => self.website = text(),
            FieldKey::LogoUrl => self.logo_url = text(),
            FieldKey::UniversityType => self.university_type = text(),
            FieldKey::LocationType => self.location_type = text(),
            FieldKey::Description => self.description = text(),
            FieldKey::AcceptanceRate => self.acceptance_rate = float(),
            FieldKey::SatMath25 => self.sat_math_25 = int(),
            FieldKey::SatMath75 => self.sat_math_75 = int(),
            FieldKey::SatVerbal25 => self.sat_verbal_25 = int(),
            FieldKey::SatVerbal75 => self.sat_verbal_75 = int(),
            FieldKey::ActComposite25 => self.act_composite_25 = int(),
            FieldKey::ActComposite75 => self.act_composite_75 = int(),
            FieldKey::GpaAverage => self.gpa_average = float(),
            FieldKey::TuitionInState => self.tuition_in_state = float(),
            FieldKey::TuitionOutState => self.tuition_out_state = float(),
            FieldKey::TotalCost => self.total_cost = float(),
            FieldKey::GraduationRate4Year => self.graduation_rate_4year = float(),
            FieldKey::GraduationRate6Year => self.graduation_rate_6year = float(),
            FieldKey::MedianEarnings10Yr => self.median_earnings_10yr = float(),
            FieldKey::TotalStudents => self.total_students = int(),
            FieldKey::GlobalRank => self.global_rank = int(),
            FieldKey::NationalRank => self.national_rank = int(),
            FieldKey::QsScore => self.qs_score = float(),
        }
        true
    }

    pub fn confidence_for(&self, key: FieldKey) -> Option<f64> {
        self.data_confidence.get(key.as_slug()).copied()
    }

    pub fn source_for(&self, key: FieldKey) -> Option<SourceId> {
        self.data_sources
            .get(key.as_slug())
            .and_then(|slug| slug.parse().ok())
    }

    pub fn last_updated_for(&self, key: FieldKey) -> Option<DateTime<Utc>> {
        self.field_last_updated.get(key.as_slug()).copied()
    }

    pub fn record_provenance(
        &mut self,
        key: FieldKey,
        source: SourceId,
        confidence: f64,
        now: DateTime<Utc>,
    ) {
        let slug = key.as_slug().to_string();
        self.data_sources.insert(slug.clone(), source.as_slug().to_string());
        self.data_confidence.insert(slug.clone(), confidence);
        self.field_last_updated.insert(slug, now);
    }

    pub fn missing_fields(&self, candidates: &[FieldKey]) -> Vec<FieldKey> {
        candidates
            .iter()
            .filter(|key| self.get(**key).is_none())
            .copied()
            .collect()
    }

    /// Row payload for the hosted table. Absent fields are omitted entirely,
    /// so a write never nulls out a column it did not touch.
    pub fn to_row(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{FieldKey, FieldValue, SourceId, UniversityRecord};

    #[test]
    fn field_slugs_round_trip() {
        for key in FieldKey::ALL {
            let parsed: FieldKey = key.as_slug().parse().expect("slug should parse");
            assert_eq!(parsed, key);
        }
        assert!("not_a_field".parse::<FieldKey>().is_err());
    }

    #[test]
    fn source_priority_ordering_is_fixed() {
        assert!(SourceId::DirectWebsite.priority() > SourceId::Wikipedia.priority());
        assert!(SourceId::Wikipedia.priority() > SourceId::SearchEngine.priority());
        assert_eq!(
            SourceId::QsRankingsApi.priority(),
            SourceId::TheRankingsApi.priority()
        );
    }

    #[test]
    fn set_rejects_mismatched_types() {
        let mut record = UniversityRecord::new("Test U", Some("US".into()));
        assert!(!record.set(FieldKey::AcceptanceRate, FieldValue::Text("12%".into())));
        assert!(record.set(FieldKey::AcceptanceRate, FieldValue::Float(12.0)));
        assert_eq!(record.acceptance_rate, Some(12.0));
        assert!(record.set(FieldKey::TotalStudents, FieldValue::Float(4500.0)));
        assert_eq!(record.total_students, Some(4500));
        assert!(!record.set(FieldKey::TotalStudents, FieldValue::Float(4500.5)));
    }

    #[test]
    fn provenance_lands_in_all_three_maps() {
        let mut record = UniversityRecord::new("Test U", Some("US".into()));
        let now = Utc::now();
        record.record_provenance(FieldKey::Website, SourceId::DirectWebsite, 0.95, now);
        assert_eq!(
            record.data_sources.get("website").map(String::as_str),
            Some("direct_website")
        );
        assert_eq!(record.confidence_for(FieldKey::Website), Some(0.95));
        assert_eq!(record.last_updated_for(FieldKey::Website), Some(now));
    }

    #[test]
    fn row_payload_has_no_nulls() {
        let mut record = UniversityRecord::new("Test U", Some("FR".into()));
        record.global_rank = Some(51);
        let row = record.to_row();
        assert!(row.values().all(|v| !v.is_null()));
        assert!(!row.contains_key("acceptance_rate"));
        assert_eq!(row["name"], "Test U");
    }

    #[test]
    fn partial_rows_deserialize() {
        let record: UniversityRecord =
            serde_json::from_value(serde_json::json!({
                "id": 7,
                "name": "Test U",
                "country": "US",
                "extra_column_from_older_tooling": true
            }))
            .expect("partial row should load");
        assert_eq!(record.id, Some(7));
        assert!(record.website.is_none());
        assert!(record.data_confidence.is_empty());
    }
}
