use std::collections::HashMap;

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::warn;

use crate::model::{FieldKey, UniversityRecord};
use crate::normalize::{clean_float, clean_string, within_bounds, MAX_NAME_LEN};
use crate::sources::generated_description;

/// One row of the QS world-rankings CSV, column names as published.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QsRow {
    #[serde(default, rename = "Institution_Name")]
    pub institution_name: Option<String>,
    #[serde(default, rename = "Location")]
    pub location: Option<String>,
    #[serde(default, rename = "RANK_2025")]
    pub rank: Option<String>,
    #[serde(default, rename = "Overall_Score")]
    pub overall_score: Option<String>,
    #[serde(default, rename = "SIZE")]
    pub size: Option<String>,
    #[serde(default, rename = "FOCUS")]
    pub focus: Option<String>,
}

static COUNTRY_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("united states", "US"),
        ("united states of america", "US"),
        ("usa", "US"),
        ("united kingdom", "GB"),
        ("uk", "GB"),
        ("france", "FR"),
        ("germany", "DE"),
        ("china", "CN"),
        ("china (mainland)", "CN"),
        ("hong kong sar", "HK"),
        ("hong kong", "HK"),
        ("macau sar", "MO"),
        ("taiwan", "TW"),
        ("japan", "JP"),
        ("south korea", "KR"),
        ("singapore", "SG"),
        ("australia", "AU"),
        ("new zealand", "NZ"),
        ("canada", "CA"),
        ("switzerland", "CH"),
        ("netherlands", "NL"),
        ("sweden", "SE"),
        ("denmark", "DK"),
        ("norway", "NO"),
        ("finland", "FI"),
        ("belgium", "BE"),
        ("austria", "AT"),
        ("ireland", "IE"),
        ("italy", "IT"),
        ("spain", "ES"),
        ("portugal", "PT"),
        ("greece", "GR"),
        ("poland", "PL"),
        ("czech republic", "CZ"),
        ("czechia", "CZ"),
        ("hungary", "HU"),
        ("russia", "RU"),
        ("kazakhstan", "KZ"),
        ("turkey", "TR"),
        ("türkiye", "TR"),
        ("israel", "IL"),
        ("saudi arabia", "SA"),
        ("united arab emirates", "AE"),
        ("qatar", "QA"),
        ("egypt", "EG"),
        ("south africa", "ZA"),
        ("india", "IN"),
        ("pakistan", "PK"),
        ("malaysia", "MY"),
        ("thailand", "TH"),
        ("indonesia", "ID"),
        ("philippines", "PH"),
        ("vietnam", "VN"),
        ("brazil", "BR"),
        ("argentina", "AR"),
        ("chile", "CL"),
        ("colombia", "CO"),
        ("peru", "PE"),
        ("mexico", "MX"),
    ])
});

/// Maps a published country/location name to ISO-3166 alpha-2. Names
/// outside the table pass through unchanged so nothing is silently lost.
pub fn country_code(name: &str) -> String {
    let trimmed = name.trim();
    match COUNTRY_CODES.get(trimmed.to_lowercase().as_str()) {
        Some(code) => (*code).to_string(),
        None => trimmed.to_string(),
    }
}

/// Published rank cells come in several shapes: plain integers, ranges
/// ("101-110" or "201–250", lower bound wins), open ranges ("601+"), tie
/// markers ("=125"), and "NR" for unranked.
pub fn clean_rank(raw: &str) -> Option<i64> {
    let cleaned = raw.trim();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("nr") {
        return None;
    }
    let cleaned = cleaned.trim_start_matches('=');
    let cleaned = cleaned.split(['-', '–']).next().unwrap_or(cleaned);
    let cleaned = cleaned.trim_end_matches('+').trim().replace(',', "");
    let rank: i64 = cleaned.parse().ok()?;
    if !within_bounds(FieldKey::GlobalRank, rank as f64) {
        return None;
    }
    Some(rank)
}

pub fn clean_score(raw: &str) -> Option<f64> {
    let score = clean_float(raw)?;
    if !within_bounds(FieldKey::QsScore, score) {
        return None;
    }
    Some(score)
}

/// Turns one CSV row into a record, or `None` when the row has no usable
/// institution name.
pub fn normalize_row(row: QsRow) -> Option<UniversityRecord> {
    let name = clean_string(row.institution_name.as_deref()?, MAX_NAME_LEN)?;
    let location = row
        .location
        .as_deref()
        .and_then(|s| clean_string(s, MAX_NAME_LEN));
    let country = location.as_deref().map(country_code);

    let mut record = UniversityRecord::new(name.clone(), country);
    record.global_rank = row.rank.as_deref().and_then(clean_rank);
    record.qs_score = row.overall_score.as_deref().and_then(clean_score);
    if let Some(location) = &location {
        record.description = Some(generated_description(&name, location));
    }
    Some(record)
}

/// Parses the whole CSV body into normalized records, skipping rows the
/// parser or the normalizer rejects.
pub fn records_from_csv(data: &str, limit: Option<usize>) -> Result<Vec<UniversityRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data.as_bytes());
    let mut out = Vec::new();
    for (index, result) in reader.deserialize::<QsRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                warn!("skipping malformed ranking row {}: {err}", index + 1);
                continue;
            }
        };
        if let Some(record) = normalize_row(row) {
            out.push(record);
        }
        if let Some(limit) = limit {
            if out.len() >= limit {
                break;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_cells_in_every_published_shape() {
        assert_eq!(clean_rank("101-110"), Some(101));
        assert_eq!(clean_rank("601+"), Some(601));
        assert_eq!(clean_rank("=125"), Some(125));
        assert_eq!(clean_rank("NR"), None);
        assert_eq!(clean_rank(""), None);
        assert_eq!(clean_rank("  57 "), Some(57));
    }

    #[test]
    fn rank_cleaning_is_idempotent_on_clean_integers() {
        for rank in [1, 57, 601, 9999] {
            assert_eq!(clean_rank(&rank.to_string()), Some(rank));
        }
    }

    #[test]
    fn scores_parse_and_stay_on_the_published_scale() {
        assert_eq!(clean_score("96.5"), Some(96.5));
        assert_eq!(clean_score("n/a"), None);
        assert_eq!(clean_score("105"), None);
    }

    #[test]
    fn known_countries_map_to_alpha2_and_unknown_pass_through() {
        assert_eq!(country_code("France"), "FR");
        assert_eq!(country_code("United States"), "US");
        assert_eq!(country_code("China (Mainland)"), "CN");
        assert_eq!(country_code("Atlantis"), "Atlantis");
    }

    #[test]
    fn csv_row_normalizes_end_to_end() {
        let data = "Institution_Name,Location,RANK_2025\nTest U,France,=51\n";
        let records = records_from_csv(data, None).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.name, "Test U");
        assert_eq!(record.country.as_deref(), Some("FR"));
        assert_eq!(record.global_rank, Some(51));
        assert_eq!(
            record.description.as_deref(),
            Some("Test U is a higher education institution in France.")
        );
        assert_eq!(record.qs_score, None);
    }

    #[test]
    fn rows_without_a_name_are_dropped() {
        let data = "Institution_Name,Location,RANK_2025\n,France,12\nReal U,Spain,13\n";
        let records = records_from_csv(data, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Real U");
    }

    #[test]
    fn limit_caps_normalized_rows() {
        let data = "Institution_Name,Location,RANK_2025\nA,France,1\nB,Spain,2\nC,Italy,3\n";
        let records = records_from_csv(data, Some(2)).unwrap();
        assert_eq!(records.len(), 2);
    }
}
