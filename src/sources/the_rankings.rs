use anyhow::Result;
use serde::Deserialize;
use tracing::warn;

use crate::model::{FieldKey, UniversityRecord};
use crate::normalize::{clean_int, clean_string, within_bounds, MAX_NAME_LEN};
use crate::sources::generated_description;
use crate::sources::qs::{clean_rank, country_code};

/// One row of the Times-Higher-Education world-rankings CSV.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TheRow {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub scores_overall: Option<String>,
    #[serde(default)]
    pub stats_number_students: Option<String>,
    #[serde(default)]
    pub stats_pc_intl_students: Option<String>,
}

fn clean_student_count(raw: &str) -> Option<i64> {
    let count = clean_int(raw)?;
    if !within_bounds(FieldKey::TotalStudents, count as f64) {
        return None;
    }
    Some(count)
}

/// Turns one CSV row into a record. The banded overall score and the
/// international-student share have no column in our table and are left
/// behind.
pub fn normalize_row(row: TheRow) -> Option<UniversityRecord> {
    let name = clean_string(row.name.as_deref()?, MAX_NAME_LEN)?;
    let location = row
        .location
        .as_deref()
        .and_then(|s| clean_string(s, MAX_NAME_LEN));
    let country = location.as_deref().map(country_code);

    let mut record = UniversityRecord::new(name.clone(), country);
    record.global_rank = row.rank.as_deref().and_then(clean_rank);
    record.total_students = row
        .stats_number_students
        .as_deref()
        .and_then(clean_student_count);
    if let Some(location) = &location {
        record.description = Some(generated_description(&name, location));
    }
    Some(record)
}

pub fn records_from_csv(data: &str, limit: Option<usize>) -> Result<Vec<UniversityRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data.as_bytes());
    let mut out = Vec::new();
    for (index, result) in reader.deserialize::<TheRow>().enumerate() {
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
    fn banded_rank_takes_the_lower_bound() {
        let data = "name,location,rank,stats_number_students\nBand U,Germany,201–250,\"20,965\"\n";
        let records = records_from_csv(data, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].global_rank, Some(201));
        assert_eq!(records[0].total_students, Some(20_965));
        assert_eq!(records[0].country.as_deref(), Some("DE"));
    }

    #[test]
    fn reporter_status_leaves_rank_unset() {
        let data = "name,location,rank\nQuiet U,France,Reporter\n";
        let records = records_from_csv(data, None).unwrap();
        assert_eq!(records[0].global_rank, None);
        assert_eq!(
            records[0].description.as_deref(),
            Some("Quiet U is a higher education institution in France.")
        );
    }

    #[test]
    fn implausible_student_counts_are_dropped() {
        assert_eq!(clean_student_count("12"), None);
        assert_eq!(clean_student_count("54,000"), Some(54_000));
    }
}
