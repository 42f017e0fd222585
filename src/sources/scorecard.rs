use std::env;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::info;

use crate::model::UniversityRecord;
use crate::normalize::{
    clean_string, MAX_CITY_LEN, MAX_NAME_LEN, MAX_STATE_LEN, MAX_WEBSITE_LEN,
};
use crate::sources::generated_description;
use crate::sources::http::ScrapeClient;

const SCORECARD_API: &str = "https://api.data.gov/ed/collegescorecard/v1/schools";
const PAGE_SIZE: usize = 100;

/// Flat dot-notation keys requested per school; the API returns them as
/// top-level keys of each result object, not nested.
const RESULT_FIELDS: [&str; 16] = [
    "school.name",
    "school.city",
    "school.state",
    "school.school_url",
    "school.locale",
    "school.ownership",
    "latest.student.size",
    "latest.admissions.admission_rate.overall",
    "latest.admissions.sat_scores.midpoint.math",
    "latest.admissions.sat_scores.midpoint.critical_reading",
    "latest.admissions.act_scores.midpoint.cumulative",
    "latest.cost.tuition.in_state",
    "latest.cost.tuition.out_of_state",
    "latest.cost.attendance.academic_year",
    "latest.completion.completion_rate_4yr_150nt",
    "latest.earnings.10_yrs_after_entry.median",
];

/// Authenticated pager for the Department of Education scorecard API.
/// The key is required up front so a batch run fails before any work
/// starts, not halfway through.
#[derive(Debug, Clone)]
pub struct ScorecardClient {
    api_key: String,
}

impl ScorecardClient {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("COLLEGE_SCORECARD_API_KEY").map_err(|_| {
            anyhow!("COLLEGE_SCORECARD_API_KEY is not set; register a free key at api.data.gov")
        })?;
        Ok(Self { api_key })
    }

    /// One page of results, filtered to operating, predominantly
    /// bachelor's-granting institutions with at least 100 students.
    fn page_url(&self, state: Option<&str>, page: usize) -> String {
        let mut params = vec![
            "school.degrees_awarded.predominant=3".to_string(),
            "school.operating=1".to_string(),
            "latest.student.size__range=100..".to_string(),
        ];
        if let Some(state) = state {
            params.push(format!("school.state={}", urlencoding::encode(state)));
        }
        params.push(format!("fields={}", RESULT_FIELDS.join(",")));
        params.push(format!("per_page={PAGE_SIZE}"));
        params.push(format!("page={page}"));
        params.push(format!("api_key={}", urlencoding::encode(&self.api_key)));
        format!("{SCORECARD_API}?{}", params.join("&"))
    }

    pub async fn fetch_page(
        &self,
        client: &ScrapeClient,
        state: Option<&str>,
        page: usize,
    ) -> Result<Vec<Value>> {
        let url = self.page_url(state, page);
        let payload = client.fetch_json(&url).await?;
        payload
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| anyhow!("scorecard response has no results array"))
    }

    /// Pages through the whole result set, normalizing as it goes. A page
    /// shorter than the page size marks the end.
    pub async fn fetch_all(
        &self,
        client: &ScrapeClient,
        state: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<UniversityRecord>> {
        let mut out = Vec::new();
        let mut page = 0;
        loop {
            if page > 0 {
                client.brief_sleep().await;
            }
            let results = self.fetch_page(client, state, page).await?;
            let fetched = results.len();
            let before = out.len();
            out.extend(results.iter().filter_map(normalize_school));
            info!(page, added = out.len() - before, "scorecard page fetched");
            if let Some(limit) = limit {
                if out.len() >= limit {
                    out.truncate(limit);
                    break;
                }
            }
            if fetched < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(out)
    }
}

/// Locale codes group by their tens digit: 11-13 city, 21-23 suburb,
/// 31-33 town, 41-43 rural. Towns are treated as rural.
pub fn locale_label(code: i64) -> Option<&'static str> {
    match code / 10 {
        1 => Some("urban"),
        2 => Some("suburban"),
        3 | 4 => Some("rural"),
        _ => None,
    }
}

/// Ownership: 1 public, 2 private nonprofit, 3 private for-profit.
pub fn ownership_label(code: i64) -> Option<&'static str> {
    match code {
        1 => Some("public"),
        2 | 3 => Some("private"),
        _ => None,
    }
}

/// The API reports rates as 0-1 fractions; stored columns are percentages.
pub fn as_percent(fraction: f64) -> f64 {
    (fraction * 1000.0).round() / 10.0
}

fn text(school: &Value, key: &str, max_len: usize) -> Option<String> {
    school
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| clean_string(s, max_len))
}

fn float(school: &Value, key: &str) -> Option<f64> {
    school.get(key).and_then(Value::as_f64)
}

fn int(school: &Value, key: &str) -> Option<i64> {
    school.get(key).and_then(Value::as_i64)
}

/// One result object to a record, or `None` when it has no usable name.
/// SAT/ACT midpoints land in the 75th-percentile columns; the API does not
/// publish the quartiles. Out-of-range numbers are left for the sanitize
/// pass to drop.
pub fn normalize_school(school: &Value) -> Option<UniversityRecord> {
    let name = text(school, "school.name", MAX_NAME_LEN)?;
    let mut record = UniversityRecord::new(name.clone(), Some("US".to_string()));
    record.city = text(school, "school.city", MAX_CITY_LEN);
    record.state = text(school, "school.state", MAX_STATE_LEN);
    record.website = text(school, "school.school_url", MAX_WEBSITE_LEN);
    record.university_type = int(school, "school.ownership")
        .and_then(ownership_label)
        .map(str::to_string);
    record.location_type = int(school, "school.locale")
        .and_then(locale_label)
        .map(str::to_string);
    record.total_students = int(school, "latest.student.size");
    record.acceptance_rate =
        float(school, "latest.admissions.admission_rate.overall").map(as_percent);
    record.sat_math_75 = int(school, "latest.admissions.sat_scores.midpoint.math");
    record.sat_verbal_75 = int(school, "latest.admissions.sat_scores.midpoint.critical_reading");
    record.act_composite_75 = int(school, "latest.admissions.act_scores.midpoint.cumulative");
    record.tuition_in_state = float(school, "latest.cost.tuition.in_state");
    record.tuition_out_state = float(school, "latest.cost.tuition.out_of_state");
    record.total_cost = float(school, "latest.cost.attendance.academic_year");
    record.graduation_rate_4year =
        float(school, "latest.completion.completion_rate_4yr_150nt").map(as_percent);
    record.median_earnings_10yr = float(school, "latest.earnings.10_yrs_after_entry.median");
    if let (Some(city), Some(state)) = (&record.city, &record.state) {
        record.description = Some(generated_description(&name, &format!("{city}, {state}")));
    }
    Some(record)
}
