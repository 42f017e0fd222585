use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::model::UniversityRecord;
use crate::normalize::{clean_string, MAX_COUNTRY_LEN, MAX_NAME_LEN, MAX_STATE_LEN, MAX_WEBSITE_LEN};
use crate::sources::http::ScrapeClient;

const DIRECTORY_API: &str = "http://universities.hipolabs.com/search";

/// Countries worth seeding wholesale. The directory lists tens of
/// thousands of entries worldwide; these are the ones our users ask about.
pub const TARGET_COUNTRIES: [&str; 16] = [
    "United States",
    "United Kingdom",
    "Canada",
    "Australia",
    "Germany",
    "France",
    "Netherlands",
    "Switzerland",
    "Sweden",
    "Ireland",
    "Japan",
    "South Korea",
    "Singapore",
    "China",
    "India",
    "New Zealand",
];

/// One entry as the directory API returns it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub alpha_two_code: Option<String>,
    #[serde(default, rename = "state-province")]
    pub state_province: Option<String>,
    #[serde(default)]
    pub web_pages: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
}

/// Entry to record: alpha-2 code preferred over the spelled-out country,
/// first listed web page wins.
pub fn to_record(entry: DirectoryEntry) -> Option<UniversityRecord> {
    let name = clean_string(entry.name.as_deref()?, MAX_NAME_LEN)?;
    let country = entry
        .alpha_two_code
        .as_deref()
        .and_then(|code| clean_string(code, MAX_COUNTRY_LEN))
        .map(|code| code.to_ascii_uppercase())
        .or_else(|| {
            entry
                .country
                .as_deref()
                .and_then(|c| clean_string(c, MAX_COUNTRY_LEN))
        });

    let mut record = UniversityRecord::new(name, country);
    record.website = entry
        .web_pages
        .first()
        .and_then(|url| clean_string(url, MAX_WEBSITE_LEN));
    record.state = entry
        .state_province
        .as_deref()
        .and_then(|s| clean_string(s, MAX_STATE_LEN));
    Some(record)
}

pub async fn fetch_country(client: &ScrapeClient, country: &str) -> Result<Vec<DirectoryEntry>> {
    let url = format!("{DIRECTORY_API}?country={}", urlencoding::encode(country));
    let payload = client.fetch_json(&url).await?;
    serde_json::from_value(payload)
        .with_context(|| format!("unexpected directory response shape for {country}"))
}

/// Seeds records for every target country, or just one when a filter is
/// given. A country that fails to fetch is logged and skipped; the seed
/// run keeps going.
pub async fn fetch_all(
    client: &ScrapeClient,
    country_filter: Option<&str>,
) -> Result<Vec<UniversityRecord>> {
    let countries: Vec<&str> = match country_filter {
        Some(country) => vec![country],
        None => TARGET_COUNTRIES.to_vec(),
    };

    let mut out = Vec::new();
    for (index, country) in countries.iter().enumerate() {
        if index > 0 {
            client.brief_sleep().await;
        }
        match fetch_country(client, country).await {
            Ok(entries) => {
                let before = out.len();
                out.extend(entries.into_iter().filter_map(to_record));
                info!(country, added = out.len() - before, "directory page fetched");
            }
            Err(err) => {
                warn!(country, "directory fetch failed: {err:#}");
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn entry_parses_the_hyphenated_state_key() {
        let entry: DirectoryEntry = serde_json::from_value(json!({
            "name": "Example State University",
            "country": "United States",
            "alpha_two_code": "us",
            "state-province": "Ohio",
            "web_pages": ["https://www.example-state.edu", "https://alt.example-state.edu"],
            "domains": ["example-state.edu"]
        }))
        .unwrap();

        let record = to_record(entry).unwrap();
        assert_eq!(record.name, "Example State University");
        assert_eq!(record.country.as_deref(), Some("US"));
        assert_eq!(record.state.as_deref(), Some("Ohio"));
        assert_eq!(record.website.as_deref(), Some("https://www.example-state.edu"));
    }

    #[test]
    fn entry_without_a_name_is_dropped() {
        let entry: DirectoryEntry = serde_json::from_value(json!({
            "country": "France",
            "web_pages": []
        }))
        .unwrap();
        assert!(to_record(entry).is_none());
    }

    #[test]
    fn spelled_out_country_is_kept_when_no_code() {
        let entry: DirectoryEntry = serde_json::from_value(json!({
            "name": "Lone U",
            "country": "Freedonia"
        }))
        .unwrap();
        let record = to_record(entry).unwrap();
        assert_eq!(record.country.as_deref(), Some("Freedonia"));
    }
}
