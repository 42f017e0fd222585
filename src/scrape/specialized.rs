use tracing::debug;

use crate::extract::ExtractorSet;
use crate::model::{FieldKey, FieldUpdate, SourceId};
use crate::scrape::search;
use crate::sources::http::ScrapeClient;

/// The short list worth several query phrasings each.
pub const CRITICAL_FIELDS: [FieldKey; 3] = [
    FieldKey::AcceptanceRate,
    FieldKey::TuitionOutState,
    FieldKey::TotalStudents,
];

/// Differently-phrased queries for one critical field. Fields outside the
/// critical list get no phrasings.
pub fn queries_for(field: FieldKey, name: &str) -> Vec<String> {
    let phrasings: &[&str] = match field {
        FieldKey::AcceptanceRate => &[
            "\"{}\" acceptance rate",
            "\"{}\" admission rate percent",
            "what percent of applicants does {} admit",
        ],
        FieldKey::TuitionOutState => &[
            "\"{}\" tuition cost per year",
            "\"{}\" out-of-state tuition",
            "how much does {} cost per year",
        ],
        FieldKey::TotalStudents => &[
            "\"{}\" total enrollment",
            "\"{}\" number of students enrolled",
            "how many students attend {}",
        ],
        _ => &[],
    };
    phrasings.iter().map(|p| p.replace("{}", name)).collect()
}

/// Tier-three extraction: run each phrasing through the snippet miner and
/// keep the first plausible hit per field.
pub async fn extract_critical(
    client: &ScrapeClient,
    extractors: &ExtractorSet,
    name: &str,
    wanted: &[FieldKey],
) -> Vec<FieldUpdate> {
    let mut updates = Vec::new();
    for field in CRITICAL_FIELDS {
        if !wanted.contains(&field) {
            continue;
        }
        let Some(extractor) = extractors.for_field(field) else {
            continue;
        };
        for query in queries_for(field, name) {
            client.polite_sleep().await;
            let Some(text) = search::snippets(client, &query).await else {
                continue;
            };
            if let Some(extraction) = extractor.extract(&text) {
                debug!(field = %field, query, "specialized query hit");
                updates.push(
                    FieldUpdate::new(field, extraction.value, SourceId::SearchEngine)
                        .with_pattern_confidence(extraction.confidence),
                );
                break;
            }
        }
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrasings_carry_the_university_name() {
        let queries = queries_for(FieldKey::AcceptanceRate, "Test U");
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0], "\"Test U\" acceptance rate");
        assert!(queries.iter().all(|q| q.contains("Test U")));
    }

    #[test]
    fn non_critical_fields_have_no_phrasings() {
        assert!(queries_for(FieldKey::GpaAverage, "Test U").is_empty());
        assert!(queries_for(FieldKey::Website, "Test U").is_empty());
    }
}
