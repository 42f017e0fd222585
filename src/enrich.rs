use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::extract::ExtractorSet;
use crate::model::{FieldKey, FieldUpdate, SourceId, UniversityRecord};
use crate::quality;
use crate::scrape::cache::PageCache;
use crate::scrape::{search, specialized, website};
use crate::sources::http::ScrapeClient;

const MAX_SEARCH_QUERIES: usize = 4;

/// One tier of the fallback chain. Tiers return whatever they found;
/// accepting or rejecting values is the quality tracker's call.
#[async_trait]
pub trait EnrichStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, record: &UniversityRecord, wanted: &[FieldKey])
        -> Result<Vec<FieldUpdate>>;
}

pub struct DirectWebsiteStrategy {
    client: ScrapeClient,
    cache: PageCache,
    extractors: Arc<ExtractorSet>,
    max_pages: usize,
}

#[async_trait]
impl EnrichStrategy for DirectWebsiteStrategy {
    fn name(&self) -> &'static str {
        "direct_website"
    }

    async fn run(
        &self,
        record: &UniversityRecord,
        wanted: &[FieldKey],
    ) -> Result<Vec<FieldUpdate>> {
        let url = match &record.website {
            Some(url) => url.clone(),
            None => {
                match website::discover_website(&self.client, &self.cache, &record.name).await {
                    Some(url) => url,
                    None => return Ok(Vec::new()),
                }
            }
        };
        let scrape =
            match website::scrape_site(&self.client, &self.cache, &url, self.max_pages).await {
                Some(scrape) => scrape,
                None => return Ok(Vec::new()),
            };
        Ok(website::to_updates(&scrape, wanted, &self.extractors))
    }
}

pub struct SearchSnippetStrategy {
    client: ScrapeClient,
    extractors: Arc<ExtractorSet>,
}

/// One query per distinct topic among the wanted fields, capped so a
/// record missing everything does not fire a dozen searches.
pub fn queries_for_fields(name: &str, wanted: &[FieldKey]) -> Vec<String> {
    let mut phrases: Vec<&'static str> = Vec::new();
    for field in wanted {
        if let Some(phrase) = search_phrase(*field) {
            if !phrases.contains(&phrase) {
                phrases.push(phrase);
            }
        }
    }
    phrases
        .into_iter()
        .take(MAX_SEARCH_QUERIES)
        .map(|phrase| format!("\"{name}\" {phrase}"))
        .collect()
}

fn search_phrase(field: FieldKey) -> Option<&'static str> {
    match field {
        FieldKey::AcceptanceRate => Some("acceptance rate"),
        FieldKey::TuitionInState | FieldKey::TuitionOutState | FieldKey::TotalCost => {
            Some("tuition cost")
        }
        FieldKey::TotalStudents => Some("total enrollment"),
        FieldKey::SatMath25
        | FieldKey::SatMath75
        | FieldKey::SatVerbal25
        | FieldKey::SatVerbal75
        | FieldKey::ActComposite25
        | FieldKey::ActComposite75
        | FieldKey::GpaAverage => Some("SAT ACT GPA admission requirements"),
        FieldKey::GraduationRate4Year | FieldKey::GraduationRate6Year => Some("graduation rate"),
        FieldKey::UniversityType | FieldKey::LocationType => {
            Some("public or private university campus")
        }
        FieldKey::Website | FieldKey::LogoUrl => Some("official website"),
        _ => None,
    }
}

#[async_trait]
impl EnrichStrategy for SearchSnippetStrategy {
    fn name(&self) -> &'static str {
        "search_snippets"
    }

    async fn run(
        &self,
        record: &UniversityRecord,
        wanted: &[FieldKey],
    ) -> Result<Vec<FieldUpdate>> {
        let queries = queries_for_fields(&record.name, wanted);
        let mut blob = String::new();
        for (index, query) in queries.iter().enumerate() {
            if index > 0 {
                self.client.polite_sleep().await;
            }
            if let Some(text) = search::snippets(&self.client, query).await {
                blob.push_str(&text);
                blob.push('\n');
            }
        }
        if blob.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .extractors
            .extract_all(&blob, wanted)
            .into_iter()
            .map(|(field, extraction)| {
                FieldUpdate::new(field, extraction.value, SourceId::SearchEngine)
                    .with_pattern_confidence(extraction.confidence)
            })
            .collect())
    }
}

pub struct SpecializedQueryStrategy {
    client: ScrapeClient,
    extractors: Arc<ExtractorSet>,
}

#[async_trait]
impl EnrichStrategy for SpecializedQueryStrategy {
    fn name(&self) -> &'static str {
        "specialized_queries"
    }

    async fn run(
        &self,
        record: &UniversityRecord,
        wanted: &[FieldKey],
    ) -> Result<Vec<FieldUpdate>> {
        Ok(
            specialized::extract_critical(&self.client, &self.extractors, &record.name, wanted)
                .await,
        )
    }
}

/// The fallback chain, in running order.
#[derive(Clone)]
pub struct Enricher {
    strategies: Vec<Arc<dyn EnrichStrategy>>,
}

impl Enricher {
    pub fn new(strategies: Vec<Arc<dyn EnrichStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn with_defaults(client: &ScrapeClient, data_dir: &Path, max_pages: usize) -> Self {
        let extractors = Arc::new(ExtractorSet::with_defaults());
        let cache = PageCache::new(data_dir);
        Self::new(vec![
            Arc::new(DirectWebsiteStrategy {
                client: client.clone(),
                cache,
                extractors: Arc::clone(&extractors),
                max_pages,
            }),
            Arc::new(SearchSnippetStrategy {
                client: client.clone(),
                extractors: Arc::clone(&extractors),
            }),
            Arc::new(SpecializedQueryStrategy {
                client: client.clone(),
                extractors,
            }),
        ])
    }

    pub fn strategies(&self) -> &[Arc<dyn EnrichStrategy>] {
        &self.strategies
    }

    /// Runs every tier in order against one record. Each tier sees only
    /// the fields still unresolved when it starts; data found early never
    /// stops later tiers from chasing the remainder. A failed tier is
    /// logged and skipped. Returns the fields that actually changed.
    pub async fn enrich(
        &self,
        record: &mut UniversityRecord,
        wanted: &[FieldKey],
    ) -> Vec<FieldKey> {
        let mut applied: Vec<FieldKey> = Vec::new();
        for strategy in &self.strategies {
            let remaining: Vec<FieldKey> = wanted
                .iter()
                .copied()
                .filter(|field| !applied.contains(field))
                .collect();
            if remaining.is_empty() {
                break;
            }
            let updates = match strategy.run(record, &remaining).await {
                Ok(updates) => updates,
                Err(err) => {
                    warn!(
                        university = %record.display_label(),
                        strategy = strategy.name(),
                        "strategy failed: {err:#}"
                    );
                    continue;
                }
            };
            if updates.is_empty() {
                debug!(strategy = strategy.name(), "tier produced nothing");
                continue;
            }
            let now = Utc::now();
            for update in updates {
                let field = update.field;
                if quality::apply_update(record, &update, now) && !applied.contains(&field) {
                    applied.push(field);
                }
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;

    use super::*;
    use crate::model::FieldValue;

    struct CannedStrategy {
        label: &'static str,
        updates: Vec<FieldUpdate>,
        fails: bool,
        seen: Mutex<Vec<Vec<FieldKey>>>,
    }

    impl CannedStrategy {
        fn new(label: &'static str, updates: Vec<FieldUpdate>) -> Arc<Self> {
            Arc::new(Self {
                label,
                updates,
                fails: false,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(label: &'static str) -> Arc<Self> {
            Arc::new(Self {
                label,
                updates: Vec::new(),
                fails: true,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EnrichStrategy for CannedStrategy {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn run(
            &self,
            _record: &UniversityRecord,
            wanted: &[FieldKey],
        ) -> Result<Vec<FieldUpdate>> {
            self.seen.lock().unwrap().push(wanted.to_vec());
            if self.fails {
                return Err(anyhow!("boom"));
            }
            Ok(self.updates.clone())
        }
    }

    #[tokio::test]
    async fn later_tiers_only_see_unresolved_fields() {
        let first = CannedStrategy::new(
            "first",
            vec![FieldUpdate::new(
                FieldKey::AcceptanceRate,
                FieldValue::Float(14.5),
                SourceId::DirectWebsite,
            )],
        );
        let second = CannedStrategy::new(
            "second",
            vec![FieldUpdate::new(
                FieldKey::TuitionOutState,
                FieldValue::Float(41_000.0),
                SourceId::SearchEngine,
            )],
        );
        let enricher = Enricher::new(vec![first.clone(), second.clone()]);

        let mut record = UniversityRecord::new("Test U", Some("US".to_string()));
        let wanted = [FieldKey::AcceptanceRate, FieldKey::TuitionOutState];
        let applied = enricher.enrich(&mut record, &wanted).await;

        assert_eq!(applied, vec![FieldKey::AcceptanceRate, FieldKey::TuitionOutState]);
        assert_eq!(record.acceptance_rate, Some(14.5));
        assert_eq!(record.tuition_out_state, Some(41_000.0));
        assert_eq!(
            second.seen.lock().unwrap()[0],
            vec![FieldKey::TuitionOutState]
        );
        assert_eq!(
            record.data_sources.get("acceptance_rate").map(String::as_str),
            Some("direct_website")
        );
    }

    #[tokio::test]
    async fn a_failing_tier_does_not_stop_the_chain() {
        let first = CannedStrategy::failing("first");
        let second = CannedStrategy::new(
            "second",
            vec![FieldUpdate::new(
                FieldKey::TotalStudents,
                FieldValue::Int(18_000),
                SourceId::SearchEngine,
            )],
        );
        let enricher = Enricher::new(vec![first, second]);

        let mut record = UniversityRecord::new("Test U", None);
        let applied = enricher.enrich(&mut record, &[FieldKey::TotalStudents]).await;

        assert_eq!(applied, vec![FieldKey::TotalStudents]);
        assert_eq!(record.total_students, Some(18_000));
    }

    #[tokio::test]
    async fn chain_stops_once_everything_is_resolved() {
        let first = CannedStrategy::new(
            "first",
            vec![FieldUpdate::new(
                FieldKey::TotalStudents,
                FieldValue::Int(18_000),
                SourceId::DirectWebsite,
            )],
        );
        let second = CannedStrategy::new("second", Vec::new());
        let enricher = Enricher::new(vec![first, second.clone()]);

        let mut record = UniversityRecord::new("Test U", None);
        enricher.enrich(&mut record, &[FieldKey::TotalStudents]).await;

        assert!(second.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn search_queries_group_fields_by_topic() {
        let queries = queries_for_fields(
            "Test U",
            &[
                FieldKey::SatMath25,
                FieldKey::SatMath75,
                FieldKey::GpaAverage,
                FieldKey::AcceptanceRate,
            ],
        );
        assert_eq!(queries.len(), 2);
        assert!(queries.contains(&"\"Test U\" SAT ACT GPA admission requirements".to_string()));
        assert!(queries.contains(&"\"Test U\" acceptance rate".to_string()));
    }

    #[test]
    fn search_query_count_is_capped() {
        let queries = queries_for_fields(
            "Test U",
            &[
                FieldKey::AcceptanceRate,
                FieldKey::TuitionOutState,
                FieldKey::TotalStudents,
                FieldKey::GpaAverage,
                FieldKey::GraduationRate4Year,
                FieldKey::Website,
            ],
        );
        assert_eq!(queries.len(), MAX_SEARCH_QUERIES);
    }
}
