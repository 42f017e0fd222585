pub mod campus;
pub mod enrollment;
pub mod links;
pub mod money;
pub mod rates;
pub mod scores;

use std::sync::Arc;

use regex::Regex;

use crate::model::{FieldKey, FieldValue};
use crate::normalize::{clean_float, within_bounds};

/// One extracted value plus the strength of the phrasing that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub value: FieldValue,
    pub confidence: f64,
}

impl Extraction {
    pub fn new(value: FieldValue, confidence: f64) -> Self {
        Self { value, confidence }
    }
}

/// A single named heuristic: free text in, at most one bounded value out.
/// Implementations never error; unmatched or implausible text is `None`.
pub trait FieldExtractor: Send + Sync {
    fn field(&self) -> FieldKey;
    fn name(&self) -> &'static str;
    fn extract(&self, text: &str) -> Option<Extraction>;
}

#[derive(Clone)]
pub struct ExtractorSet {
    extractors: Vec<Arc<dyn FieldExtractor>>,
}

impl ExtractorSet {
    pub fn with_defaults() -> Self {
        let extractors: Vec<Arc<dyn FieldExtractor>> = vec![
            Arc::new(rates::AcceptanceRateExtractor),
            Arc::new(rates::GraduationRate4YearExtractor),
            Arc::new(rates::GraduationRate6YearExtractor),
            Arc::new(money::TuitionOutStateExtractor),
            Arc::new(money::TuitionInStateExtractor),
            Arc::new(money::TotalCostExtractor),
            Arc::new(enrollment::TotalStudentsExtractor),
            Arc::new(campus::UniversityTypeExtractor),
            Arc::new(campus::LocationTypeExtractor),
            Arc::new(scores::SatMath25Extractor),
            Arc::new(scores::SatMath75Extractor),
            Arc::new(scores::SatVerbal25Extractor),
            Arc::new(scores::SatVerbal75Extractor),
            Arc::new(scores::ActComposite25Extractor),
            Arc::new(scores::ActComposite75Extractor),
            Arc::new(scores::GpaAverageExtractor),
            Arc::new(links::WebsiteExtractor),
        ];
        Self { extractors }
    }

    pub fn extractors(&self) -> &[Arc<dyn FieldExtractor>] {
        &self.extractors
    }

    pub fn for_field(&self, field: FieldKey) -> Option<Arc<dyn FieldExtractor>> {
        self.extractors.iter().find(|e| e.field() == field).cloned()
    }

    /// Runs the extractor of every wanted field over one text blob.
    pub fn extract_all(&self, text: &str, wanted: &[FieldKey]) -> Vec<(FieldKey, Extraction)> {
        let mut out = Vec::new();
        for field in wanted {
            let Some(extractor) = self.for_field(*field) else {
                continue;
            };
            if let Some(extraction) = extractor.extract(text) {
                out.push((*field, extraction));
            }
        }
        out
    }
}

pub(crate) fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("invalid regex literal")
}

/// First capture across the given patterns that parses as a number inside
/// the field's plausible range. Patterns are tried in order, every match of
/// one pattern before moving to the next, so stronger phrasings win.
pub(crate) fn first_in_bounds(
    field: FieldKey,
    text: &str,
    patterns: &[(Regex, f64)],
) -> Option<(f64, f64)> {
    for (regex, confidence) in patterns {
        for caps in regex.captures_iter(text) {
            let Some(raw) = caps.get(1) else {
                continue;
            };
            let Some(value) = clean_float(raw.as_str()) else {
                continue;
            };
            if within_bounds(field, value) {
                return Some((value, *confidence));
            }
        }
    }
    None
}
