use once_cell::sync::Lazy;
use regex::Regex;

use crate::extract::{first_in_bounds, pattern, Extraction, FieldExtractor};
use crate::model::{FieldKey, FieldValue};

static ACCEPTANCE_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    vec![
        (
            pattern(r"(?i)acceptance\s+rate(?:\s+(?:is|of|was))?\s*[:\s]\s*([\d.]+)\s*%"),
            1.0,
        ),
        (pattern(r"(?i)([\d.]+)\s*%\s+acceptance\s+rate"), 0.9),
        (
            pattern(r"(?i)admit(?:s|ted)?\s+(?:about\s+|around\s+|roughly\s+)?([\d.]+)\s*%"),
            0.8,
        ),
        (
            pattern(r"(?i)([\d.]+)\s*%\s+of\s+(?:all\s+)?applicants\s+(?:were\s+|are\s+)?(?:admitted|accepted)"),
            0.8,
        ),
    ]
});

static GRAD_4YEAR_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    vec![
        (
            pattern(r"(?i)(?:4|four)[\s-]*year\s+graduation\s+rate(?:\s+(?:is|of))?\s*[:\s]\s*([\d.]+)\s*%"),
            1.0,
        ),
        (pattern(r"(?i)graduation\s+rate(?:\s+(?:is|of))?\s*[:\s]\s*([\d.]+)\s*%"), 0.6),
    ]
});

static GRAD_6YEAR_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    vec![
        (
            pattern(r"(?i)(?:6|six)[\s-]*year\s+graduation\s+rate(?:\s+(?:is|of))?\s*[:\s]\s*([\d.]+)\s*%"),
            1.0,
        ),
        (
            pattern(r"(?i)([\d.]+)\s*%\s+graduate[ds]?\s+within\s+six\s+years"),
            0.8,
        ),
    ]
});

pub struct AcceptanceRateExtractor;

impl FieldExtractor for AcceptanceRateExtractor {
    fn field(&self) -> FieldKey {
        FieldKey::AcceptanceRate
    }

    fn name(&self) -> &'static str {
        "acceptance_rate_phrases"
    }

    fn extract(&self, text: &str) -> Option<Extraction> {
        let (value, confidence) = first_in_bounds(self.field(), text, &ACCEPTANCE_PATTERNS)?;
        Some(Extraction::new(FieldValue::Float(value), confidence))
    }
}

pub struct GraduationRate4YearExtractor;

impl FieldExtractor for GraduationRate4YearExtractor {
    fn field(&self) -> FieldKey {
        FieldKey::GraduationRate4Year
    }

    fn name(&self) -> &'static str {
        "graduation_rate_4year_phrases"
    }

    fn extract(&self, text: &str) -> Option<Extraction> {
        let (value, confidence) = first_in_bounds(self.field(), text, &GRAD_4YEAR_PATTERNS)?;
        Some(Extraction::new(FieldValue::Float(value), confidence))
    }
}

pub struct GraduationRate6YearExtractor;

impl FieldExtractor for GraduationRate6YearExtractor {
    fn field(&self) -> FieldKey {
        FieldKey::GraduationRate6Year
    }

    fn name(&self) -> &'static str {
        "graduation_rate_6year_phrases"
    }

    fn extract(&self, text: &str) -> Option<Extraction> {
        let (value, confidence) = first_in_bounds(self.field(), text, &GRAD_6YEAR_PATTERNS)?;
        Some(Extraction::new(FieldValue::Float(value), confidence))
    }
}
