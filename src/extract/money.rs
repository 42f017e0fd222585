use once_cell::sync::Lazy;
use regex::Regex;

use crate::extract::{first_in_bounds, pattern, Extraction, FieldExtractor};
use crate::model::{FieldKey, FieldValue};

static OUT_STATE_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    vec![
        (
            pattern(r"(?i)out[\s-]*of[\s-]*state\s+tuition[^$\d]{0,24}\$?\s*([\d,]+)"),
            1.0,
        ),
        (
            pattern(r"(?i)non[\s-]*resident\s+tuition[^$\d]{0,24}\$?\s*([\d,]+)"),
            0.9,
        ),
        (
            pattern(r"(?i)tuition(?:\s+and\s+fees)?(?:\s+(?:is|are|costs?))?\s*[:\s]\s*\$\s*([\d,]+)"),
            0.8,
        ),
        (
            pattern(r"(?i)\$\s*([\d,]+)\s*(?:per\s+year|annually|/\s*year|a\s+year)"),
            0.6,
        ),
    ]
});

static IN_STATE_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    vec![
        (
            pattern(r"(?i)in[\s-]*state\s+tuition[^$\d]{0,24}\$?\s*([\d,]+)"),
            1.0,
        ),
        // no lookbehind in this engine, so anchor the left edge by hand to
        // keep "non-resident tuition" out
        (
            pattern(r"(?i)(?:^|[\s(>])resident\s+tuition[^$\d]{0,24}\$?\s*([\d,]+)"),
            0.8,
        ),
    ]
});

static TOTAL_COST_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    vec![
        (
            pattern(r"(?i)cost\s+of\s+attendance[^$\d]{0,24}\$?\s*([\d,]+)"),
            1.0,
        ),
        (
            pattern(r"(?i)total\s+(?:annual\s+)?cost[^$\d]{0,24}\$?\s*([\d,]+)"),
            0.8,
        ),
    ]
});

pub struct TuitionOutStateExtractor;

impl FieldExtractor for TuitionOutStateExtractor {
    fn field(&self) -> FieldKey {
        FieldKey::TuitionOutState
    }

    fn name(&self) -> &'static str {
        "tuition_out_state_phrases"
    }

    fn extract(&self, text: &str) -> Option<Extraction> {
        let (value, confidence) = first_in_bounds(self.field(), text, &OUT_STATE_PATTERNS)?;
        Some(Extraction::new(FieldValue::Float(value), confidence))
    }
}

pub struct TuitionInStateExtractor;

impl FieldExtractor for TuitionInStateExtractor {
    fn field(&self) -> FieldKey {
        FieldKey::TuitionInState
    }

    fn name(&self) -> &'static str {
        "tuition_in_state_phrases"
    }

    fn extract(&self, text: &str) -> Option<Extraction> {
        let (value, confidence) = first_in_bounds(self.field(), text, &IN_STATE_PATTERNS)?;
        Some(Extraction::new(FieldValue::Float(value), confidence))
    }
}

pub struct TotalCostExtractor;

impl FieldExtractor for TotalCostExtractor {
    fn field(&self) -> FieldKey {
        FieldKey::TotalCost
    }

    fn name(&self) -> &'static str {
        "total_cost_phrases"
    }

    fn extract(&self, text: &str) -> Option<Extraction> {
        let (value, confidence) = first_in_bounds(self.field(), text, &TOTAL_COST_PATTERNS)?;
        Some(Extraction::new(FieldValue::Float(value), confidence))
    }
}
