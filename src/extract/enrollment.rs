use once_cell::sync::Lazy;
use regex::Regex;

use crate::extract::{first_in_bounds, pattern, Extraction, FieldExtractor};
use crate::model::{FieldKey, FieldValue};
use crate::normalize::{clean_float, within_bounds};

static ENROLLMENT_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    vec![
        (
            pattern(r"(?i)(?:total\s+)?enrollment(?:\s+(?:is|of|was))?\s*[:\s]\s*([\d,]+)"),
            1.0,
        ),
        (pattern(r"(?i)student\s+body\s+of\s+([\d,]+)"), 0.9),
        (
            pattern(r"(?i)([\d,]+)\s+(?:total\s+|undergraduate\s+|enrolled\s+)?students"),
            0.7,
        ),
    ]
});

// "45k students" style, seen mostly in search snippets
static K_SUFFIX: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?i)([\d.]+)k\+?\s+(?:total\s+)?students"));

pub struct TotalStudentsExtractor;

impl FieldExtractor for TotalStudentsExtractor {
    fn field(&self) -> FieldKey {
        FieldKey::TotalStudents
    }

    fn name(&self) -> &'static str {
        "enrollment_phrases"
    }

    fn extract(&self, text: &str) -> Option<Extraction> {
        if let Some((value, confidence)) = first_in_bounds(self.field(), text, &ENROLLMENT_PATTERNS)
        {
            return Some(Extraction::new(FieldValue::Int(value as i64), confidence));
        }
        for caps in K_SUFFIX.captures_iter(text) {
            let Some(value) = caps.get(1).and_then(|m| clean_float(m.as_str())) else {
                continue;
            };
            let scaled = (value * 1_000.0).round();
            if within_bounds(self.field(), scaled) {
                return Some(Extraction::new(FieldValue::Int(scaled as i64), 0.6));
            }
        }
        None
    }
}
