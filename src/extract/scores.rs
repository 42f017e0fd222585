use once_cell::sync::Lazy;
use regex::Regex;

use crate::extract::{first_in_bounds, pattern, Extraction, FieldExtractor};
use crate::model::{FieldKey, FieldValue};
use crate::normalize::{clean_float, within_bounds};

static SAT_MATH_RANGE: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?i)sat\s+math[^\d]{0,24}(\d{3})\s*(?:-|–|—|to)\s*(\d{3})")
});

static SAT_VERBAL_RANGE: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"(?i)sat\s+(?:verbal|ebrw|evidence[- ]based\s+reading(?:\s+and\s+writing)?|(?:critical\s+)?reading(?:\s+and\s+writing)?)[^\d]{0,24}(\d{3})\s*(?:-|–|—|to)\s*(\d{3})",
    )
});

static ACT_RANGE: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"(?i)\bact\b(?:\s+composite)?(?:\s+(?:range|scores?))?[^\d]{0,16}(\d{1,2})\s*(?:-|–|—|to)\s*(\d{1,2})",
    )
});

static GPA_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    vec![
        (
            pattern(r"(?i)average\s+(?:high\s+school\s+)?gpa(?:\s+(?:is|of|was))?\s*[:\s]\s*([\d.]+)"),
            1.0,
        ),
        (pattern(r"(?i)gpa\s+of\s+([\d.]+)"), 0.7),
    ]
});

#[derive(Clone, Copy)]
enum RangeEnd {
    Low,
    High,
}

/// Pulls one end of a reported middle-50% range. Both ends must be
/// plausible for the field before either is trusted.
fn range_end(field: FieldKey, text: &str, re: &Regex, end: RangeEnd) -> Option<f64> {
    for caps in re.captures_iter(text) {
        let a = caps.get(1).and_then(|m| clean_float(m.as_str()));
        let b = caps.get(2).and_then(|m| clean_float(m.as_str()));
        let (Some(a), Some(b)) = (a, b) else {
            continue;
        };
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if !within_bounds(field, low) || !within_bounds(field, high) {
            continue;
        }
        return Some(match end {
            RangeEnd::Low => low,
            RangeEnd::High => high,
        });
    }
    None
}

macro_rules! range_extractor {
    ($name:ident, $field:expr, $label:expr, $re:expr, $end:expr, $confidence:expr) => {
        pub struct $name;

        impl FieldExtractor for $name {
            fn field(&self) -> FieldKey {
                $field
            }

            fn name(&self) -> &'static str {
                $label
            }

            fn extract(&self, text: &str) -> Option<Extraction> {
                let value = range_end(self.field(), text, &$re, $end)?;
                Some(Extraction::new(FieldValue::Int(value as i64), $confidence))
            }
        }
    };
}

range_extractor!(
    SatMath25Extractor,
    FieldKey::SatMath25,
    "sat_math_range_low",
    SAT_MATH_RANGE,
    RangeEnd::Low,
    1.0
);
range_extractor!(
    SatMath75Extractor,
    FieldKey::SatMath75,
    "sat_math_range_high",
    SAT_MATH_RANGE,
    RangeEnd::High,
    1.0
);
range_extractor!(
    SatVerbal25Extractor,
    FieldKey::SatVerbal25,
    "sat_verbal_range_low",
    SAT_VERBAL_RANGE,
    RangeEnd::Low,
    1.0
);
range_extractor!(
    SatVerbal75Extractor,
    FieldKey::SatVerbal75,
    "sat_verbal_range_high",
    SAT_VERBAL_RANGE,
    RangeEnd::High,
    1.0
);
range_extractor!(
    ActComposite25Extractor,
    FieldKey::ActComposite25,
    "act_range_low",
    ACT_RANGE,
    RangeEnd::Low,
    0.9
);
range_extractor!(
    ActComposite75Extractor,
    FieldKey::ActComposite75,
    "act_range_high",
    ACT_RANGE,
    RangeEnd::High,
    0.9
);

pub struct GpaAverageExtractor;

impl FieldExtractor for GpaAverageExtractor {
    fn field(&self) -> FieldKey {
        FieldKey::GpaAverage
    }

    fn name(&self) -> &'static str {
        "gpa_phrases"
    }

    fn extract(&self, text: &str) -> Option<Extraction> {
        let (value, confidence) = first_in_bounds(self.field(), text, &GPA_PATTERNS)?;
        Some(Extraction::new(FieldValue::Float(value), confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sat_math_range_splits_into_both_ends() {
        let text = "Middle 50% SAT Math: 700-790, strong in STEM.";
        let low = SatMath25Extractor.extract(text).unwrap();
        let high = SatMath75Extractor.extract(text).unwrap();
        assert_eq!(low.value, FieldValue::Int(700));
        assert_eq!(high.value, FieldValue::Int(790));
    }

    #[test]
    fn verbal_matches_ebrw_label() {
        let text = "SAT Evidence-Based Reading and Writing: 680 to 760";
        let low = SatVerbal25Extractor.extract(text).unwrap();
        let high = SatVerbal75Extractor.extract(text).unwrap();
        assert_eq!(low.value, FieldValue::Int(680));
        assert_eq!(high.value, FieldValue::Int(760));
    }

    #[test]
    fn act_composite_range() {
        let text = "ACT composite range of 33 to 35 for admitted students.";
        let low = ActComposite25Extractor.extract(text).unwrap();
        let high = ActComposite75Extractor.extract(text).unwrap();
        assert_eq!(low.value, FieldValue::Int(33));
        assert_eq!(high.value, FieldValue::Int(35));
    }

    #[test]
    fn reversed_range_is_reordered() {
        let low = SatMath25Extractor
            .extract("SAT Math: 790-700 (typo on the page)")
            .unwrap();
        assert_eq!(low.value, FieldValue::Int(700));
    }

    #[test]
    fn range_with_an_implausible_end_is_rejected() {
        assert!(SatMath25Extractor.extract("SAT Math: 100-790").is_none());
        assert!(ActComposite75Extractor.extract("ACT range of 33 to 95").is_none());
    }

    #[test]
    fn labeled_gpa_beats_loose_gpa() {
        let hit = GpaAverageExtractor
            .extract("Average high school GPA: 3.91 for the incoming class.")
            .unwrap();
        assert_eq!(hit.value, FieldValue::Float(3.91));
        assert_eq!(hit.confidence, 1.0);
    }

    #[test]
    fn loose_gpa_is_tentative() {
        let hit = GpaAverageExtractor
            .extract("Most admits carry a GPA of 3.7 or better.")
            .unwrap();
        assert_eq!(hit.value, FieldValue::Float(3.7));
        assert_eq!(hit.confidence, 0.7);
    }

    #[test]
    fn gpa_above_scale_is_rejected() {
        assert!(GpaAverageExtractor.extract("a GPA of 5.2").is_none());
    }
}
