use crate::extract::{Extraction, FieldExtractor};
use crate::model::{FieldKey, FieldValue};

const PUBLIC_HINTS: &[&str] = &[
    "public university",
    "public research university",
    "state university",
    "state-funded",
    "publicly funded",
    "land-grant",
];

const PRIVATE_HINTS: &[&str] = &[
    "private university",
    "private research university",
    "private college",
    "privately funded",
    "independent university",
    "nonprofit private",
];

const URBAN_HINTS: &[&str] = &[
    "urban campus",
    "city campus",
    "downtown",
    "in the heart of",
    "metropolitan",
];

const SUBURBAN_HINTS: &[&str] = &["suburban campus", "suburb of", "suburban setting"];

const RURAL_HINTS: &[&str] = &[
    "rural campus",
    "rural setting",
    "countryside",
    "small town",
    "college town",
];

fn hint_score(text: &str, hints: &[&str]) -> usize {
    hints.iter().filter(|h| text.contains(*h)).count()
}

fn winner(text: &str, candidates: &[(&'static str, &[&str])]) -> Option<Extraction> {
    let lower = text.to_lowercase();
    let mut scored: Vec<(&'static str, usize)> = candidates
        .iter()
        .map(|(label, hints)| (*label, hint_score(&lower, hints)))
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    let (label, best) = scored[0];
    let runner_up = scored.get(1).map(|(_, s)| *s).unwrap_or(0);
    // one stray phrase is not evidence, and a tie tells us nothing
    if best < 1 || best == runner_up {
        return None;
    }
    let confidence = if best >= 2 { 0.9 } else { 0.7 };
    Some(Extraction::new(
        FieldValue::Text(label.to_string()),
        confidence,
    ))
}

pub struct UniversityTypeExtractor;

impl FieldExtractor for UniversityTypeExtractor {
    fn field(&self) -> FieldKey {
        FieldKey::UniversityType
    }

    fn name(&self) -> &'static str {
        "funding_model_phrases"
    }

    fn extract(&self, text: &str) -> Option<Extraction> {
        winner(
            text,
            &[("public", PUBLIC_HINTS), ("private", PRIVATE_HINTS)],
        )
    }
}

pub struct LocationTypeExtractor;

impl FieldExtractor for LocationTypeExtractor {
    fn field(&self) -> FieldKey {
        FieldKey::LocationType
    }

    fn name(&self) -> &'static str {
        "campus_setting_phrases"
    }

    fn extract(&self, text: &str) -> Option<Extraction> {
        winner(
            text,
            &[
                ("urban", URBAN_HINTS),
                ("suburban", SUBURBAN_HINTS),
                ("rural", RURAL_HINTS),
            ],
        )
    }
}
