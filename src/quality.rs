use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::{FieldKey, FieldUpdate, FieldValue, SourceId, UniversityRecord};

/// A replacement must beat the existing confidence by more than this margin,
/// unless the new source outranks the old one outright.
pub const CONFIDENCE_MARGIN: f64 = 0.15;

const IMPLAUSIBLE_PENALTY: f64 = 0.20;
const STATISTIC_BONUS: f64 = 0.05;
const IDENTIFYING_BONUS: f64 = 0.10;
const CATEGORICAL_SEARCH_PENALTY: f64 = 0.15;

/// Confidence for a (field, source, value) triple: the source's base score
/// plus field-specific adjustments, scaled by the extractor's pattern
/// confidence when one was reported. Clamped to [0, 1], rounded to 2 dp.
pub fn score_value(
    field: FieldKey,
    source: SourceId,
    value: &FieldValue,
    pattern_confidence: Option<f64>,
) -> f64 {
    let mut score = source.base_confidence();

    if field.is_statistic()
        && matches!(
            source,
            SourceId::DirectWebsite | SourceId::CollegeScorecardApi
        )
    {
        score += STATISTIC_BONUS;
    }
    if field.is_identifying() {
        score += IDENTIFYING_BONUS;
    }
    if field.is_categorical() && source == SourceId::SearchEngine {
        score -= CATEGORICAL_SEARCH_PENALTY;
    }
    if !plausible(field, value) {
        score -= IMPLAUSIBLE_PENALTY;
    }

    if let Some(pattern) = pattern_confidence {
        score *= pattern.clamp(0.0, 1.0);
    }

    round2(score.clamp(0.0, 1.0))
}

/// Sanity check used only for the confidence penalty. Looser than the
/// extractor bounds: an odd-but-possible value keeps a reduced score instead
/// of being rejected outright.
pub fn plausible(field: FieldKey, value: &FieldValue) -> bool {
    let Some(number) = value.as_f64() else {
        return true;
    };
    match field {
        FieldKey::AcceptanceRate => (0.1..=100.0).contains(&number),
        FieldKey::TuitionInState | FieldKey::TuitionOutState | FieldKey::TotalCost => {
            (1_000.0..=100_000.0).contains(&number)
        }
        FieldKey::TotalStudents => (50.0..=1_000_000.0).contains(&number),
        _ => true,
    }
}

/// Whether a newly scraped value should replace the stored one.
///
/// Replace when the field has never been scored, when the new confidence
/// clears the stored one by more than the margin, or when the scores are
/// within the margin and the new source has strictly higher priority.
pub fn should_update_field(
    existing_confidence: Option<f64>,
    existing_source: Option<SourceId>,
    new_source: SourceId,
    new_confidence: f64,
) -> bool {
    let Some(existing) = existing_confidence else {
        return true;
    };
    let diff = new_confidence - existing;
    if diff > CONFIDENCE_MARGIN {
        return true;
    }
    if diff.abs() <= CONFIDENCE_MARGIN {
        let existing_priority = existing_source.map(|s| s.priority()).unwrap_or(0);
        return new_source.priority() > existing_priority;
    }
    false
}

/// Runs one proposed update through the quality gate and, when accepted,
/// writes the value and its provenance onto the record.
pub fn apply_update(
    record: &mut UniversityRecord,
    update: &FieldUpdate,
    now: DateTime<Utc>,
) -> bool {
    let confidence = score_value(
        update.field,
        update.source,
        &update.value,
        update.pattern_confidence,
    );
    let accepted = should_update_field(
        record.confidence_for(update.field),
        record.source_for(update.field),
        update.source,
        confidence,
    );
    if !accepted {
        debug!(
            field = %update.field,
            source = %update.source,
            confidence,
            "keeping existing value"
        );
        return false;
    }
    if !record.set(update.field, update.value.clone()) {
        debug!(field = %update.field, "value type does not fit field, dropping");
        return false;
    }
    record.record_provenance(update.field, update.source, confidence, now);
    true
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{plausible, score_value, should_update_field};
    use crate::model::{FieldKey, FieldUpdate, FieldValue, SourceId, UniversityRecord};

    #[test]
    fn empty_field_always_updates() {
        assert!(should_update_field(
            None,
            None,
            SourceId::SearchEngine,
            0.1
        ));
    }

    #[test]
    fn clear_confidence_win_updates() {
        assert!(should_update_field(
            Some(0.60),
            Some(SourceId::SearchEngine),
            SourceId::Wikipedia,
            0.80
        ));
    }

    #[test]
    fn close_call_falls_back_to_source_priority() {
        // Within the margin: higher-priority source wins, lower loses.
        assert!(should_update_field(
            Some(0.80),
            Some(SourceId::Wikipedia),
            SourceId::DirectWebsite,
            0.85
        ));
        assert!(!should_update_field(
            Some(0.80),
            Some(SourceId::DirectWebsite),
            SourceId::SearchEngine,
            0.85
        ));
    }

    #[test]
    fn much_worse_confidence_never_updates() {
        assert!(!should_update_field(
            Some(0.90),
            Some(SourceId::Wikipedia),
            SourceId::DirectWebsite,
            0.50
        ));
    }

    #[test]
    fn statistic_from_direct_site_scores_above_base() {
        let score = score_value(
            FieldKey::AcceptanceRate,
            SourceId::DirectWebsite,
            &FieldValue::Float(12.0),
            None,
        );
        assert_eq!(score, 0.90);
    }

    #[test]
    fn implausible_value_is_penalized() {
        let sane = score_value(
            FieldKey::TuitionOutState,
            SourceId::SearchEngine,
            &FieldValue::Float(35_000.0),
            None,
        );
        let absurd = score_value(
            FieldKey::TuitionOutState,
            SourceId::SearchEngine,
            &FieldValue::Float(450_000.0),
            None,
        );
        assert!((sane - absurd - 0.20).abs() < 1e-9);
        assert!(!plausible(FieldKey::TuitionOutState, &FieldValue::Float(450_000.0)));
    }

    #[test]
    fn categorical_search_results_are_distrusted() {
        let score = score_value(
            FieldKey::UniversityType,
            SourceId::SearchEngine,
            &FieldValue::Text("public".into()),
            None,
        );
        assert_eq!(score, 0.45);
    }

    #[test]
    fn pattern_confidence_scales_score() {
        let full = score_value(
            FieldKey::AcceptanceRate,
            SourceId::SearchEngine,
            &FieldValue::Float(12.0),
            None,
        );
        let loose = score_value(
            FieldKey::AcceptanceRate,
            SourceId::SearchEngine,
            &FieldValue::Float(12.0),
            Some(0.5),
        );
        assert!(loose < full);
    }

    #[test]
    fn accepted_update_writes_value_and_provenance() {
        let mut record = UniversityRecord::new("Test U", Some("US".into()));
        let update = FieldUpdate::new(
            FieldKey::AcceptanceRate,
            FieldValue::Float(11.0),
            SourceId::DirectWebsite,
        );
        assert!(super::apply_update(&mut record, &update, Utc::now()));
        assert_eq!(record.acceptance_rate, Some(11.0));
        assert_eq!(record.confidence_for(FieldKey::AcceptanceRate), Some(0.90));
        assert_eq!(
            record.source_for(FieldKey::AcceptanceRate),
            Some(SourceId::DirectWebsite)
        );
    }

    #[test]
    fn rejected_update_leaves_record_untouched() {
        let mut record = UniversityRecord::new("Test U", Some("US".into()));
        let now = Utc::now();
        record.acceptance_rate = Some(7.0);
        record.record_provenance(FieldKey::AcceptanceRate, SourceId::CollegeScorecardApi, 1.0, now);
        let update = FieldUpdate::new(
            FieldKey::AcceptanceRate,
            FieldValue::Float(55.0),
            SourceId::SearchEngine,
        );
        assert!(!super::apply_update(&mut record, &update, now));
        assert_eq!(record.acceptance_rate, Some(7.0));
    }
}
