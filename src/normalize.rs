use crate::model::{FieldKey, UniversityRecord};

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_COUNTRY_LEN: usize = 100;
pub const MAX_STATE_LEN: usize = 100;
pub const MAX_CITY_LEN: usize = 100;
pub const MAX_WEBSITE_LEN: usize = 255;
pub const MAX_LOGO_URL_LEN: usize = 500;
pub const MAX_TYPE_LEN: usize = 50;

/// Trims and length-caps a raw string. Empty input becomes `None` so blank
/// CSV cells never reach the database as empty strings.
pub fn clean_string(raw: &str, max_len: usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() <= max_len {
        return Some(trimmed.to_string());
    }
    Some(trimmed.chars().take(max_len).collect())
}

/// Parses a number out of human-formatted text: currency signs, thousands
/// separators, percent signs and stray whitespace are stripped first.
pub fn clean_float(raw: &str) -> Option<f64> {
    let sanitized: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | '€' | '£' | ' '))
        .collect();
    if sanitized.is_empty() {
        return None;
    }
    sanitized.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn clean_int(raw: &str) -> Option<i64> {
    let value = clean_float(raw)?;
    if value.fract() != 0.0 {
        return None;
    }
    Some(value as i64)
}

pub fn max_text_len(key: FieldKey) -> usize {
    match key {
        FieldKey::Name => MAX_NAME_LEN,
        FieldKey::Country => MAX_COUNTRY_LEN,
        FieldKey::State => MAX_STATE_LEN,
        FieldKey::City => MAX_CITY_LEN,
        FieldKey::Website => MAX_WEBSITE_LEN,
        FieldKey::LogoUrl => MAX_LOGO_URL_LEN,
        FieldKey::UniversityType | FieldKey::LocationType => MAX_TYPE_LEN,
        _ => MAX_NAME_LEN,
    }
}

/// Plausible range for a numeric field. Values outside the range are treated
/// as extraction noise and dropped rather than stored.
pub fn numeric_bounds(key: FieldKey) -> Option<(f64, f64)> {
    match key {
        FieldKey::AcceptanceRate => Some((1.0, 100.0)),
        FieldKey::TuitionInState | FieldKey::TuitionOutState | FieldKey::TotalCost => {
            Some((5_000.0, 90_000.0))
        }
        FieldKey::TotalStudents => Some((100.0, 1_000_000.0)),
        FieldKey::GraduationRate4Year => Some((5.0, 100.0)),
        FieldKey::GraduationRate6Year => Some((10.0, 100.0)),
        FieldKey::GpaAverage => Some((0.0, 4.0)),
        FieldKey::SatMath25 | FieldKey::SatMath75 | FieldKey::SatVerbal25
        | FieldKey::SatVerbal75 => Some((200.0, 800.0)),
        FieldKey::ActComposite25 | FieldKey::ActComposite75 => Some((1.0, 36.0)),
        FieldKey::GlobalRank | FieldKey::NationalRank => Some((1.0, 10_000.0)),
        FieldKey::QsScore => Some((0.0, 100.0)),
        _ => None,
    }
}

pub fn within_bounds(key: FieldKey, value: f64) -> bool {
    match numeric_bounds(key) {
        Some((lo, hi)) => value >= lo && value <= hi,
        None => true,
    }
}

/// Final validation pass before a row is written: caps text lengths and
/// drops numeric values that fall outside their plausible range. After this
/// the row payload contains only present, well-formed fields.
pub fn sanitize_record(record: &mut UniversityRecord) {
    record.name = clean_string(&record.name, MAX_NAME_LEN).unwrap_or_default();
    cap_text(&mut record.country, MAX_COUNTRY_LEN);
    cap_text(&mut record.city, MAX_CITY_LEN);
    cap_text(&mut record.state, MAX_STATE_LEN);
    cap_text(&mut record.website, MAX_WEBSITE_LEN);
    cap_text(&mut record.logo_url, MAX_LOGO_URL_LEN);
    cap_text(&mut record.university_type, MAX_TYPE_LEN);
    cap_text(&mut record.location_type, MAX_TYPE_LEN);

    drop_implausible_f64(FieldKey::AcceptanceRate, &mut record.acceptance_rate);
    drop_implausible_f64(FieldKey::GpaAverage, &mut record.gpa_average);
    drop_implausible_f64(FieldKey::TuitionInState, &mut record.tuition_in_state);
    drop_implausible_f64(FieldKey::TuitionOutState, &mut record.tuition_out_state);
    drop_implausible_f64(FieldKey::TotalCost, &mut record.total_cost);
    drop_implausible_f64(
        FieldKey::GraduationRate4Year,
        &mut record.graduation_rate_4year,
    );
    drop_implausible_f64(
        FieldKey::GraduationRate6Year,
        &mut record.graduation_rate_6year,
    );
    drop_implausible_f64(FieldKey::QsScore, &mut record.qs_score);
    drop_implausible_i64(FieldKey::SatMath25, &mut record.sat_math_25);
    drop_implausible_i64(FieldKey::SatMath75, &mut record.sat_math_75);
    drop_implausible_i64(FieldKey::SatVerbal25, &mut record.sat_verbal_25);
    drop_implausible_i64(FieldKey::SatVerbal75, &mut record.sat_verbal_75);
    drop_implausible_i64(FieldKey::ActComposite25, &mut record.act_composite_25);
    drop_implausible_i64(FieldKey::ActComposite75, &mut record.act_composite_75);
    drop_implausible_i64(FieldKey::TotalStudents, &mut record.total_students);
    drop_implausible_i64(FieldKey::GlobalRank, &mut record.global_rank);
    drop_implausible_i64(FieldKey::NationalRank, &mut record.national_rank);
}

fn cap_text(slot: &mut Option<String>, max_len: usize) {
    *slot = slot.as_deref().and_then(|raw| clean_string(raw, max_len));
}

fn drop_implausible_f64(key: FieldKey, slot: &mut Option<f64>) {
    if let Some(value) = *slot {
        if !within_bounds(key, value) {
            *slot = None;
        }
    }
}

fn drop_implausible_i64(key: FieldKey, slot: &mut Option<i64>) {
    if let Some(value) = *slot {
        if !within_bounds(key, value as f64) {
            *slot = None;
        }
    }
}
