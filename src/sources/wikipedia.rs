use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::extract::ExtractorSet;
use crate::model::{FieldKey, FieldUpdate, FieldValue, SourceId};
use crate::normalize::{clean_string, MAX_CITY_LEN};
use crate::sources::http::ScrapeClient;

const WIKIPEDIA_API: &str = "https://en.wikipedia.org/w/api.php";
const MIN_DESCRIPTION_LEN: usize = 40;
const MAX_DESCRIPTION_LEN: usize = 500;

/// Intro prose for one article, as returned by the extracts endpoint.
#[derive(Debug, Clone)]
pub struct WikipediaPage {
    pub title: String,
    pub extract: String,
}

static CITY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?:[Ll]ocated|[Ss]ituated|[Bb]ased)\s+in\s+([A-Z][^,.\n]{1,40}?),",
        r"(?:university|college|institute|institution|school)\s+in\s+([A-Z][^,.\n]{1,40}?),",
    ]
    .iter()
    .map(|re| Regex::new(re).expect("invalid regex literal"))
    .collect()
});

/// Finds the article for a university and pulls its intro text. Returns
/// `Ok(None)` when the search comes back empty or the page has no prose.
pub async fn lookup(client: &ScrapeClient, name: &str) -> Result<Option<WikipediaPage>> {
    let lowered = name.to_lowercase();
    let query = if ["university", "college", "institute", "school"]
        .iter()
        .any(|kw| lowered.contains(kw))
    {
        name.to_string()
    } else {
        format!("{name} university")
    };

    let search_url = format!(
        "{WIKIPEDIA_API}?action=query&list=search&srsearch={}&srlimit=3&format=json",
        urlencoding::encode(&query)
    );
    let search = client.fetch_json(&search_url).await?;
    let Some(title) = search["query"]["search"]
        .as_array()
        .and_then(|hits| hits.first())
        .and_then(|hit| hit["title"].as_str())
    else {
        return Ok(None);
    };

    let extract_url = format!(
        "{WIKIPEDIA_API}?action=query&prop=extracts&exintro=1&explaintext=1&redirects=1&titles={}&format=json",
        urlencoding::encode(title)
    );
    let page = client.fetch_json(&extract_url).await?;
    let extract = page["query"]["pages"]
        .as_object()
        .and_then(|pages| pages.values().next())
        .and_then(|page| page["extract"].as_str())
        .map(str::trim)
        .unwrap_or_default();

    if extract.is_empty() {
        return Ok(None);
    }
    Ok(Some(WikipediaPage {
        title: title.to_string(),
        extract: extract.to_string(),
    }))
}

/// First paragraph of the intro, cut back to the last full sentence that
/// fits the description column. Stubs too short to describe anything are
/// dropped.
pub fn intro_description(extract: &str) -> Option<String> {
    let paragraph = extract.split("\n\n").next()?.trim();
    if paragraph.len() < MIN_DESCRIPTION_LEN {
        return None;
    }
    if paragraph.len() <= MAX_DESCRIPTION_LEN {
        return Some(paragraph.to_string());
    }
    let mut end = MAX_DESCRIPTION_LEN;
    while !paragraph.is_char_boundary(end) {
        end -= 1;
    }
    let head = &paragraph[..end];
    let cut = match head.rfind(". ") {
        Some(pos) => &head[..=pos],
        None => head,
    };
    Some(cut.trim().to_string())
}

pub fn city_from_text(text: &str) -> Option<String> {
    for pattern in CITY_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            if let Some(city) = caps.get(1).and_then(|m| clean_string(m.as_str(), MAX_CITY_LEN)) {
                return Some(city);
            }
        }
    }
    None
}

/// Mines the intro for whichever of the wanted fields this source can
/// supply: the description itself, the city, and anything the generic
/// extractors find in the prose (enrollment, campus type).
pub fn updates_from_page(
    page: &WikipediaPage,
    wanted: &[FieldKey],
    extractors: &ExtractorSet,
) -> Vec<FieldUpdate> {
    let mut updates = Vec::new();

    if wanted.contains(&FieldKey::Description) {
        if let Some(description) = intro_description(&page.extract) {
            updates.push(FieldUpdate::new(
                FieldKey::Description,
                FieldValue::Text(description),
                SourceId::Wikipedia,
            ));
        }
    }
    if wanted.contains(&FieldKey::City) {
        if let Some(city) = city_from_text(&page.extract) {
            updates.push(
                FieldUpdate::new(FieldKey::City, FieldValue::Text(city), SourceId::Wikipedia)
                    .with_pattern_confidence(0.8),
            );
        }
    }

    let minable: Vec<FieldKey> = wanted
        .iter()
        .copied()
        .filter(|f| {
            matches!(
                f,
                FieldKey::TotalStudents | FieldKey::UniversityType | FieldKey::LocationType
            )
        })
        .collect();
    for (field, extraction) in extractors.extract_all(&page.extract, &minable) {
        updates.push(
            FieldUpdate::new(field, extraction.value, SourceId::Wikipedia)
                .with_pattern_confidence(extraction.confidence),
        );
    }

    updates
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTRO: &str = "Example University is a public research university in Florence, Italy. \
It was founded in 1321 and enrolls 28,400 students across twelve schools.\n\nThe second \
paragraph covers history in more depth.";

    #[test]
    fn description_is_first_paragraph_only() {
        let description = intro_description(INTRO).unwrap();
        assert!(description.starts_with("Example University is a public"));
        assert!(!description.contains("second paragraph"));
    }

    #[test]
    fn long_intro_is_cut_at_a_sentence_boundary() {
        let long = format!(
            "{} {}",
            "Opening sentence about the university.",
            "Padding sentence with more words. ".repeat(30)
        );
        let description = intro_description(&long).unwrap();
        assert!(description.len() <= MAX_DESCRIPTION_LEN);
        assert!(description.ends_with('.'));
    }

    #[test]
    fn stub_intros_are_rejected() {
        assert!(intro_description("A university.").is_none());
    }

    #[test]
    fn city_comes_from_the_in_clause() {
        assert_eq!(city_from_text(INTRO).as_deref(), Some("Florence"));
        assert_eq!(
            city_from_text("The campus is located in Heidelberg, Germany.").as_deref(),
            Some("Heidelberg")
        );
    }

    #[test]
    fn page_mining_respects_the_wanted_list() {
        let page = WikipediaPage {
            title: "Example University".into(),
            extract: INTRO.into(),
        };
        let extractors = ExtractorSet::with_defaults();
        let wanted = [FieldKey::Description, FieldKey::City, FieldKey::TotalStudents];
        let updates = updates_from_page(&page, &wanted, &extractors);

        let fields: Vec<FieldKey> = updates.iter().map(|u| u.field).collect();
        assert!(fields.contains(&FieldKey::Description));
        assert!(fields.contains(&FieldKey::City));
        assert!(fields.contains(&FieldKey::TotalStudents));
        assert!(updates.iter().all(|u| u.source == SourceId::Wikipedia));

        let narrow = updates_from_page(&page, &[FieldKey::City], &extractors);
        assert_eq!(narrow.len(), 1);
        assert_eq!(narrow[0].field, FieldKey::City);
    }
}
