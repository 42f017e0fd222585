use once_cell::sync::Lazy;
use regex::Regex;

use crate::extract::{pattern, Extraction, FieldExtractor};
use crate::model::{FieldKey, FieldValue};
use crate::normalize::max_text_len;

static URL_WITH_SCHEME: Lazy<Regex> =
    Lazy::new(|| pattern(r#"(?i)https?://[^\s"'<>)\]]+"#));

// alternation is first-match, so the ccTLD forms must come before bare "edu"
// or "unimelb.edu.au" stops matching at "unimelb.edu"
static BARE_ACADEMIC_HOST: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?i)\b(?:[a-z0-9-]+\.)+(?:ac\.[a-z]{2}|edu\.[a-z]{2}|edu)\b")
});

fn trim_trailing_punct(s: &str) -> &str {
    s.trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '"'))
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url.split("://").nth(1)?;
    Some(rest.split(['/', '?', '#']).next().unwrap_or(rest))
}

/// Universities live under .edu or a country's academic second level
/// (ox.ac.uk, unimelb.edu.au). Anything else is somebody's blog.
fn is_academic_host(host: &str) -> bool {
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() < 2 {
        return false;
    }
    let tld = parts[parts.len() - 1];
    if tld.eq_ignore_ascii_case("edu") {
        return true;
    }
    if parts.len() >= 3 && tld.len() == 2 {
        let sld = parts[parts.len() - 2];
        return sld.eq_ignore_ascii_case("ac") || sld.eq_ignore_ascii_case("edu");
    }
    false
}

pub struct WebsiteExtractor;

impl FieldExtractor for WebsiteExtractor {
    fn field(&self) -> FieldKey {
        FieldKey::Website
    }

    fn name(&self) -> &'static str {
        "academic_urls"
    }

    fn extract(&self, text: &str) -> Option<Extraction> {
        let cap = max_text_len(FieldKey::Website);
        for m in URL_WITH_SCHEME.find_iter(text) {
            let url = trim_trailing_punct(m.as_str());
            if url.len() > cap {
                continue;
            }
            match host_of(url) {
                Some(host) if is_academic_host(host) => {
                    return Some(Extraction::new(FieldValue::Text(url.to_string()), 0.9));
                }
                _ => {}
            }
        }
        for m in BARE_ACADEMIC_HOST.find_iter(text) {
            let host = trim_trailing_punct(m.as_str()).to_ascii_lowercase();
            if host.len() + 8 > cap || !is_academic_host(&host) {
                continue;
            }
            return Some(Extraction::new(
                FieldValue::Text(format!("https://{host}")),
                0.8,
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edu_url_found_and_trailing_period_trimmed() {
        let hit = WebsiteExtractor
            .extract("Apply at https://www.harvard.edu. Deadlines vary.")
            .unwrap();
        assert_eq!(
            hit.value,
            FieldValue::Text("https://www.harvard.edu".into())
        );
        assert_eq!(hit.confidence, 0.9);
    }

    #[test]
    fn country_academic_domains_count() {
        let hit = WebsiteExtractor
            .extract("See https://www.ox.ac.uk/admissions for details")
            .unwrap();
        assert_eq!(
            hit.value,
            FieldValue::Text("https://www.ox.ac.uk/admissions".into())
        );
    }

    #[test]
    fn commercial_urls_are_ignored() {
        assert!(WebsiteExtractor
            .extract("Ranked #1 by https://www.usnews.com/best-colleges")
            .is_none());
    }

    #[test]
    fn bare_host_gets_a_scheme_and_lower_confidence() {
        let hit = WebsiteExtractor
            .extract("Official site: www.unimelb.edu.au (Melbourne)")
            .unwrap();
        assert_eq!(
            hit.value,
            FieldValue::Text("https://www.unimelb.edu.au".into())
        );
        assert_eq!(hit.confidence, 0.8);
    }

    #[test]
    fn schemeful_match_outranks_bare_host() {
        let hit = WebsiteExtractor
            .extract("mit.edu mirrors https://web.mit.edu for most pages")
            .unwrap();
        assert_eq!(hit.value, FieldValue::Text("https://web.mit.edu".into()));
    }
}
