use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::extract::ExtractorSet;
use crate::model::{FieldKey, FieldUpdate, FieldValue, SourceId};
use crate::normalize::{clean_string, MAX_LOGO_URL_LEN, MAX_WEBSITE_LEN};
use crate::scrape::cache::PageCache;
use crate::scrape::cached_fetch;
use crate::scrape::search::strip_tags;
use crate::sources::http::ScrapeClient;

static ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a[^>]+href="([^"]+)"[^>]*>(.*?)</a>"#).expect("invalid regex literal")
});

static LOGO_IMG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]+src="([^"]*logo[^"]*)""#).expect("invalid regex literal")
});

static CANONICAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<link[^>]+rel="canonical"[^>]+href="([^"]+)""#)
        .expect("invalid regex literal")
});

static INTERESTING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)admission|apply|about|tuition|cost|fees|facts|enroll|undergraduate")
        .expect("invalid regex literal")
});

const DOMAIN_STOPWORDS: &[&str] = &[
    "the",
    "of",
    "at",
    "and",
    "for",
    "in",
    "university",
    "college",
    "institute",
    "institution",
    "school",
];

/// Everything one site visit produced.
#[derive(Debug, Clone, Default)]
pub struct WebsiteScrape {
    pub canonical_url: Option<String>,
    pub logo_url: Option<String>,
    pub text: String,
    pub pages_visited: usize,
}

pub fn origin_of(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    if host.is_empty() {
        return None;
    }
    Some(format!("{scheme}://{host}"))
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url.split("://").nth(1)?;
    Some(rest.split(['/', '?', '#']).next().unwrap_or(rest))
}

fn same_host(origin: &str, url: &str) -> bool {
    let (Some(a), Some(b)) = (host_of(origin), host_of(url)) else {
        return false;
    };
    let a = a.trim_start_matches("www.");
    let b = b.trim_start_matches("www.");
    a == b || b.ends_with(&format!(".{a}"))
}

fn absolutize(origin: &str, href: &str) -> Option<String> {
    let href = href.split('#').next().unwrap_or(href).trim();
    if href.is_empty()
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("javascript:")
    {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    if let Some(protocol_relative) = href.strip_prefix("//") {
        return Some(format!("https://{protocol_relative}"));
    }
    if href.starts_with('/') {
        return Some(format!("{origin}{href}"));
    }
    Some(format!("{origin}/{href}"))
}

/// Same-domain links whose target or anchor text looks like
/// admissions/about/cost content, absolutized and deduplicated.
pub fn interesting_page_links(origin: &str, html: &str, limit: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in ANCHOR.captures_iter(html) {
        if out.len() >= limit {
            break;
        }
        let (Some(href), Some(anchor)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if !INTERESTING.is_match(href.as_str()) && !INTERESTING.is_match(anchor.as_str()) {
            continue;
        }
        let Some(url) = absolutize(origin, href.as_str()) else {
            continue;
        };
        if !same_host(origin, &url) || url == origin || out.contains(&url) {
            continue;
        }
        out.push(url);
    }
    out
}

/// Logo image if the homepage names one, else the favicon every site has.
pub fn mine_logo(origin: &str, html: &str) -> String {
    if let Some(src) = LOGO_IMG
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    {
        if let Some(url) = absolutize(origin, src) {
            if url.len() <= MAX_LOGO_URL_LEN {
                return url;
            }
        }
    }
    format!("{origin}/favicon.ico")
}

fn canonical_of(html: &str) -> Option<String> {
    CANONICAL
        .captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|m| clean_string(m.as_str(), MAX_WEBSITE_LEN))
}

/// Crawls one university site: the homepage plus up to `max_pages - 1`
/// interesting same-domain pages, concatenating their stripped text.
pub async fn scrape_site(
    client: &ScrapeClient,
    cache: &PageCache,
    url: &str,
    max_pages: usize,
) -> Option<WebsiteScrape> {
    let origin = origin_of(url)?;
    let homepage = cached_fetch(client, cache, url).await?;
    let mut text = strip_tags(&homepage);
    let mut pages_visited = 1;

    for link in interesting_page_links(&origin, &homepage, max_pages.saturating_sub(1)) {
        client.brief_sleep().await;
        if let Some(body) = cached_fetch(client, cache, &link).await {
            text.push('\n');
            text.push_str(&strip_tags(&body));
            pages_visited += 1;
        }
    }
    debug!(url, pages_visited, "site crawl finished");

    Some(WebsiteScrape {
        canonical_url: canonical_of(&homepage).or_else(|| Some(url.to_string())),
        logo_url: Some(mine_logo(&origin, &homepage)),
        text,
        pages_visited,
    })
}

/// Field updates from one site visit: identity fields straight from the
/// crawl, everything else through the extractors.
pub fn to_updates(
    scrape: &WebsiteScrape,
    wanted: &[FieldKey],
    extractors: &ExtractorSet,
) -> Vec<FieldUpdate> {
    let mut updates = Vec::new();

    if wanted.contains(&FieldKey::Website) {
        if let Some(canonical) = scrape
            .canonical_url
            .as_deref()
            .and_then(|u| clean_string(u, MAX_WEBSITE_LEN))
        {
            updates.push(FieldUpdate::new(
                FieldKey::Website,
                FieldValue::Text(canonical),
                SourceId::DirectWebsite,
            ));
        }
    }
    if wanted.contains(&FieldKey::LogoUrl) {
        if let Some(logo) = scrape
            .logo_url
            .as_deref()
            .and_then(|u| clean_string(u, MAX_LOGO_URL_LEN))
        {
            let confidence = if logo.ends_with("/favicon.ico") { 0.7 } else { 0.9 };
            updates.push(
                FieldUpdate::new(
                    FieldKey::LogoUrl,
                    FieldValue::Text(logo),
                    SourceId::DirectWebsite,
                )
                .with_pattern_confidence(confidence),
            );
        }
    }

    let minable: Vec<FieldKey> = wanted
        .iter()
        .copied()
        .filter(|f| !matches!(f, FieldKey::Website | FieldKey::LogoUrl))
        .collect();
    for (field, extraction) in extractors.extract_all(&scrape.text, &minable) {
        updates.push(
            FieldUpdate::new(field, extraction.value, SourceId::DirectWebsite)
                .with_pattern_confidence(extraction.confidence),
        );
    }

    updates
}

/// Name-derived homepage candidates, most specific first.
pub fn candidate_domains(name: &str) -> Vec<String> {
    let tokens: Vec<String> = name_tokens(name)
        .iter()
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.is_empty() {
        return Vec::new();
    }
    let joined = tokens.concat();
    let first = &tokens[0];
    let initials: String = tokens.iter().filter_map(|t| t.chars().next()).collect();

    let mut candidates = vec![
        format!("https://www.{joined}.edu"),
        format!("https://{joined}.edu"),
        format!("https://www.{first}.edu"),
    ];
    if initials.len() >= 2 {
        candidates.push(format!("https://www.{initials}.edu"));
    }

    let mut out: Vec<String> = Vec::new();
    for candidate in candidates.drain(..) {
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

fn name_tokens(name: &str) -> Vec<&str> {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .filter(|t| !DOMAIN_STOPWORDS.contains(&t.to_ascii_lowercase().as_str()))
        .collect()
}

/// Guess-and-validate: fetch each candidate and keep the first page that
/// actually mentions the institution's name tokens.
pub async fn discover_website(
    client: &ScrapeClient,
    cache: &PageCache,
    name: &str,
) -> Option<String> {
    let significant: Vec<String> = name_tokens(name)
        .iter()
        .map(|t| t.to_lowercase())
        .collect();
    if significant.is_empty() {
        return None;
    }
    let needed = if significant.len() >= 2 { 2 } else { 1 };

    for candidate in candidate_domains(name) {
        client.brief_sleep().await;
        let Some(body) = cached_fetch(client, cache, &candidate).await else {
            continue;
        };
        let text = strip_tags(&body).to_lowercase();
        let hits = significant.iter().filter(|t| text.contains(t.as_str())).count();
        if hits >= needed {
            debug!(name, candidate, "discovered website by domain guess");
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOMEPAGE: &str = r#"
        <html><head>
          <link rel="canonical" href="https://www.test.edu/">
        </head><body>
          <img class="site-mark" src="/assets/logo-primary.svg" alt="">
          <a href="/admissions">Admissions</a>
          <a href="https://www.test.edu/about/facts">Quick Facts</a>
          <a href="/admissions">Admissions (repeat)</a>
          <a href="https://jobs.othersite.com/tuition">Outside tuition page</a>
          <a href="mailto:info@test.edu">Contact</a>
          <a href="/athletics">Athletics</a>
        </body></html>"#;

    #[test]
    fn origin_strips_path_and_query() {
        assert_eq!(
            origin_of("https://www.test.edu/admissions/apply?b=1").as_deref(),
            Some("https://www.test.edu")
        );
        assert_eq!(origin_of("not a url"), None);
    }

    #[test]
    fn crawl_links_stay_on_domain_and_deduplicate() {
        let links = interesting_page_links("https://www.test.edu", HOMEPAGE, 9);
        assert_eq!(
            links,
            vec![
                "https://www.test.edu/admissions".to_string(),
                "https://www.test.edu/about/facts".to_string(),
            ]
        );
    }

    #[test]
    fn link_limit_is_respected() {
        let links = interesting_page_links("https://www.test.edu", HOMEPAGE, 1);
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn logo_is_mined_from_homepage_with_favicon_fallback() {
        assert_eq!(
            mine_logo("https://www.test.edu", HOMEPAGE),
            "https://www.test.edu/assets/logo-primary.svg"
        );
        assert_eq!(
            mine_logo("https://www.test.edu", "<html><body>plain</body></html>"),
            "https://www.test.edu/favicon.ico"
        );
    }

    #[test]
    fn scrape_results_become_sourced_updates() {
        let scrape = WebsiteScrape {
            canonical_url: Some("https://www.test.edu/".to_string()),
            logo_url: Some("https://www.test.edu/favicon.ico".to_string()),
            text: "Our acceptance rate: 18% this cycle.".to_string(),
            pages_visited: 1,
        };
        let extractors = ExtractorSet::with_defaults();
        let wanted = [FieldKey::Website, FieldKey::LogoUrl, FieldKey::AcceptanceRate];
        let updates = to_updates(&scrape, &wanted, &extractors);

        assert_eq!(updates.len(), 3);
        assert!(updates.iter().all(|u| u.source == SourceId::DirectWebsite));
        let logo = updates.iter().find(|u| u.field == FieldKey::LogoUrl).unwrap();
        assert_eq!(logo.pattern_confidence, Some(0.7));
        let rate = updates
            .iter()
            .find(|u| u.field == FieldKey::AcceptanceRate)
            .unwrap();
        assert_eq!(rate.value, FieldValue::Float(18.0));
    }

    #[test]
    fn domain_candidates_cover_joined_first_and_initials() {
        assert_eq!(
            candidate_domains("Example State University"),
            vec![
                "https://www.examplestate.edu".to_string(),
                "https://examplestate.edu".to_string(),
                "https://www.example.edu".to_string(),
                "https://www.es.edu".to_string(),
            ]
        );
    }

    #[test]
    fn single_token_names_produce_no_duplicates() {
        let candidates = candidate_domains("Harvard University");
        assert_eq!(
            candidates,
            vec![
                "https://www.harvard.edu".to_string(),
                "https://harvard.edu".to_string(),
            ]
        );
    }
}
