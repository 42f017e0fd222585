use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::sources::http::ScrapeClient;

const MAX_SNIPPETS: usize = 8;

static DDG_SNIPPET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#)
        .expect("invalid regex literal")
});

static BING_SNIPPET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<p[^>]*class="b_lineclamp[^"]*"[^>]*>(.*?)</p>"#)
        .expect("invalid regex literal")
});

static YAHOO_SNIPPET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<span[^>]*class="[^"]*fc-falcon[^"]*"[^>]*>(.*?)</span>"#)
        .expect("invalid regex literal")
});

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("invalid regex literal"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("invalid regex literal"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    DuckDuckGo,
    Bing,
    Yahoo,
}

impl SearchEngine {
    /// Tried in order; the first engine that yields snippets wins.
    pub const FALLBACK_ORDER: [SearchEngine; 3] =
        [SearchEngine::DuckDuckGo, SearchEngine::Bing, SearchEngine::Yahoo];

    pub fn results_url(&self, query: &str) -> String {
        let q = urlencoding::encode(query);
        match self {
            Self::DuckDuckGo => format!("https://html.duckduckgo.com/html/?q={q}"),
            Self::Bing => format!("https://www.bing.com/search?q={q}"),
            Self::Yahoo => format!("https://search.yahoo.com/search?p={q}"),
        }
    }

    fn snippet_pattern(&self) -> &'static Regex {
        match self {
            Self::DuckDuckGo => &DDG_SNIPPET,
            Self::Bing => &BING_SNIPPET,
            Self::Yahoo => &YAHOO_SNIPPET,
        }
    }
}

/// Markup to plain text: drop tags, decode the handful of entities that
/// actually occur in result snippets, collapse whitespace.
pub fn strip_tags(html: &str) -> String {
    let no_tags = TAG.replace_all(html, " ");
    let decoded = no_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

pub fn extract_snippets(engine: SearchEngine, html: &str) -> Vec<String> {
    engine
        .snippet_pattern()
        .captures_iter(html)
        .take(MAX_SNIPPETS)
        .filter_map(|caps| caps.get(1).map(|m| strip_tags(m.as_str())))
        .filter(|snippet| !snippet.is_empty())
        .collect()
}

/// Joined snippet text for one query. `None` when every engine fails or
/// comes back empty; failures are logged here and go no further.
pub async fn snippets(client: &ScrapeClient, query: &str) -> Option<String> {
    for engine in SearchEngine::FALLBACK_ORDER {
        let url = engine.results_url(query);
        let body = match client.fetch_text(&url).await {
            Ok(body) => body,
            Err(err) => {
                debug!(query, engine = ?engine, "search fetch failed: {err:#}");
                continue;
            }
        };
        let found = extract_snippets(engine, &body);
        if !found.is_empty() {
            debug!(query, engine = ?engine, count = found.len(), "snippets extracted");
            return Some(found.join("\n"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_and_entities_come_out_clean() {
        let html = "<b>Acceptance &amp; admission</b> rate is\n  <i>5%</i>&nbsp;overall";
        assert_eq!(strip_tags(html), "Acceptance & admission rate is 5% overall");
    }

    #[test]
    fn ddg_snippets_are_pulled_from_result_anchors() {
        let html = r#"
            <div class="result">
              <a rel="nofollow" class="result__snippet" href="/l/?u=x">Test U has an
                <b>acceptance rate of 12%</b> for 2024.</a>
            </div>
            <div class="result">
              <a class="result__snippet" href="/l/?u=y">Tuition is $31,000 per year.</a>
            </div>"#;
        let snippets = extract_snippets(SearchEngine::DuckDuckGo, html);
        assert_eq!(snippets.len(), 2);
        assert!(snippets[0].contains("acceptance rate of 12%"));
        assert!(snippets[1].contains("$31,000"));
    }

    #[test]
    fn bing_snippets_come_from_lineclamp_paragraphs() {
        let html = r#"<p class="b_lineclamp2">Enrollment: 24,000 students.</p>"#;
        let snippets = extract_snippets(SearchEngine::Bing, html);
        assert_eq!(snippets, vec!["Enrollment: 24,000 students.".to_string()]);
    }

    #[test]
    fn queries_are_percent_encoded() {
        let url = SearchEngine::DuckDuckGo.results_url("\"Test U\" acceptance rate");
        assert_eq!(
            url,
            "https://html.duckduckgo.com/html/?q=%22Test%20U%22%20acceptance%20rate"
        );
    }

    #[test]
    fn fallback_starts_with_duckduckgo() {
        assert_eq!(SearchEngine::FALLBACK_ORDER[0], SearchEngine::DuckDuckGo);
    }
}
